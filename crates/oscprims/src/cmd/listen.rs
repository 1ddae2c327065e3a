use std::sync::Arc;

use oscprims_codec::Message;
use oscprims_peer::{DispatchContext, HandlerError, Server, ServerConfig};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

/// Where printed messages come from: every decoded message, or only those a
/// pattern handler matched.
enum MessageSource {
    All(broadcast::Receiver<Arc<Message>>),
    Matched(mpsc::UnboundedReceiver<Arc<Message>>),
}

impl MessageSource {
    fn new(server: &Server, pattern: Option<&str>) -> CliResult<Self> {
        let Some(pattern) = pattern else {
            return Ok(Self::All(server.subscribe_messages()));
        };

        let (tx, rx) = mpsc::unbounded_channel();
        server
            .register(pattern, move |ctx: DispatchContext| {
                let _ = tx.send(ctx.message_arc());
                async { Ok::<_, HandlerError>(()) }
            })
            .map_err(|err| peer_error("invalid --pattern", err))?;
        Ok(Self::Matched(rx))
    }

    async fn next(&mut self) -> Option<Arc<Message>> {
        match self {
            Self::All(rx) => loop {
                match rx.recv().await {
                    Ok(message) => return Some(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "output fell behind; messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            Self::Matched(rx) => rx.recv().await,
        }
    }
}

pub async fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let server = Server::bind(ServerConfig::new(args.bind))
        .await
        .map_err(|err| peer_error("bind failed", err))?;
    let mut source = MessageSource::new(&server, args.pattern.as_deref())?;
    let mut failures = server.subscribe_failures();

    server
        .begin_listen()
        .map_err(|err| peer_error("listen failed", err))?;
    info!(local_addr = %server.local_addr(), "listening");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut printed = 0u64;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted");
                break;
            }
            failure = failures.recv() => match failure {
                Ok(failure) => warn!(error = %failure, "receive failure"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "failure notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = source.next() => {
                let Some(message) = message else { break };
                print_message(&message, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
        }
    }

    server.end_listen().await;
    Ok(SUCCESS)
}
