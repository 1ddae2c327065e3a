//! A mixer-style component that declares its handlers as a route table.
//!
//! Run with:
//!   cargo run --example route-table
//!
//! The example binds a server on an ephemeral port, sends itself a few
//! messages with a client, prints what the handlers saw, and exits.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use oscprims::codec::Message;
use oscprims::peer::{
    Client, ClientConfig, DispatchContext, HandlerError, HandlerResult, Route, Server,
    ServerConfig,
};

#[derive(Default)]
struct Mixer {
    volumes: Mutex<Vec<(u32, f32)>>,
}

impl Mixer {
    fn routes(self: &Arc<Self>) -> Vec<Route> {
        let volume = Arc::clone(self);
        vec![
            Route::new(
                "^/track/(?<no>[0-9]+)/volume$",
                move |ctx: DispatchContext| {
                    let result = volume.set_volume(&ctx);
                    async move { result }
                },
            ),
            Route::blocking("^/track/[0-9]+/select$", |ctx| {
                eprintln!("selected {}", ctx.message());
                Ok(())
            }),
        ]
    }

    fn set_volume(&self, ctx: &DispatchContext) -> HandlerResult {
        let track: u32 = ctx.capture("no").unwrap_or_default().parse()?;
        let level = ctx
            .message()
            .arg(0)
            .ok_or_else(|| HandlerError::from("volume needs a level"))?
            .as_float32()?;
        if let Ok(mut volumes) = self.volumes.lock() {
            volumes.push((track, level));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::bind(ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))).await?;
    let mixer = Arc::new(Mixer::default());
    server.register_routes(mixer.routes())?;
    server.begin_listen()?;
    eprintln!("Listening on {}", server.local_addr());

    let mut failures = server.subscribe_failures();
    tokio::spawn(async move {
        while let Ok(failure) = failures.recv().await {
            eprintln!("failure: {failure}");
        }
    });

    let mut client = Client::new(ClientConfig::new(server.local_addr().to_string()));
    client.connect().await?;
    client
        .send(&Message::new("/track/1/volume").arg_value(0.8f32))
        .await?;
    client.send(&Message::new("/track/2/select").arg_value(true)).await?;
    client
        .send_bundle(&[
            Message::new("/track/3/volume").arg_value(0.25f32),
            Message::new("/track/4/volume").arg_value("loud"),
        ])
        .await?;

    tokio::time::sleep(Duration::from_millis(200)).await;
    server.end_listen().await;

    if let Ok(volumes) = mixer.volumes.lock() {
        for (track, level) in volumes.iter() {
            println!("track {track}: volume {level}");
        }
    }
    Ok(())
}
