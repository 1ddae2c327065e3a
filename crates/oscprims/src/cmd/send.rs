use oscprims_codec::{validate_address, Message, Value};
use oscprims_peer::{Client, ClientConfig};
use tracing::info;

use crate::cmd::SendArgs;
use crate::exit::{peer_error, CliError, CliResult, SUCCESS};

pub async fn run(args: SendArgs) -> CliResult<i32> {
    validate_address(&args.address)
        .map_err(|err| CliError::usage(format!("invalid address: {err}")))?;
    let values = args
        .args
        .iter()
        .map(|arg| parse_value(arg))
        .collect::<CliResult<Vec<_>>>()?;
    let message = Message::with_args(args.address, values);

    let mut config = ClientConfig::new(args.remote);
    config.local_port = args.local_port;

    let mut client = Client::new(config);
    client
        .connect()
        .await
        .map_err(|err| peer_error("connect failed", err))?;
    let sent = client
        .send(&message)
        .await
        .map_err(|err| peer_error("send failed", err))?;
    info!(address = message.address(), bytes = sent, "message sent");

    client
        .disconnect()
        .map_err(|err| peer_error("disconnect failed", err))?;
    Ok(SUCCESS)
}

/// Parse one `TYPE:VALUE` argument (`T`, `F` and `N` stand alone).
fn parse_value(arg: &str) -> CliResult<Value> {
    match arg {
        "T" => return Ok(Value::True),
        "F" => return Ok(Value::False),
        "N" => return Ok(Value::Nil),
        _ => {}
    }

    let (kind, raw) = arg
        .split_once(':')
        .ok_or_else(|| CliError::usage(format!("argument {arg:?} needs a type prefix")))?;

    let invalid = |what: &str| CliError::usage(format!("argument {arg:?} is not a valid {what}"));
    match kind {
        "i" => raw.parse::<i32>().map(Value::Int32).map_err(|_| invalid("int32")),
        "f" => raw.parse::<f32>().map(Value::Float32).map_err(|_| invalid("float32")),
        "s" => Ok(Value::String(raw.to_string())),
        "b" => hex::decode(raw)
            .map(Value::from)
            .map_err(|_| invalid("hex blob")),
        other => Err(CliError::usage(format!("unknown argument type {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_argument_kind() {
        assert_eq!(parse_value("i:-3").unwrap(), Value::Int32(-3));
        assert_eq!(parse_value("f:0.5").unwrap(), Value::Float32(0.5));
        assert_eq!(parse_value("s:a:b").unwrap(), Value::from("a:b"));
        assert_eq!(parse_value("s:").unwrap(), Value::from(""));
        assert_eq!(parse_value("b:dead").unwrap(), Value::from(vec![0xde, 0xad]));
        assert_eq!(parse_value("T").unwrap(), Value::True);
        assert_eq!(parse_value("F").unwrap(), Value::False);
        assert_eq!(parse_value("N").unwrap(), Value::Nil);
    }

    #[test]
    fn rejects_bad_arguments() {
        for bad in ["3", "i:x", "i:99999999999", "f:", "b:abc", "q:1"] {
            let err = parse_value(bad).expect_err("argument should be rejected");
            assert_eq!(err.code, crate::exit::USAGE, "{bad}");
        }
    }
}
