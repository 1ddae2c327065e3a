use oscprims_codec::decode_packet;
use tracing::debug;

use crate::cmd::DecodeArgs;
use crate::exit::{malformed_error, CliError, CliResult, SUCCESS};
use crate::output::{print_messages, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let datagram = parse_hex(&args.hex)?;
    let messages =
        decode_packet(&datagram).map_err(|err| malformed_error("decode failed", err))?;
    debug!(bytes = datagram.len(), messages = messages.len(), "decoded datagram");

    print_messages(&messages, format);
    Ok(SUCCESS)
}

pub(crate) fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&digits).map_err(|err| CliError::usage(format!("invalid hex input: {err}")))
}
