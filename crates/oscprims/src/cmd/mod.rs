use std::net::SocketAddr;

use clap::{Args, Subcommand};

use crate::exit::{io_error, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single message.
    Send(SendArgs),
    /// Listen and print received messages.
    Listen(ListenArgs),
    /// Decode a hex-encoded datagram.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => runtime()?.block_on(send::run(args)),
        Command::Listen(args) => runtime()?.block_on(listen::run(args, format)),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime startup failed", err))
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Destination as HOST:PORT.
    pub remote: String,
    /// Message address, e.g. /track/1/volume.
    pub address: String,
    /// Arguments: i:<int>, f:<float>, s:<text>, b:<hex>, T, F or N.
    pub args: Vec<String>,
    /// Local port to send from.
    #[arg(long)]
    pub local_port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Local address to bind, e.g. 0.0.0.0:9000.
    pub bind: SocketAddr,
    /// Only print messages whose address matches this regular expression.
    #[arg(long, value_name = "REGEX")]
    pub pattern: Option<String>,
    /// Exit after receiving N messages (at least 1).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Datagram bytes as hex. Whitespace is ignored.
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
