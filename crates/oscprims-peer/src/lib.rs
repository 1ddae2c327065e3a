//! Client, server and pattern dispatch over UDP.
//!
//! This is the "just works" layer. A [`Client`] encodes and sends messages
//! to one remote endpoint. A [`Server`] receives datagrams, decodes them,
//! publishes every message and failure on broadcast channels, and routes
//! each message to every handler whose address pattern matches.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod server;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_PORT};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{HandlerFault, PeerError, Result, ServerFailure};
pub use handler::{
    DispatchContext, Handler, HandlerError, HandlerFuture, HandlerId, HandlerResult, Route,
};
pub use server::{Server, ServerState};
