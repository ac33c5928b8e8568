//! Agent Client Protocol (ACP) transport.
//!
//! Newline-delimited JSON-RPC 2.0 over a child process's stdio:
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing with a line cap.
//! - `envelope`: classification of inbound lines and construction of outbound ones.
//! - `pending`: the id → completion-slot table.
//! - `writer`: serialised writes to the agent's stdin.
//! - `reader`: the dispatcher task reading the agent's stdout.
//! - `client`: request/notification calls with timeouts.
//! - `handshake`: `initialize` and `session/new`.
//! - `connection`: wires the pieces above to one pair of streams.
//! - `spawner`: process launch.

pub mod client;
pub mod codec;
pub mod connection;
pub mod envelope;
pub mod handshake;
pub mod pending;
pub mod reader;
pub mod spawner;
pub mod writer;
