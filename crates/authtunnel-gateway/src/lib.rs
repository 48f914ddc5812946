//! Gated remote-control tunnel server.
//!
//! The gateway multiplexes a periodic screenshot-push stream against
//! asynchronous operator input over one WebSocket per connection, owns the
//! lifecycle of exactly one browser instance per connection, and captures
//! authenticated sessions (cookies + storage) to a durable artifact.

pub mod capture;
pub mod commands;
pub mod connection;
pub mod gate;
pub mod server;
pub mod session;
pub mod state;

pub use server::start_server;
pub use state::ServerState;
