//! Networking: the transport contract, its implementations, and framing.
//!
//! A transport is a duplex message stream: everything pushed on the outbox
//! is broadcast to all connected peers, and everything received from any
//! peer lands on a single inbound queue. Two implementations satisfy the
//! contract: a TCP broadcast transport, and an in-process loopback used by
//! single-process demos and tests.

pub mod codec;
pub mod errors;
pub mod loopback;
pub mod tcp;
pub mod transport;

pub use errors::NetError;
pub use loopback::LoopbackTransport;
pub use tcp::TcpTransport;
pub use transport::Transport;
