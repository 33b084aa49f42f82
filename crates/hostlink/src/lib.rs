//! hostlink - local IPC and guarded bus access for embedded Linux hosts.
//!
//! This library lets cooperating processes on a single host exchange short
//! text messages over path-addressed Unix domain sockets, and share exclusive
//! access to a physical bus without colliding. It is intentionally narrow:
//! point-to-point channels plus a named cross-process lock, with no topics,
//! no fan-out, and no persistence.
//!
//! # Modules
//!
//! - [`comms`]: message channels over Unix domain sockets, in two modes -
//!   synchronous request/response and unidirectional streaming
//! - [`lock`]: named cross-process locks backed by advisory file locks
//! - [`bus`]: lock-guarded access to a shared SPI transfer channel
//! - [`paths`]: default filesystem locations for sockets and lock files
//!
//! # Example
//!
//! ```rust,ignore
//! use hostlink::comms::{MessageClient, MessageServer};
//!
//! // Server process:
//! let mut server = MessageServer::new("/tmp/hostlink/ctrl.sock");
//! server.accept().await?;
//! let request = server.recv().await?;
//! server.send("ack").await?;
//!
//! // Client process:
//! let mut client = MessageClient::new("/tmp/hostlink/ctrl.sock");
//! client.send("status").await?;
//! let reply = client.recv().await?;
//! ```
//!
//! The library spawns no tasks and installs no tracing subscriber; the host
//! process drives every future and decides what to do with log events.

pub mod bus;
pub mod comms;
pub mod lock;
pub mod paths;
