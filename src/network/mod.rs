//! Network Module Implementation
//!
//! This module provides the transport-facing half of the crate: wire framing
//! and per-socket connection handling.
//!
//! # Architecture
//!
//! The module is built on tokio's async I/O primitives and consists of:
//! - Frame encoding/decoding with partial-read reassembly
//! - Connection management over TCP streams and endpoint-bound UDP sockets
//!
//! # Components
//!
//! - `Frame` / `FrameDecoder`: the length-prefixed wire format and the
//!   receive-buffer reassembly that solves the sticky/partial packet problem
//! - `Connection` / `FrameWriter`: the read and write halves of one socket
//!
//! # Features
//!
//! - Asynchronous I/O operations
//! - Carry-over of partial frame tails across reads
//! - Frame size validation with fatal rejection of malformed lengths
//! - Graceful-close vs. mid-frame-reset distinction

pub use connection::{Connection, FrameWriter};
pub use frame::{encode_into, Frame, FrameDecoder, HEADER_SIZE};
mod connection;
mod frame;
