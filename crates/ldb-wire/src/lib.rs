//! ldb-wire: length-prefixed message framing for the debug protocol.
//!
//! Every message is a 4-byte little-endian length followed by that many
//! payload bytes. Payloads are text by convention but the framing itself is
//! binary-safe.

pub mod channel;
pub mod error;
pub mod frame;

pub use channel::{TcpChannel, WireChannel};
pub use error::WireError;
pub use frame::{decode_message, encode_message};
