//! Wire protocol between a tclbridge host and its interpreter process.
//!
//! Messages are a one-character op-code plus a text body, optionally
//! encrypted with AES-128-CBC and base64-encoded, then framed with a
//! 16-digit ASCII hex length header. Any reliable byte stream works
//! (loopback TCP, a pair of FIFOs).

pub mod crypto;
mod endpoint;
mod error;
pub mod frame;
mod message;

pub use crypto::{Cipher, CryptoError, Key};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use frame::FrameReader;
pub use message::{Message, OpCode};
