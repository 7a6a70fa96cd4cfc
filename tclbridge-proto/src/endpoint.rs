//! One side of a message channel: a frame reader, a writer and an optional
//! cipher.

use std::io::{Read, Write};

use rand::RngCore;
use rand::rngs::OsRng;

use crate::crypto::Cipher;
use crate::frame::{self, FrameReader};
use crate::message::Message;
use crate::{Error, Result};

/// Sends and receives [`Message`]s over a pair of byte streams.
#[derive(Debug)]
pub struct Endpoint<R, W> {
    /// Inbound frames.
    reader: FrameReader<R>,
    /// Outbound stream.
    writer: W,
    /// Payload cipher; `None` sends plain UTF-8.
    cipher: Option<Cipher>,
}

impl<R: Read, W: Write> Endpoint<R, W> {
    /// Creates an endpoint over `reader` and `writer`.
    pub const fn new(reader: FrameReader<R>, writer: W, cipher: Option<Cipher>) -> Self {
        Self {
            reader,
            writer,
            cipher,
        }
    }

    /// Replaces the payload cipher. Applies to the next frame in each
    /// direction.
    pub fn set_cipher(&mut self, cipher: Option<Cipher>) {
        self.cipher = cipher;
    }

    /// The active cipher, if any.
    pub const fn cipher(&self) -> Option<&Cipher> {
        self.cipher.as_ref()
    }

    /// Encodes, encrypts and writes one message.
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        self.send_with(msg, &mut OsRng)
    }

    /// Like [`send`](Self::send), drawing the IV and padding from `rng`.
    pub fn send_with(&mut self, msg: &Message, rng: &mut impl RngCore) -> Result<()> {
        let text = msg.encode();
        let payload = match &self.cipher {
            Some(cipher) => cipher.encrypt_with(text.as_bytes(), rng),
            None => text.into_bytes(),
        };
        frame::write_frame(&mut self.writer, &payload)?;
        Ok(())
    }

    /// Blocks until one full message has arrived.
    pub fn receive(&mut self) -> Result<Message> {
        let payload = self.reader.read_frame()?;
        let text = match &self.cipher {
            Some(cipher) => cipher.decrypt(&payload)?,
            None => String::from_utf8(payload)
                .map_err(|_| Error::Protocol("payload is not valid UTF-8".into()))?,
        };
        Message::decode(&text)
    }

    /// Mutable access to the outbound stream.
    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Splits the endpoint back into its parts.
    pub fn into_parts(self) -> (FrameReader<R>, W) {
        (self.reader, self.writer)
    }
}
