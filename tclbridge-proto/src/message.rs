//! Protocol message types for host↔interpreter communication.
//!
//! A message is a single op-code character followed by a text body. Exactly
//! one message is in flight per direction at any time.

use std::fmt;

use crate::Error;

/// Message op-code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum OpCode {
    /// Request: a host command, or an interpreter → host callback invocation.
    Call,
    /// Successful result payload.
    Return,
    /// Failure payload.
    Error,
    /// Peer is closing the session.
    Close,
    /// Peer is exiting.
    Exit,
    /// Callback identifier remap (`old new`).
    Rename,
}

impl OpCode {
    /// Wire character for this op-code.
    pub const fn as_char(self) -> char {
        match self {
            Self::Call => 'C',
            Self::Return => 'R',
            Self::Error => 'E',
            Self::Close => 'D',
            Self::Exit => 'X',
            Self::Rename => 'N',
        }
    }

    /// Parses a wire character.
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'C' => Some(Self::Call),
            'R' => Some(Self::Return),
            'E' => Some(Self::Error),
            'D' => Some(Self::Close),
            'X' => Some(Self::Exit),
            'N' => Some(Self::Rename),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Call => "CALL",
            Self::Return => "RETURN",
            Self::Error => "ERROR",
            Self::Close => "CLOSE",
            Self::Exit => "EXIT",
            Self::Rename => "RENAME",
        })
    }
}

/// One logical unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Message {
    /// What the message means.
    pub op: OpCode,
    /// Text payload (command, result, error text, ...).
    pub body: String,
}

impl Message {
    /// Creates a message.
    pub fn new(op: OpCode, body: impl Into<String>) -> Self {
        Self {
            op,
            body: body.into(),
        }
    }

    /// A `CALL` carrying `command`.
    pub fn call(command: impl Into<String>) -> Self {
        Self::new(OpCode::Call, command)
    }

    /// A `RETURN` carrying `result`.
    pub fn ret(result: impl Into<String>) -> Self {
        Self::new(OpCode::Return, result)
    }

    /// An `ERROR` carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(OpCode::Error, message)
    }

    /// Serializes to `opcode || body`.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 1);
        out.push(self.op.as_char());
        out.push_str(&self.body);
        out
    }

    /// Parses `opcode || body`.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let mut chars = text.chars();
        let Some(c) = chars.next() else {
            return Err(Error::Protocol("empty message".into()));
        };
        let op = OpCode::from_char(c)
            .ok_or_else(|| Error::Protocol(format!("unknown op-code {c:?}")))?;
        Ok(Self::new(op, chars.as_str()))
    }
}
