//! Interpreter commands.

use super::{Interp, address};
use crate::Result;
use crate::value::{Value, join};

/// The command at an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    /// Qualified address.
    address: String,
}

impl Function {
    /// Proxy for the command at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// Qualified address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Calls the command with `args`, each passed as one word.
    pub fn call(&self, interp: &mut dyn Interp, args: &[Value]) -> Result<String> {
        let command = format!("{} {}", address::word(&self.address), join(args));
        interp.eval(command.trim_end())
    }
}
