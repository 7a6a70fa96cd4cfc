//! Interpreter state as a navigable object graph.
//!
//! Nothing is enumerated up front: [`resolve`] asks the interpreter what an
//! address names, and the proxies turn reads and writes into generated
//! commands. Proxies hold only an address or a command template, so they
//! are cheap to clone and take the [`Interp`] explicitly on every call.

pub mod address;
mod array;
mod function;
mod namespace;
mod variable;

pub use array::Array;
pub use function::Function;
pub use namespace::{Assignment, Namespace};
pub use variable::{DictView, ListView, NumView, RemoteValue, WriteTemplate, index_word};

pub use crate::session::Interp;
use crate::value::{parse_bool, parse_list};
use crate::{Error, Result};

/// What an address names, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Kind {
    /// A namespace.
    Namespace,
    /// A command.
    Function,
    /// An array variable.
    Array,
    /// A scalar variable.
    Variable,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Namespace => "namespace",
            Self::Function => "function",
            Self::Array => "array",
            Self::Variable => "variable",
        })
    }
}

/// A resolved namespace member.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Member {
    /// A namespace.
    Namespace(Namespace),
    /// A command.
    Function(Function),
    /// An array variable.
    Array(Array),
    /// A scalar variable.
    Variable(RemoteValue),
}

impl Member {
    /// The member's kind.
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Namespace(_) => Kind::Namespace,
            Self::Function(_) => Kind::Function,
            Self::Array(_) => Kind::Array,
            Self::Variable(_) => Kind::Variable,
        }
    }
}

/// Asks the interpreter what `address` names.
///
/// Namespaces win over commands, commands over arrays, arrays over scalars.
/// Fails with [`Error::Name`] if the address names nothing.
pub fn resolve(interp: &mut dyn Interp, address: &str) -> Result<Kind> {
    let word = address::word(address);
    if parse_bool(&interp.eval(&format!("namespace exists {word}"))?)? {
        return Ok(Kind::Namespace);
    }
    let name = address::tcl_name(address);
    let commands = parse_list(&interp.eval(&format!("info commands {word}"))?)?;
    if commands.iter().any(|c| c == name) {
        return Ok(Kind::Function);
    }
    if parse_bool(&interp.eval(&format!("array exists {word}"))?)? {
        return Ok(Kind::Array);
    }
    if parse_bool(&interp.eval(&format!("info exists {word}"))?)? {
        return Ok(Kind::Variable);
    }
    let (namespace, name) = address::split(address);
    Err(Error::Name {
        name: name.to_owned(),
        namespace: address::tcl_name(namespace).to_owned(),
    })
}
