//! Qualified namespace addresses.
//!
//! The global namespace is the empty address; every other address is its
//! parent followed by `::` and the member name, so `a` in the global
//! namespace is `::a`.

use crate::value::{Value, stringify};

/// Separator between address components.
pub const DELIMITER: &str = "::";

/// Address of `name` inside `parent`. A name that is already fully
/// qualified is returned as-is.
pub fn child(parent: &str, name: &str) -> String {
    if name.starts_with(DELIMITER) {
        name.to_owned()
    } else {
        format!("{parent}{DELIMITER}{name}")
    }
}

/// Splits an address into its parent and final component.
pub fn split(address: &str) -> (&str, &str) {
    address.rsplit_once(DELIMITER).unwrap_or(("", address))
}

/// The name the interpreter uses for `address`: `::` for the root.
pub fn tcl_name(address: &str) -> &str {
    if address.is_empty() { DELIMITER } else { address }
}

/// `address` quoted as one command word.
pub fn word(address: &str) -> String {
    stringify(&Value::from(tcl_name(address)))
}
