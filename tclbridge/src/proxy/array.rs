//! Associative arrays.

use indexmap::IndexMap;

use super::variable::{RemoteValue, count};
use super::{Interp, address};
use crate::Result;
use crate::value::{Value, parse_dict, parse_list, stringify};

/// The array variable at an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array {
    /// Qualified address.
    address: String,
}

impl Array {
    /// Proxy for the array at `address`. Nothing is checked remotely.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// Qualified address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// All elements, in the interpreter's iteration order.
    pub fn get(&self, interp: &mut dyn Interp) -> Result<IndexMap<String, String>> {
        parse_dict(&interp.eval(&format!("array get {}", address::word(&self.address)))?)
    }

    /// Replaces the whole array with `entries`.
    pub fn set(&self, interp: &mut dyn Interp, entries: IndexMap<String, Value>) -> Result<()> {
        let word = address::word(&self.address);
        interp.eval(&format!(
            "unset -nocomplain {word}; array set {word} {}",
            stringify(&Value::Dict(entries))
        ))?;
        Ok(())
    }

    /// Element `key` as a value of its own.
    pub fn element(&self, key: &str) -> RemoteValue {
        RemoteValue::variable(&self.element_name(key))
    }

    /// Overwrites or adds element `key`.
    pub fn set_element(&self, interp: &mut dyn Interp, key: &str, value: impl Into<Value>) -> Result<String> {
        self.element(key).set(interp, value)
    }

    /// Deletes element `key`.
    pub fn remove(&self, interp: &mut dyn Interp, key: &str) -> Result<()> {
        let name = stringify(&Value::from(self.element_name(key)));
        interp.eval(&format!("unset {name}"))?;
        Ok(())
    }

    /// Element names.
    pub fn keys(&self, interp: &mut dyn Interp) -> Result<Vec<String>> {
        parse_list(&interp.eval(&format!("array names {}", address::word(&self.address)))?)
    }

    /// Number of elements.
    pub fn len(&self, interp: &mut dyn Interp) -> Result<usize> {
        count(&interp.eval(&format!("array size {}", address::word(&self.address)))?)
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self, interp: &mut dyn Interp) -> Result<bool> {
        Ok(self.len(interp)? == 0)
    }

    /// `name(key)`.
    fn element_name(&self, key: &str) -> String {
        format!("{}({key})", address::tcl_name(&self.address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::tests::Script;

    #[test]
    fn element_commands_quote_the_whole_name() {
        let mut interp = Script::default();
        let array = Array::new("::a");
        array.set_element(&mut interp, "x y", 1).unwrap();
        array.remove(&mut interp, "k").unwrap();
        interp.reply("b a");
        assert_eq!(array.keys(&mut interp).unwrap(), ["b", "a"]);
        assert_eq!(
            interp.commands,
            ["set {::a(x y)} 1", "unset ::a(k)", "array names ::a"]
        );
    }

    #[test]
    fn set_replaces_everything() {
        let mut interp = Script::default();
        let mut entries = IndexMap::new();
        entries.insert("k".to_owned(), Value::from("v w"));
        Array::new("::a").set(&mut interp, entries).unwrap();
        assert_eq!(
            interp.commands,
            ["unset -nocomplain ::a; array set ::a {k {v w}}"]
        );
    }

    #[test]
    fn get_reads_pairs() {
        let mut interp = Script::default();
        interp.reply("k {v w} j 2");
        let entries = Array::new("::a").get(&mut interp).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["k"], "v w");
        interp.reply("2");
        assert_eq!(Array::new("::a").len(&mut interp).unwrap(), 2);
    }
}
