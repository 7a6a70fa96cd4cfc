//! Variables as composable read/write command templates.
//!
//! A [`RemoteValue`] is a command that reads some value plus a template that
//! writes it back. Indexing a list element or a dict entry wraps both in
//! another layer, so a path like `x[0]["a"][2]` becomes one read command and
//! one write command, with no temporaries on the interpreter side.

use indexmap::IndexMap;

use super::address;
use super::Interp;
use crate::value::{Number, Value, parse_bool, parse_dict, parse_list, parse_number, stringify};
use crate::{Error, Result};

/// A write command with one hole for the new value's word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTemplate {
    /// Text before the hole.
    head: String,
    /// Text after the hole.
    tail: String,
}

impl WriteTemplate {
    /// Creates a template from the text around the hole.
    pub fn new(head: impl Into<String>, tail: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            tail: tail.into(),
        }
    }

    /// Fills the hole with `word`.
    pub fn render(&self, word: &str) -> String {
        format!("{}{word}{}", self.head, self.tail)
    }

    /// Nests `head … tail` inside the hole.
    fn wrap(&self, head: &str, tail: &str) -> Self {
        Self {
            head: format!("{}{head}", self.head),
            tail: format!("{tail}{}", self.tail),
        }
    }
}

/// List index word: negative indices count from the end, `-1` being the
/// last element.
pub fn index_word(index: i64) -> String {
    match index {
        0.. => index.to_string(),
        -1 => "end".to_owned(),
        _ => format!("end-{}", -(index + 1)),
    }
}

/// A readable and writable value on the interpreter side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteValue {
    /// Command whose result is the value.
    read: String,
    /// Command that stores a new value.
    write: WriteTemplate,
}

impl RemoteValue {
    /// Wraps an arbitrary read command and write template.
    pub const fn new(read: String, write: WriteTemplate) -> Self {
        Self { read, write }
    }

    /// The scalar variable at `address`.
    pub fn variable(address: &str) -> Self {
        let word = address::word(address);
        Self {
            read: format!("set {word}"),
            write: WriteTemplate::new(format!("set {word} "), ""),
        }
    }

    /// The read command.
    pub fn read_command(&self) -> &str {
        &self.read
    }

    /// The write command storing `value`.
    pub fn write_command(&self, value: &Value) -> String {
        self.write.render(&stringify(value))
    }

    /// Current text.
    pub fn get(&self, interp: &mut dyn Interp) -> Result<String> {
        interp.eval(&self.read)
    }

    /// Stores `value`; returns what the write command returned.
    pub fn set(&self, interp: &mut dyn Interp, value: impl Into<Value>) -> Result<String> {
        interp.eval(&self.write_command(&value.into()))
    }

    /// The text view. Same as [`get`](Self::get).
    pub fn str(&self, interp: &mut dyn Interp) -> Result<String> {
        self.get(interp)
    }

    /// The same value read as a list.
    pub fn list(&self) -> ListView {
        ListView(self.clone())
    }

    /// The same value read as a dict.
    pub fn dict(&self) -> DictView {
        DictView(self.clone())
    }

    /// The same value read as a number.
    pub fn num(&self) -> NumView {
        NumView(self.clone())
    }

    /// Reads the value as a boolean word.
    pub fn to_bool(&self, interp: &mut dyn Interp) -> Result<bool> {
        parse_bool(&self.get(interp)?)
    }

    /// Reads the value as an integer.
    pub fn to_i64(&self, interp: &mut dyn Interp) -> Result<i64> {
        let n = self.num().get(interp)?;
        n.to_i64()
            .ok_or_else(|| Error::Parse(format!("{n} is not an integer")))
    }

    /// Reads the value as a float.
    pub fn to_f64(&self, interp: &mut dyn Interp) -> Result<f64> {
        let n = self.num().get(interp)?;
        n.to_f64()
            .ok_or_else(|| Error::Parse(format!("{n} is not a real number")))
    }

    /// Reads the value as a complex pair.
    pub fn to_complex(&self, interp: &mut dyn Interp) -> Result<(f64, f64)> {
        Ok(self.num().get(interp)?.to_complex())
    }

    /// Writes back the result of `inner`, a command over the current value.
    fn update(&self, interp: &mut dyn Interp, inner: &str) -> Result<String> {
        interp.eval(&self.write.render(&format!("[{inner}]")))
    }
}

/// A [`RemoteValue`] seen as a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListView(RemoteValue);

impl ListView {
    /// Elements.
    pub fn get(&self, interp: &mut dyn Interp) -> Result<Vec<String>> {
        parse_list(&self.0.get(interp)?)
    }

    /// Replaces the whole list.
    pub fn set(&self, interp: &mut dyn Interp, items: Vec<Value>) -> Result<String> {
        self.0.set(interp, Value::List(items))
    }

    /// Number of elements.
    pub fn len(&self, interp: &mut dyn Interp) -> Result<usize> {
        count(&interp.eval(&format!("llength [{}]", self.0.read))?)
    }

    /// Whether the list is empty.
    pub fn is_empty(&self, interp: &mut dyn Interp) -> Result<bool> {
        Ok(self.len(interp)? == 0)
    }

    /// Element `index` as a value of its own.
    pub fn element(&self, index: i64) -> RemoteValue {
        let (read, index) = (&self.0.read, index_word(index));
        RemoteValue {
            read: format!("lindex [{read}] {index}"),
            write: self
                .0
                .write
                .wrap(&format!("[lreplace [{read}] {index} {index} "), "]"),
        }
    }

    /// Overwrites element `index`.
    pub fn set_element(
        &self,
        interp: &mut dyn Interp,
        index: i64,
        value: impl Into<Value>,
    ) -> Result<String> {
        self.element(index).set(interp, value)
    }

    /// Deletes element `index`.
    pub fn remove(&self, interp: &mut dyn Interp, index: i64) -> Result<String> {
        let index = index_word(index);
        self.0
            .update(interp, &format!("lreplace [{}] {index} {index}", self.0.read))
    }

    /// Inserts `value` before element `index`.
    pub fn insert(&self, interp: &mut dyn Interp, index: i64, value: impl Into<Value>) -> Result<String> {
        let inner = format!(
            "linsert [{}] {} {}",
            self.0.read,
            index_word(index),
            stringify(&value.into())
        );
        self.0.update(interp, &inner)
    }

    /// Appends `value`.
    pub fn push(&self, interp: &mut dyn Interp, value: impl Into<Value>) -> Result<String> {
        let inner = format!("linsert [{}] end {}", self.0.read, stringify(&value.into()));
        self.0.update(interp, &inner)
    }
}

/// A [`RemoteValue`] seen as a dict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictView(RemoteValue);

impl DictView {
    /// Entries in interpreter order.
    pub fn get(&self, interp: &mut dyn Interp) -> Result<IndexMap<String, String>> {
        parse_dict(&self.0.get(interp)?)
    }

    /// Replaces the whole dict.
    pub fn set(&self, interp: &mut dyn Interp, entries: IndexMap<String, Value>) -> Result<String> {
        self.0.set(interp, Value::Dict(entries))
    }

    /// Entry `key` as a value of its own.
    pub fn entry(&self, key: &str) -> RemoteValue {
        let (read, key) = (&self.0.read, stringify(&Value::from(key)));
        RemoteValue {
            read: format!("dict get [{read}] {key}"),
            write: self.0.write.wrap(&format!("[dict replace [{read}] {key} "), "]"),
        }
    }

    /// Overwrites or adds entry `key`.
    pub fn set_entry(&self, interp: &mut dyn Interp, key: &str, value: impl Into<Value>) -> Result<String> {
        self.entry(key).set(interp, value)
    }

    /// Deletes entry `key`; a missing key is not an error.
    pub fn remove(&self, interp: &mut dyn Interp, key: &str) -> Result<String> {
        let inner = format!("dict remove [{}] {}", self.0.read, stringify(&Value::from(key)));
        self.0.update(interp, &inner)
    }

    /// Whether entry `key` exists.
    pub fn contains_key(&self, interp: &mut dyn Interp, key: &str) -> Result<bool> {
        let command = format!("dict exists [{}] {}", self.0.read, stringify(&Value::from(key)));
        parse_bool(&interp.eval(&command)?)
    }

    /// Keys in interpreter order.
    pub fn keys(&self, interp: &mut dyn Interp) -> Result<Vec<String>> {
        parse_list(&interp.eval(&format!("dict keys [{}]", self.0.read))?)
    }

    /// Number of entries.
    pub fn len(&self, interp: &mut dyn Interp) -> Result<usize> {
        count(&interp.eval(&format!("dict size [{}]", self.0.read))?)
    }

    /// Whether the dict is empty.
    pub fn is_empty(&self, interp: &mut dyn Interp) -> Result<bool> {
        Ok(self.len(interp)? == 0)
    }
}

/// A [`RemoteValue`] seen as a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumView(RemoteValue);

impl NumView {
    /// Current value.
    pub fn get(&self, interp: &mut dyn Interp) -> Result<Number> {
        parse_number(&self.0.get(interp)?)
    }

    /// Stores `number`.
    pub fn set(&self, interp: &mut dyn Interp, number: impl Into<Number>) -> Result<String> {
        self.0.set(interp, Value::from(number.into()))
    }
}

/// Parses a non-negative count.
pub(crate) fn count(text: &str) -> Result<usize> {
    let n = parse_number(text)?
        .to_i64()
        .ok_or_else(|| Error::Parse(format!("not a count: {text}")))?;
    usize::try_from(n).map_err(|_| Error::Parse(format!("negative count: {n}")))
}
