//! Namespaces: lookup, assignment and deletion of members by name.

use indexmap::IndexMap;

use super::array::Array;
use super::function::Function;
use super::variable::RemoteValue;
use super::{Interp, Kind, Member, address, resolve};
use crate::session::Callback;
use crate::value::{Value, parse_list, stringify};
use crate::{Error, Result};

/// What to store under a namespace member name.
#[derive(Clone)]
#[non_exhaustive]
pub enum Assignment {
    /// A child namespace holding these members.
    Namespace(IndexMap<String, Assignment>),
    /// An array with these elements.
    Array(IndexMap<String, Value>),
    /// A command that calls back into the host.
    Function(Callback),
    /// A scalar variable.
    Value(Value),
}

impl std::fmt::Debug for Assignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Namespace(m) => f.debug_tuple("Namespace").field(m).finish(),
            Self::Array(m) => f.debug_tuple("Array").field(m).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

impl Assignment {
    /// A scalar assignment.
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

impl From<Value> for Assignment {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Callback> for Assignment {
    fn from(callback: Callback) -> Self {
        Self::Function(callback)
    }
}

/// A namespace, by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Qualified address; empty for the global namespace.
    address: String,
}

impl Namespace {
    /// The global namespace.
    pub const fn root() -> Self {
        Self {
            address: String::new(),
        }
    }

    /// Proxy for the namespace at `address`. Nothing is checked remotely.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            address: if address == address::DELIMITER {
                String::new()
            } else {
                address
            },
        }
    }

    /// Qualified address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Address of member `name`.
    pub fn member_address(&self, name: &str) -> String {
        address::child(&self.address, name)
    }

    /// Looks `name` up and returns a proxy of the matching kind.
    pub fn get(&self, interp: &mut dyn Interp, name: &str) -> Result<Member> {
        let address = self.member_address(name);
        Ok(match resolve(interp, &address)? {
            Kind::Namespace => Member::Namespace(Self::new(address)),
            Kind::Function => Member::Function(Function::new(address)),
            Kind::Array => Member::Array(Array::new(address)),
            Kind::Variable => Member::Variable(RemoteValue::variable(&address)),
        })
    }

    /// Child namespace `name`, unchecked.
    pub fn namespace(&self, name: &str) -> Self {
        Self::new(self.member_address(name))
    }

    /// Scalar variable `name`, unchecked.
    pub fn variable(&self, name: &str) -> RemoteValue {
        RemoteValue::variable(&self.member_address(name))
    }

    /// Array `name`, unchecked.
    pub fn array(&self, name: &str) -> Array {
        Array::new(self.member_address(name))
    }

    /// Command `name`, unchecked.
    pub fn function(&self, name: &str) -> Function {
        Function::new(self.member_address(name))
    }

    /// Stores `value` as member `name`, replacing whatever was there.
    pub fn set(&self, interp: &mut dyn Interp, name: &str, value: impl Into<Assignment>) -> Result<()> {
        match self.remove(interp, name) {
            Ok(()) | Err(Error::Name { .. }) => {}
            Err(e) => return Err(e),
        }
        assign(interp, &self.member_address(name), value.into())
    }

    /// Deletes member `name`, whatever its kind.
    pub fn remove(&self, interp: &mut dyn Interp, name: &str) -> Result<()> {
        let address = self.member_address(name);
        let word = address::word(&address);
        match resolve(interp, &address)? {
            Kind::Namespace => {
                interp.eval(&format!("namespace delete {word}"))?;
            }
            Kind::Function => {
                interp.eval(&format!("rename {word} {{}}"))?;
                interp.unregister_name(&address);
            }
            Kind::Array | Kind::Variable => {
                interp.eval(&format!("unset {word}"))?;
            }
        }
        Ok(())
    }

    /// Qualified names of child namespaces.
    pub fn children(&self, interp: &mut dyn Interp) -> Result<Vec<String>> {
        let word = address::word(&self.address);
        parse_list(&interp.eval(&format!("namespace children {word}"))?)
    }

    /// Qualified names of commands defined here.
    pub fn functions(&self, interp: &mut dyn Interp) -> Result<Vec<String>> {
        parse_list(&interp.eval(&format!("info commands {}", self.pattern()))?)
    }

    /// Qualified names of variables defined here.
    pub fn variables(&self, interp: &mut dyn Interp) -> Result<Vec<String>> {
        parse_list(&interp.eval(&format!("info vars {}", self.pattern()))?)
    }

    /// Evaluates `command` inside this namespace.
    pub fn eval(&self, interp: &mut dyn Interp, command: &str) -> Result<String> {
        interp.eval(&format!(
            "namespace eval {} {}",
            address::word(&self.address),
            stringify(&Value::from(command))
        ))
    }

    /// Glob matching every member.
    fn pattern(&self) -> String {
        stringify(&Value::from(self.member_address("*")))
    }
}

/// Creates `value` at `address`, which must be free.
fn assign(interp: &mut dyn Interp, address: &str, value: Assignment) -> Result<()> {
    let word = address::word(address);
    match value {
        Assignment::Namespace(members) => {
            interp.eval(&format!("namespace eval {word} {{}}"))?;
            for (name, member) in members {
                assign(interp, &address::child(address, &name), member)?;
            }
        }
        Assignment::Array(entries) => {
            interp.eval(&format!(
                "array set {word} {}",
                stringify(&Value::Dict(entries))
            ))?;
        }
        Assignment::Function(callback) => {
            interp.register(address, callback)?;
        }
        Assignment::Value(value) => {
            interp.eval(&format!("set {word} {}", stringify(&value)))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::tests::Script;
    use crate::session::callback;

    /// Replies for a `resolve` that finds nothing.
    fn unresolved(interp: &mut Script) {
        for reply in ["0", "", "0", "0"] {
            interp.reply(reply);
        }
    }

    #[test]
    fn root_aliases() {
        assert_eq!(Namespace::new("::"), Namespace::root());
        assert_eq!(Namespace::root().member_address("x"), "::x");
        assert_eq!(Namespace::new("::a").namespace("b").address(), "::a::b");
    }

    #[test]
    fn nested_assignment_builds_everything_in_order() {
        let mut interp = Script::default();
        unresolved(&mut interp);

        let mut array = IndexMap::new();
        array.insert("k".to_owned(), Value::Int(1));
        let mut members = IndexMap::new();
        members.insert("x".to_owned(), Assignment::value("a b"));
        members.insert("arr".to_owned(), Assignment::Array(array));
        members.insert(
            "f".to_owned(),
            Assignment::Function(callback(|_, _| Ok(Value::Int(0)))),
        );

        Namespace::root()
            .set(&mut interp, "ns", Assignment::Namespace(members))
            .unwrap();
        assert_eq!(
            &interp.commands[4..],
            [
                "namespace eval ::ns {}",
                "set ::ns::x {a b}",
                "array set ::ns::arr {k 1}",
            ]
        );
        assert_eq!(interp.registered, ["::ns::f"]);
    }

    #[test]
    fn set_replaces_an_existing_function() {
        let mut interp = Script::default();
        for reply in ["0", "::f"] {
            interp.reply(reply);
        }
        Namespace::root().set(&mut interp, "f", Value::Int(3)).unwrap();
        assert_eq!(
            interp.commands,
            [
                "namespace exists ::f",
                "info commands ::f",
                "rename ::f {}",
                "set ::f 3",
            ]
        );
        assert_eq!(interp.unregistered, ["::f"]);
    }

    #[test]
    fn remove_dispatches_on_kind() {
        let mut interp = Script::default();
        interp.reply("1");
        Namespace::root().remove(&mut interp, "a").unwrap();
        for reply in ["0", "", "1"] {
            interp.reply(reply);
        }
        Namespace::root().remove(&mut interp, "c").unwrap();
        assert_eq!(interp.commands[1], "namespace delete ::a");
        assert_eq!(interp.commands[5], "unset ::c");
    }

    #[test]
    fn remove_missing_is_a_name_error() {
        let mut interp = Script::default();
        unresolved(&mut interp);
        let err = Namespace::new("::a").remove(&mut interp, "zz").unwrap_err();
        assert!(matches!(
            err,
            Error::Name { ref name, ref namespace } if name == "zz" && namespace == "::a"
        ));
    }

    #[test]
    fn listings_use_member_patterns() {
        let mut interp = Script::default();
        interp.reply("::a::x ::a::y");
        assert_eq!(
            Namespace::new("::a").variables(&mut interp).unwrap(),
            ["::a::x", "::a::y"]
        );
        Namespace::root().functions(&mut interp).unwrap();
        Namespace::root().children(&mut interp).unwrap();
        Namespace::new("::a").eval(&mut interp, "set v 1").unwrap();
        assert_eq!(
            interp.commands,
            [
                "info vars ::a::*",
                "info commands ::*",
                "namespace children ::",
                "namespace eval ::a {set v 1}",
            ]
        );
    }
}
