//! Proxy model against a live `tclbridge-echo` session.

use std::time::Duration;

use indexmap::IndexMap;
use tclbridge::proxy::{Assignment, Kind, Member, Namespace};
use tclbridge::value::Number;
use tclbridge::{Error, Session, Value, callback};

fn open() -> Session {
    let exe = env!("CARGO_BIN_EXE_tclbridge-echo");
    let exe = shlex::try_quote(exe).map_or_else(|_| exe.to_owned(), |q| q.into_owned());
    Session::builder()
        .command(format!("{exe} {{script}} {{args}}"))
        .connect_timeout(Duration::from_secs(10))
        .open()
        .unwrap()
}

#[test]
fn members_resolve_by_kind() {
    let mut tcl = open();
    tcl.eval("namespace eval ::a {}; proc ::b {} {return b}; array set ::c {k 1}; set ::d 4")
        .unwrap();
    let root = tcl.root();

    let kinds: Vec<Kind> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| root.get(&mut tcl, name).unwrap().kind())
        .collect();
    assert_eq!(
        kinds,
        [Kind::Namespace, Kind::Function, Kind::Array, Kind::Variable]
    );

    match root.get(&mut tcl, "e") {
        Err(Error::Name { name, namespace }) => {
            assert_eq!(name, "e");
            assert_eq!(namespace, "::");
        }
        other => panic!("unexpected {other:?}"),
    }

    let Member::Function(b) = root.get(&mut tcl, "b").unwrap() else {
        panic!("b is not a function");
    };
    assert_eq!(b.call(&mut tcl, &[]).unwrap(), "b");
}

#[test]
fn nested_writes_go_through_one_command() {
    let mut tcl = open();
    tcl.eval("set ::x {{k {1 2 3}} {k {4 5}}}").unwrap();

    let x = tcl.root().variable("x");
    let inner = x.list().element(0).dict().entry("k").list();
    inner.set_element(&mut tcl, -1, 5).unwrap();

    assert_eq!(tcl.get("x").unwrap(), "{k {1 2 5}} {k {4 5}}");
    assert_eq!(inner.len(&mut tcl).unwrap(), 3);
    assert_eq!(inner.element(1).to_i64(&mut tcl).unwrap(), 2);

    let second = x.list().element(1).dict();
    second.set_entry(&mut tcl, "new key", "v w").unwrap();
    assert_eq!(second.keys(&mut tcl).unwrap(), ["k", "new key"]);
    assert!(second.contains_key(&mut tcl, "new key").unwrap());
    assert_eq!(
        tcl.eval("dict get [lindex $::x 1] {new key}").unwrap(),
        "v w"
    );
}

#[test]
fn list_views_edit_in_place() {
    let mut tcl = open();
    let l = tcl.root().variable("l").list();
    l.set(&mut tcl, vec![Value::from("a"), Value::from("b c")])
        .unwrap();
    l.push(&mut tcl, "d").unwrap();
    l.insert(&mut tcl, 0, "z").unwrap();
    assert_eq!(l.get(&mut tcl).unwrap(), ["z", "a", "b c", "d"]);
    l.remove(&mut tcl, 1).unwrap();
    assert_eq!(tcl.get("l").unwrap(), "z {b c} d");
    assert!(!l.is_empty(&mut tcl).unwrap());
}

#[test]
fn numbers_and_arrays() {
    let mut tcl = open();
    let n = tcl.root().variable("n");
    n.num().set(&mut tcl, 2.5).unwrap();
    assert_eq!(n.num().get(&mut tcl).unwrap(), Number::Float(2.5));
    assert!((n.to_f64(&mut tcl).unwrap() - 2.5).abs() < f64::EPSILON);

    let arr = tcl.root().array("arr");
    let mut entries = IndexMap::new();
    entries.insert("one".to_owned(), Value::Int(1));
    entries.insert("two words".to_owned(), Value::from("x"));
    arr.set(&mut tcl, entries).unwrap();
    assert_eq!(arr.len(&mut tcl).unwrap(), 2);
    assert_eq!(arr.element("two words").get(&mut tcl).unwrap(), "x");
    arr.set_element(&mut tcl, "three", 3).unwrap();
    arr.remove(&mut tcl, "one").unwrap();
    let got = arr.get(&mut tcl).unwrap();
    assert_eq!(got.get("three").map(String::as_str), Some("3"));
    assert!(!got.contains_key("one"));
}

#[test]
fn namespace_assignment_builds_a_tree() {
    let mut tcl = open();
    let mut members = IndexMap::new();
    members.insert("v".to_owned(), Assignment::value("hello"));
    members.insert(
        "f".to_owned(),
        Assignment::Function(callback(|_, args| Ok(Value::from(args.join("+"))))),
    );
    let root = tcl.root();
    root.set(&mut tcl, "tree", Assignment::Namespace(members))
        .unwrap();

    let tree = Namespace::new("::tree");
    assert_eq!(tcl.eval("set ::tree::v").unwrap(), "hello");
    assert_eq!(tcl.eval("::tree::f 1 2").unwrap(), "1+2");
    assert_eq!(tree.variables(&mut tcl).unwrap(), ["::tree::v"]);
    assert_eq!(tree.functions(&mut tcl).unwrap(), ["::tree::f"]);
    assert_eq!(root.children(&mut tcl).unwrap(), ["::tclbridge", "::tree"]);
    assert_eq!(tree.eval(&mut tcl, "set w 2").unwrap(), "2");
    assert_eq!(tcl.get("::tree::w").unwrap(), "2");

    root.set(&mut tcl, "tree", Value::Int(7)).unwrap();
    assert_eq!(root.get(&mut tcl, "tree").unwrap().kind(), Kind::Variable);
}

#[test]
fn deleting_a_callback_command_forgets_the_callback() {
    let mut tcl = open();
    tcl.register_fn("add", |_, args| Ok(Value::from(args.join(""))))
        .unwrap();
    assert_eq!(tcl.callback_count(), 1);
    tcl.root().remove(&mut tcl, "add").unwrap();
    assert_eq!(tcl.callback_count(), 0);
    assert!(matches!(tcl.eval("add 1"), Err(Error::Remote { .. })));
}
