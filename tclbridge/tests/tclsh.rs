//! Tests against a real `tclsh`, skipped when none is on `PATH`.
//!
//! These run the interpreter-side scripts (framing, the plain-Tcl cipher,
//! key rotation, callbacks) and check the codec against Tcl's own list
//! quoting.

use tclbridge::value::{parse_list, stringify};
use tclbridge::{ArgsPassing, Backend, Session, Value};

fn tclsh_available() -> bool {
    which::which("tclsh").is_ok()
}

fn backends() -> &'static [Backend] {
    if cfg!(unix) {
        &[Backend::Socket, Backend::Pipe]
    } else {
        &[Backend::Socket]
    }
}

/// Strings with every character the list grammar treats specially.
const AWKWARD: &[&str] = &[
    "",
    "plain",
    "two words",
    "{",
    "}",
    "a{b",
    "{a} b",
    "x\\{",
    "\\",
    "$x",
    "[cmd]",
    "a;b",
    "\"q",
    "q\"",
    "line\nbreak",
    "tab\there",
    "#hash",
    "caf\u{e9}",
];

/// A Tcl expression that builds `s` from code points, independent of the
/// quoting under test.
fn literal(s: &str) -> String {
    if s.is_empty() {
        return "{}".to_owned();
    }
    let codes: Vec<String> = s.chars().map(|c| u32::from(c).to_string()).collect();
    format!("[format {} {}]", "%c".repeat(codes.len()), codes.join(" "))
}

#[test]
fn eval_and_callbacks_over_every_channel() {
    if !tclsh_available() {
        return;
    }
    for &backend in backends() {
        for encrypt in [true, false] {
            for passing in [ArgsPassing::File, ArgsPassing::Command] {
                let label = format!("{backend} encrypt={encrypt} {passing}");
                let mut tcl = Session::builder()
                    .encrypt(encrypt)
                    .backend(backend)
                    .args_passing(passing)
                    .open()
                    .unwrap_or_else(|e| panic!("{label}: {e}"));
                let version = tcl.version().unwrap();
                assert!(version.starts_with('8') || version.starts_with('9'), "{label}");
                assert_eq!(tcl.eval("expr {6 * 7}").unwrap(), "42", "{label}");

                tcl.register_fn("shout", |_, args| Ok(Value::from(args.join(" ").to_uppercase())))
                    .unwrap();
                assert_eq!(tcl.eval("shout hello world").unwrap(), "HELLO WORLD", "{label}");
                tcl.register_fn("twice", |tcl, args| {
                    let once = tcl.eval(&format!("shout {}", args[0]))?;
                    Ok(Value::from(format!("{once}{once}")))
                })
                .unwrap();
                assert_eq!(tcl.eval("twice ab").unwrap(), "ABAB", "{label}");

                let l = tcl.root().variable("l").list();
                tcl.eval("set l {a {b c} d}").unwrap();
                l.set_element(&mut tcl, -1, "z").unwrap();
                assert_eq!(tcl.get("l").unwrap(), "a {b c} z", "{label}");

                let err = tcl.eval("error boom").unwrap_err();
                assert!(err.is_recoverable(), "{label}");
                tcl.close();
                assert_eq!(tcl.output().code, Some(0), "{label}");
            }
        }
    }
}

#[test]
fn encrypted_payloads_larger_than_one_read() {
    if !tclsh_available() {
        return;
    }
    let mut tcl = Session::builder().encrypt(true).open().unwrap();
    let big = "0123456789abcdef".repeat(2048);
    tcl.set("big", big.as_str()).unwrap();
    assert_eq!(tcl.eval("string length $big").unwrap(), big.len().to_string());
    assert_eq!(tcl.get("big").unwrap(), big);
}

#[test]
fn exit_reports_the_interpreter_code() {
    if !tclsh_available() {
        return;
    }
    let mut tcl = Session::builder().open().unwrap();
    let err = tcl.eval("exit 5").unwrap_err();
    assert!(matches!(err, tclbridge::Error::RemoteExit(_)), "{err:?}");
    assert_eq!(tcl.output().code, Some(5));
}

#[test]
fn quoting_agrees_with_tcl() {
    if !tclsh_available() {
        return;
    }
    let mut tcl = Session::builder().encrypt(false).open().unwrap();

    for &s in AWKWARD {
        tcl.eval(&format!("set s {}", literal(s))).unwrap();
        assert_eq!(tcl.get("s").unwrap(), s, "read back {s:?}");

        let word = stringify(&Value::from(s));
        assert_eq!(
            tcl.eval(&format!("string equal $s {word}")).unwrap(),
            "1",
            "Tcl reads {word:?} as {s:?}"
        );
        assert_eq!(
            parse_list(&tcl.eval("list $s").unwrap()).unwrap(),
            [s],
            "parse Tcl's quoting of {s:?}"
        );
    }

    let literals: Vec<String> = AWKWARD.iter().map(|s| literal(s)).collect();
    let quoted_by_tcl = tcl.eval(&format!("list {}", literals.join(" "))).unwrap();
    assert_eq!(parse_list(&quoted_by_tcl).unwrap(), AWKWARD);

    let list = stringify(&Value::strings(AWKWARD.iter().copied()));
    tcl.eval(&format!("set l {list}")).unwrap();
    assert_eq!(tcl.eval("llength $l").unwrap(), AWKWARD.len().to_string());
    for (i, lit) in literals.iter().enumerate() {
        assert_eq!(
            tcl.eval(&format!("string equal [lindex $l {i}] {lit}")).unwrap(),
            "1",
            "element {i}"
        );
    }

    tcl.eval("set d [dict create {a b} {x {y}} {} {\\}} k [list 1 {2 3}]]")
        .unwrap();
    let dict = tclbridge::value::parse_dict(&tcl.get("d").unwrap()).unwrap();
    assert_eq!(dict["a b"], "x {y}");
    assert_eq!(dict[""], "\\}");
    assert_eq!(parse_list(&dict["k"]).unwrap(), ["1", "2 3"]);
}
