//! End-to-end session tests against the bundled `tclbridge-echo` interpreter.

use std::path::Path;
use std::time::Duration;

use tclbridge::{ArgsPassing, Backend, Error, Session, SessionBuilder, SessionState, Value};

/// A builder that launches `tclbridge-echo` instead of `tclsh`.
fn echo() -> SessionBuilder {
    let exe = env!("CARGO_BIN_EXE_tclbridge-echo");
    let exe = shlex::try_quote(exe).map_or_else(|_| exe.to_owned(), |q| q.into_owned());
    Session::builder()
        .command(format!("{exe} {{script}} {{args}}"))
        .connect_timeout(Duration::from_secs(10))
        .close_timeout(Duration::from_secs(5))
}

/// Every backend, encryption and argument-passing combination.
fn channels() -> Vec<SessionBuilder> {
    let backends: &[Backend] = if cfg!(unix) {
        &[Backend::Socket, Backend::Pipe]
    } else {
        &[Backend::Socket]
    };
    let mut out = Vec::new();
    for &backend in backends {
        for encrypt in [true, false] {
            for passing in [ArgsPassing::File, ArgsPassing::Command] {
                out.push(
                    echo()
                        .backend(backend)
                        .encrypt(encrypt)
                        .args_passing(passing),
                );
            }
        }
    }
    out
}

#[test]
fn set_and_get_on_every_channel() {
    for builder in channels() {
        let label = format!("{:?}", builder.to_config());
        let mut tcl = builder
            .open()
            .unwrap_or_else(|e| panic!("{label}: {e}"));
        assert_eq!(tcl.state(), SessionState::Ready);

        tcl.set("x", "hello world").unwrap();
        assert_eq!(tcl.get("x").unwrap(), "hello world", "{label}");
        assert_eq!(tcl.eval("llength $x").unwrap(), "2", "{label}");
        assert_eq!(tcl.set("n", 3).unwrap(), "3");

        tcl.close();
        assert_eq!(tcl.state(), SessionState::Closed);
        assert_eq!(tcl.output().code, Some(0), "{label}");
    }
}

#[test]
fn callbacks_run_while_a_command_is_pending() {
    for builder in channels() {
        let mut tcl = builder.open().unwrap();
        tcl.register_fn("add", |_, args| {
            let sum = args
                .iter()
                .map(|a| a.parse::<i64>())
                .sum::<Result<i64, _>>()?;
            Ok(Value::Int(sum))
        })
        .unwrap();
        assert_eq!(tcl.eval("add 2 3").unwrap(), "5");
        assert_eq!(tcl.eval("expr {[add 1 1] * 10}").unwrap(), "20");
    }
}

#[test]
fn callbacks_can_evaluate_back_into_the_interpreter() {
    let mut tcl = echo().open().unwrap();
    tcl.set("base", 40).unwrap();
    tcl.register_fn("plus_base", |tcl, args| {
        let base = tcl.get("base")?;
        let sum = base.parse::<i64>()? + args[0].parse::<i64>()?;
        Ok(Value::Int(sum))
    })
    .unwrap();
    tcl.register_fn("outer", |tcl, _| Ok(Value::from(tcl.eval("plus_base 2")?)))
        .unwrap();

    assert_eq!(tcl.eval("outer").unwrap(), "42");
    assert!(tcl.history().ends_with(&["outer".to_owned(), "plus_base 2".to_owned()]));
}

#[test]
fn callback_results_arrive_unquoted() {
    let mut tcl = echo().open().unwrap();
    tcl.register_fn("odd", |_, _| Ok(Value::from("a {b")))
        .unwrap();
    tcl.register_fn("pair", |_, _| Ok(Value::strings(["x y", "z"])))
        .unwrap();
    assert_eq!(tcl.eval("odd").unwrap(), "a {b");
    assert_eq!(tcl.eval("lindex [pair] 0").unwrap(), "x y");
}

#[test]
fn callback_failures_become_interpreter_errors() {
    let mut tcl = echo().open().unwrap();
    tcl.register_fn("fails", |_, _| Err("nope".into())).unwrap();
    tcl.register_fn("panics", |_, _| panic!("boom")).unwrap();

    let err = tcl.eval("fails").unwrap_err();
    assert!(
        matches!(err, Error::Remote { ref message, .. } if message.contains("nope")),
        "{err:?}"
    );
    let err = tcl.eval("panics").unwrap_err();
    assert!(
        matches!(err, Error::Remote { ref message, .. } if message.contains("boom")),
        "{err:?}"
    );
    assert_eq!(tcl.eval("catch fails msg").unwrap(), "1");
    assert!(tcl.is_open());
}

#[test]
fn unregistered_callbacks_are_reported() {
    let mut tcl = echo().open().unwrap();
    let id = tcl.register_fn("gone", |_, _| Ok(Value::Int(1))).unwrap();
    assert_eq!(tcl.callback_count(), 1);
    assert!(tcl.unregister(&id));
    assert_eq!(tcl.callback_count(), 0);

    let err = tcl.eval("gone").unwrap_err();
    assert!(
        matches!(err, Error::Remote { ref message, .. } if message.contains("no callback")),
        "{err:?}"
    );
}

#[test]
fn renamed_callbacks_follow_their_command() {
    let mut tcl = echo().open().unwrap();
    tcl.register_fn("before", |_, _| Ok(Value::from("ok"))).unwrap();
    tcl.eval("::tclbridge::rename_callback before later").unwrap();
    assert_eq!(tcl.eval("later").unwrap(), "ok");
    assert!(!tcl.unregister_name("before"));
    assert!(tcl.unregister_name("later"));
}

#[test]
fn remote_errors_leave_the_session_usable() {
    let mut tcl = echo().open().unwrap();
    let err = tcl.eval("error boom").unwrap_err();
    assert!(err.is_recoverable());
    match err {
        Error::Remote { command, message } => {
            assert_eq!(command, "error boom");
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(tcl.get("missing"), Err(Error::Remote { .. })));
    assert_eq!(tcl.eval("set ok 1").unwrap(), "1");
}

#[test]
fn large_payloads_cross_intact() {
    let mut tcl = echo().encrypt(true).open().unwrap();
    let big = "0123456789abcdef".repeat(8192);
    tcl.set("big", big.as_str()).unwrap();
    assert_eq!(tcl.eval("string length $big").unwrap(), big.len().to_string());
    assert_eq!(tcl.get("big").unwrap(), big);
}

#[test]
fn exit_during_a_command_closes_the_session() {
    let mut tcl = echo().open().unwrap();
    let err = tcl.eval("exit 3").unwrap_err();
    assert!(matches!(err, Error::RemoteExit(_)), "{err:?}");
    assert!(!err.is_recoverable());
    assert!(!tcl.is_open());
    assert_eq!(tcl.output().code, Some(3));
    assert!(matches!(tcl.eval("set x"), Err(Error::NotOpen)));
}

#[test]
fn exit_inside_a_callback_ends_the_outer_command() {
    let mut tcl = echo().open().unwrap();
    tcl.register_fn("quit", |tcl, _| Ok(Value::from(tcl.eval("exit 4")?)))
        .unwrap();
    let err = tcl.eval("quit").unwrap_err();
    assert!(matches!(err, Error::RemoteExit(_)), "{err:?}");
    assert!(!tcl.is_open());
    assert_eq!(tcl.output().code, Some(4));
}

#[test]
fn dying_during_the_key_handshake_is_a_process_error() {
    let env: Vec<(String, String)> = std::env::vars()
        .chain([(
            "TCLBRIDGE_ECHO_STARTUP".to_owned(),
            "puts stderr {can't find package aes}; exit 2".to_owned(),
        )])
        .collect();
    for backend in [Backend::Socket, Backend::Auto] {
        let err = echo()
            .backend(backend)
            .encrypt(true)
            .env(env.clone())
            .open()
            .unwrap_err();
        match err {
            Error::Process { code, stderr, .. } => {
                assert_eq!(code, Some(2));
                assert!(stderr.contains("can't find package aes"), "{stderr}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[test]
fn close_is_idempotent_and_captures_output() {
    let mut tcl = echo().capture_output(true).open().unwrap();
    tcl.puts("hello from tcl").unwrap();
    tcl.close();
    tcl.close();
    assert_eq!(tcl.output().stdout, "hello from tcl\n");
    assert!(matches!(tcl.eval("set x 1"), Err(Error::NotOpen)));

    tcl.open().unwrap();
    assert!(tcl.history().is_empty());
    assert_eq!(tcl.eval("set x 2").unwrap(), "2");
}

#[test]
fn unset_source_and_working_directory() {
    let mut tcl = echo().open().unwrap();
    tcl.set("a", 1).unwrap();
    tcl.unset(&["a"], false).unwrap();
    assert!(tcl.unset(&["a"], false).is_err());
    tcl.unset(&["a", "b"], true).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("init.tcl");
    std::fs::write(&script, "set sourced 42\n").unwrap();
    tcl.source(&script).unwrap();
    assert_eq!(tcl.get("sourced").unwrap(), "42");

    tcl.cd(Some(dir.path())).unwrap();
    let pwd = tcl.pwd().unwrap();
    assert_eq!(
        Path::new(&pwd).canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
    assert!(tcl.version().unwrap().starts_with("8."));
}

#[test]
fn a_missing_interpreter_fails_to_open() {
    let err = Session::builder()
        .command("/nonexistent/tclsh {script} {args}")
        .connect_timeout(Duration::from_secs(2))
        .open()
        .unwrap_err();
    assert!(matches!(err, Error::Process { .. }), "{err:?}");
}
