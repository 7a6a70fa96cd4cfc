//! tclbridge-echo: a stand-in interpreter process.
//!
//! Accepts the same command line as the staged Tcl entry scripts
//! (`<main_shell.tcl> <endpoint> [<key> <seed>]`, or `<main_file.tcl>` with
//! the arguments in the staging directory's `args` file), connects back to
//! the host and serves requests with a small built-in Tcl interpreter. The
//! test suite uses it where no `tclsh` is installed.
//!
//! A script in `TCLBRIDGE_ECHO_STARTUP` runs once the channel is attached,
//! before the first request is read.

// Standalone binary: stdout carries `puts`, stderr carries failures.
#![allow(clippy::print_stderr, clippy::print_stdout)]

mod interp;

use std::io::{Read, Write};
use std::path::Path;

use tclbridge_proto::{Cipher, Endpoint, FrameReader, Key};

use interp::{Flow, Interp, Peer, parse_seed};

/// Entry script that reads its arguments from a file.
const FILE_ENTRY: &str = "main_file.tcl";

/// Environment variable holding a script to run before serving.
const STARTUP_ENV: &str = "TCLBRIDGE_ECHO_STARTUP";

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[tclbridge-echo] {e}");
            1
        }
    };
    let _ = std::io::stdout().flush();
    std::process::exit(code);
}

/// Connects and serves; returns the exit code.
fn run() -> Result<i32, String> {
    let argv: Vec<String> = std::env::args().collect();
    let Some(script) = argv.get(1) else {
        return Err("usage: tclbridge-echo <entry-script> [endpoint [key seed]]".into());
    };
    let script = Path::new(script);
    let dir = script.parent().unwrap_or_else(|| Path::new("."));

    let params = if script.file_name().is_some_and(|n| n == FILE_ENTRY) {
        let path = dir.join("args");
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        let _ = std::fs::remove_file(&path);
        text.split_whitespace().map(str::to_owned).collect()
    } else {
        argv[2..].to_vec()
    };

    let Some(target) = params.first() else {
        return Err("missing endpoint argument".into());
    };
    let (reader, writer) = connect(dir, target)?;

    let cipher = match params.get(1) {
        Some(hex) => Some(Cipher::new(
            Key::from_hex(hex).map_err(|e| format!("bad key: {e}"))?,
        )),
        None => None,
    };
    let seed = params.get(2).map_or(0, |s| parse_seed(s));

    let mut interp = Interp::new();
    interp.attach(Peer::new(
        Endpoint::new(FrameReader::new(reader), writer, cipher),
        seed,
    ));
    if let Ok(script) = std::env::var(STARTUP_ENV) {
        match interp.eval(&script) {
            Err(Flow::Exit(code)) => return Ok(code),
            Err(Flow::Error(message)) => return Err(format!("startup script: {message}")),
            _ => {}
        }
    }
    Ok(interp.run())
}

/// Opens the channel named by `target`: `pipe`, or a loopback port.
fn connect(dir: &Path, target: &str) -> Result<(Box<dyn Read>, Box<dyn Write>), String> {
    if target == "pipe" {
        return connect_pipe(dir);
    }
    let port: u16 = target
        .parse()
        .map_err(|_| format!("bad endpoint: {target}"))?;
    let stream = std::net::TcpStream::connect(("127.0.0.1", port))
        .map_err(|e| format!("failed to connect to port {port}: {e}"))?;
    let _ = stream.set_nodelay(true);
    let reader = stream
        .try_clone()
        .map_err(|e| format!("failed to clone socket: {e}"))?;
    Ok((Box::new(reader), Box::new(stream)))
}

/// Opens the FIFO pair in the order the host expects.
#[cfg(unix)]
fn connect_pipe(dir: &Path) -> Result<(Box<dyn Read>, Box<dyn Write>), String> {
    let p2t = dir.join("pipe_p2t");
    let reader = std::fs::File::open(&p2t)
        .map_err(|e| format!("failed to open {}: {e}", p2t.display()))?;
    let t2p = dir.join("pipe_t2p");
    let writer = std::fs::OpenOptions::new()
        .write(true)
        .open(&t2p)
        .map_err(|e| format!("failed to open {}: {e}", t2p.display()))?;
    Ok((Box::new(reader), Box::new(writer)))
}

/// FIFOs need a Unix host.
#[cfg(not(unix))]
fn connect_pipe(_dir: &Path) -> Result<(Box<dyn Read>, Box<dyn Write>), String> {
    Err("the pipe backend is only supported on Unix".into())
}
