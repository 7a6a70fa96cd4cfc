//! Interactive read-eval-print loop.

use std::io::{BufRead, Write};

use anyhow::Result;
use tclbridge::{Error, Session};

/// Reads commands from stdin until EOF or the interpreter exits.
///
/// Lines accumulate until brackets, braces and quotes balance, so multi-line
/// `proc` bodies can be typed directly.
pub(crate) fn run(tcl: &mut Session) -> Result<()> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut script = String::new();

    loop {
        prompt(if script.is_empty() { "% " } else { "> " })?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        script.push_str(&line);
        script.push('\n');
        if !is_complete(&script) {
            continue;
        }

        let command = std::mem::take(&mut script);
        if command.trim().is_empty() {
            continue;
        }
        match tcl.eval(command.trim_end()) {
            Ok(result) if result.is_empty() => {}
            Ok(result) => println!("{result}"),
            Err(Error::RemoteExit(code)) => {
                tracing::debug!(?code, "interpreter exited");
                return Ok(());
            }
            Err(e) if e.is_recoverable() => eprintln!("error: {e}"),
            Err(e) => return Err(e.into()),
        }
    }

    tcl.close();
    Ok(())
}

fn prompt(text: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(text.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Whether `script` has no open brace, bracket or quote.
fn is_complete(script: &str) -> bool {
    let mut braces = 0usize;
    let mut brackets = 0usize;
    let mut quoted = false;
    let mut chars = script.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '{' if !quoted => braces += 1,
            '}' if !quoted => braces = braces.saturating_sub(1),
            '[' if braces == 0 => brackets += 1,
            ']' if braces == 0 => brackets = brackets.saturating_sub(1),
            '"' if braces == 0 => quoted = !quoted,
            _ => {}
        }
    }
    braces == 0 && brackets == 0 && !quoted
}
