//! Command template expansion and interpreter process launch.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

use crate::config::SessionConfig;
use crate::{Error, Result};

/// Script placeholder.
const SCRIPT: &str = "{script}";
/// Transport-arguments placeholder.
const ARGS: &str = "{args}";

/// Expands a command template into an argv.
///
/// The template is split with POSIX shell rules first. A token that is
/// exactly `{args}` becomes one argv entry per argument (none when `args` is
/// empty); a token that is exactly `{script}` becomes the path. Placeholders
/// inside a larger token, such as a `bash -c '...'` string, are replaced by
/// shell-quoted text.
pub fn expand(template: &str, script: &Path, args: &[String]) -> Result<Vec<String>> {
    let tokens = shlex::split(template)
        .ok_or_else(|| Error::Config(format!("unbalanced quotes in command: {template}")))?;
    let script = script.to_string_lossy();

    let mut argv = Vec::with_capacity(tokens.len() + args.len());
    for token in tokens {
        if token == ARGS {
            argv.extend(args.iter().cloned());
        } else if token == SCRIPT {
            argv.push(script.clone().into_owned());
        } else if token.contains(SCRIPT) || token.contains(ARGS) {
            let quoted_args = args
                .iter()
                .map(|a| quote(a))
                .collect::<Result<Vec<_>>>()?
                .join(" ");
            argv.push(
                token
                    .replace(SCRIPT, &quote(&script)?)
                    .replace(ARGS, &quoted_args),
            );
        } else {
            argv.push(token);
        }
    }
    if argv.is_empty() {
        return Err(Error::Config("command template is empty".into()));
    }
    Ok(argv)
}

/// Shell-quotes one word.
fn quote(word: &str) -> Result<String> {
    shlex::try_quote(word)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| Error::Config(format!("cannot quote {word:?}: {e}")))
}

/// A launched interpreter plus the threads draining its output.
#[derive(Debug)]
pub struct Spawned {
    /// The process.
    pub child: Child,
    /// Collects stdout, if captured.
    pub stdout: Option<JoinHandle<String>>,
    /// Collects stderr, if captured.
    pub stderr: Option<JoinHandle<String>>,
}

/// Starts `argv` with the configured environment and output capture.
pub fn launch(argv: &[String], config: &SessionConfig) -> Result<Spawned> {
    let (program, rest) = argv
        .split_first()
        .ok_or_else(|| Error::Config("command template is empty".into()))?;

    let mut cmd = Command::new(program);
    cmd.args(rest).stdin(Stdio::null());
    if let Some(env) = &config.env {
        cmd.env_clear().envs(env);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group, so that close can kill wrapper shells' children.
        cmd.process_group(0);
    }
    if config.capture_output {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    }

    tracing::info!(program = %program, "starting interpreter");
    tracing::trace!(?argv, "interpreter argv");
    let mut child = cmd.spawn().map_err(|e| Error::Process {
        message: format!("failed to start {program}: {e}"),
        code: None,
        stderr: String::new(),
    })?;

    let stdout = child.stdout.take().map(|s| drain("tclbridge-stdout", s));
    let stderr = child.stderr.take().map(|s| drain("tclbridge-stderr", s));
    Ok(Spawned {
        child,
        stdout,
        stderr,
    })
}

/// Reads `src` to the end on a named thread.
fn drain(name: &str, mut src: impl Read + Send + 'static) -> JoinHandle<String> {
    let spawned = std::thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            let mut buf = Vec::new();
            let _ = src.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        });
    match spawned {
        Ok(handle) => handle,
        // Without a thread the pipe is left unread; an empty result keeps
        // `join` uniform.
        Err(e) => {
            tracing::warn!("failed to spawn {name} thread: {e}");
            std::thread::spawn(String::new)
        }
    }
}

/// Joins a drain thread, yielding whatever it collected.
pub fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn splices_args_token() {
        let argv = expand(
            "tclsh {script} {args}",
            Path::new("/tmp/x/main_shell.tcl"),
            &args(&["pipe", "k", "s"]),
        )
        .unwrap();
        assert_eq!(argv, ["tclsh", "/tmp/x/main_shell.tcl", "pipe", "k", "s"]);
    }

    #[test]
    fn empty_args_vanish() {
        let argv = expand("tclsh {script} {args}", Path::new("/s.tcl"), &[]).unwrap();
        assert_eq!(argv, ["tclsh", "/s.tcl"]);
    }

    #[test]
    fn embedded_placeholders_are_quoted() {
        let argv = expand(
            "bash -c 'source /opt/settings64.sh && vivado -source {script} -tclargs {args}'",
            Path::new("/tmp/a b/main.tcl"),
            &args(&["4242"]),
        )
        .unwrap();
        assert_eq!(argv.len(), 3);
        assert_eq!(
            shlex::split(&argv[2]).unwrap(),
            [
                "source",
                "/opt/settings64.sh",
                "&&",
                "vivado",
                "-source",
                "/tmp/a b/main.tcl",
                "-tclargs",
                "4242"
            ]
        );
    }

    #[test]
    fn rejects_bad_templates() {
        assert!(expand("tclsh '{script}", Path::new("/s"), &[]).is_err());
        assert!(expand("", Path::new("/s"), &[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn captures_output_of_a_short_process() {
        let config = SessionConfig::default();
        let spawned = launch(&args(&["sh", "-c", "echo out; echo err >&2"]), &config).unwrap();
        let mut child = spawned.child;
        child.wait().unwrap();
        assert_eq!(collect(spawned.stdout), "out\n");
        assert_eq!(collect(spawned.stderr), "err\n");
    }

    #[test]
    fn missing_program_is_a_process_error() {
        let config = SessionConfig::default();
        let err = launch(&args(&["/nonexistent/tclsh-nope"]), &config).unwrap_err();
        assert!(matches!(err, Error::Process { code: None, .. }));
    }
}
