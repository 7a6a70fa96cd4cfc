//! Host-side session with a running interpreter.
//!
//! A [`Session`] owns one interpreter process and speaks a strictly
//! synchronous request/response protocol with it. While a command is
//! pending, the interpreter may call back into the host: each callback is
//! served on the same thread, and may itself evaluate further commands, so
//! requests nest to any depth.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tclbridge_proto::crypto::generate_seed;
use tclbridge_proto::{CryptoError, Key, Message, OpCode};

use crate::config::{SessionBuilder, SessionConfig};
use crate::proxy::{Namespace, address};
use crate::transport::{Output, Transport};
use crate::value::{Value, join, parse_list, stringify, to_text};
use crate::{BoxError, Error, Result};

/// How long a failed key handshake waits to see whether the interpreter died.
const HANDSHAKE_GRACE: Duration = Duration::from_millis(500);

/// Host function the interpreter can invoke.
///
/// Receives the session (for nested evaluation) and the call's arguments as
/// strings. An `Err` is reported to the interpreter as a Tcl error.
pub type Callback =
    Arc<dyn Fn(&mut Session, &[String]) -> std::result::Result<Value, BoxError> + Send + Sync>;

/// Wraps a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&mut Session, &[String]) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The evaluation surface the proxy model is written against.
pub trait Interp {
    /// Evaluates `command` at global level and returns its result.
    fn eval(&mut self, command: &str) -> Result<String>;

    /// Exposes `callback` to the interpreter as the command `name`.
    fn register(&mut self, name: &str, callback: Callback) -> Result<String>;

    /// Forgets the callback bound to the command `name`.
    fn unregister_name(&mut self, name: &str) -> bool;
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionState {
    /// No interpreter.
    Closed,
    /// Interpreter starting, channel not yet keyed.
    Opening,
    /// Idle, ready for a command.
    Ready,
    /// A command is in flight.
    AwaitingResponse,
    /// Shutting the interpreter down.
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Ready => "ready",
            Self::AwaitingResponse => "awaiting-response",
            Self::Closing => "closing",
        })
    }
}

/// A running interpreter.
pub struct Session {
    /// How to launch and talk to the interpreter.
    config: SessionConfig,
    /// Lifecycle state.
    state: SessionState,
    /// Live channel; `None` when closed.
    transport: Option<Transport>,
    /// Commands currently awaiting a response.
    depth: usize,
    /// Every top-level command evaluated since `open`.
    history: Vec<String>,
    /// Registered callbacks by identifier.
    callbacks: HashMap<String, Callback>,
    /// Interpreter command name → callback identifier.
    names: HashMap<String, String>,
    /// Next callback identifier.
    next_id: u64,
    /// Output of the last closed interpreter.
    output: Output,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("transport", &self.transport)
            .field("callbacks", &self.callbacks.len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a closed session; call [`open`](Self::open) to start it.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Closed,
            transport: None,
            depth: 0,
            history: Vec::new(),
            callbacks: HashMap::new(),
            names: HashMap::new(),
            next_id: 0,
            output: Output::default(),
        }
    }

    /// Starts a builder with default settings.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Launches the interpreter, attaches the channel and, when encryption
    /// is enabled, rotates the launch key.
    pub fn open(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Err(Error::Config("session is already open".into()));
        }
        self.config.validate()?;
        self.state = SessionState::Opening;
        self.history.clear();
        self.callbacks.clear();
        self.names.clear();
        self.output = Output::default();

        let key = self.config.encrypt.then(Key::generate);
        match Transport::open(&self.config, key.as_ref(), &generate_seed()) {
            Ok(transport) => self.transport = Some(transport),
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e);
            }
        }
        if key.is_some() {
            if let Err(e) = self.rotate_key() {
                let exited = self
                    .transport
                    .as_mut()
                    .and_then(|t| t.wait_timeout(HANDSHAKE_GRACE));
                self.close();
                return Err(match exited {
                    Some(status) => Error::Process {
                        message: format!("exited during the key handshake ({status}): {e}"),
                        code: status.code(),
                        stderr: self.output.stderr.clone(),
                    },
                    None => e,
                });
            }
        }
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Replaces the key the interpreter saw on its command line.
    ///
    /// The interpreter switches keys before acknowledging, so the
    /// acknowledgement is the first frame under the new key.
    fn rotate_key(&mut self) -> Result<()> {
        let key = Key::generate();
        let transport = self.transport.as_mut().ok_or(Error::NotOpen)?;
        transport.send(&Message::call(format!(
            "::tclbridge::rekey {} {}",
            key.to_hex(),
            generate_seed()
        )))?;
        transport.set_key(&key);
        let reply = transport.receive()?;
        match reply.op {
            OpCode::Return if reply.body.trim() == "1" => {
                tracing::debug!("session key rotated");
                Ok(())
            }
            OpCode::Error => Err(CryptoError::Handshake(reply.body).into()),
            op => Err(CryptoError::Handshake(format!("unexpected {op} reply")).into()),
        }
    }

    /// Shuts the interpreter down. Idempotent; never fails.
    pub fn close(&mut self) {
        let Some(transport) = self.transport.take() else {
            return;
        };
        self.state = SessionState::Closing;
        self.output = transport.close();
        self.depth = 0;
        self.state = SessionState::Closed;
    }

    /// Lifecycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether an interpreter is attached.
    pub const fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// The configuration this session launches with.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Top-level commands evaluated since the last `open`, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Captured output and exit code of the last closed interpreter.
    pub const fn output(&self) -> &Output {
        &self.output
    }

    /// Evaluates `command` at global level and returns its result.
    ///
    /// Callbacks the command triggers are served before this returns. An
    /// interpreter-side error is [`Error::Remote`] and leaves the session
    /// usable; transport, crypto and protocol failures close it.
    pub fn eval(&mut self, command: &str) -> Result<String> {
        if self.transport.is_none() {
            return Err(Error::NotOpen);
        }
        self.history.push(command.to_owned());
        self.call(command)
    }

    /// Evaluates `command` followed by `args`, each quoted as one word.
    pub fn eval_args(&mut self, command: &str, args: &[Value]) -> Result<String> {
        let line = format!("{command} {}", join(args));
        self.eval(line.trim())
    }

    /// Sends `command` and serves the interpreter until it answers.
    fn call(&mut self, command: &str) -> Result<String> {
        let transport = self.transport.as_mut().ok_or(Error::NotOpen)?;
        if let Some(status) = transport.try_wait() {
            self.close();
            return Err(Error::Process {
                message: format!("exited unexpectedly ({status})"),
                code: status.code(),
                stderr: self.output.stderr.clone(),
            });
        }
        tracing::trace!(command, depth = self.depth, "eval");
        if let Err(e) = transport.send(&Message::call(command)) {
            self.close();
            return Err(e);
        }

        self.depth += 1;
        self.state = SessionState::AwaitingResponse;
        let result = self.await_response(command);
        self.depth = self.depth.saturating_sub(1);
        if self.transport.is_some() {
            self.state = if self.depth == 0 {
                SessionState::Ready
            } else {
                SessionState::AwaitingResponse
            };
        }
        result
    }

    /// Receive loop for one pending command.
    fn await_response(&mut self, command: &str) -> Result<String> {
        loop {
            let received = match self.transport.as_mut() {
                Some(transport) => transport.receive(),
                None => return Err(Error::NotOpen),
            };
            let msg = match received {
                Ok(msg) => msg,
                Err(e) => return Err(self.fail(e, command)),
            };
            match msg.op {
                OpCode::Return => return Ok(msg.body),
                OpCode::Error => {
                    return Err(Error::Remote {
                        command: command.to_owned(),
                        message: msg.body,
                    });
                }
                OpCode::Close | OpCode::Exit => {
                    self.close();
                    let code = self.output.code.map_or(msg.body, |c| c.to_string());
                    return Err(Error::RemoteExit(format!(
                        "code {code} while evaluating `{command}`"
                    )));
                }
                OpCode::Call => self.serve_callback(&msg.body, command)?,
                OpCode::Rename => self.rename_callback(&msg.body),
                other => {
                    self.close();
                    return Err(Error::Protocol(format!("unexpected {other} message")));
                }
            }
        }
    }

    /// Closes the session after a channel failure and classifies it.
    fn fail(&mut self, err: tclbridge_proto::Error, command: &str) -> Error {
        let eof = err.is_eof();
        self.close();
        if eof {
            self.exited_during(command)
        } else {
            err.into()
        }
    }

    /// [`Error::RemoteExit`] for a session that closed while `command` was
    /// pending.
    fn exited_during(&self, command: &str) -> Error {
        let code = self
            .output
            .code
            .map_or_else(|| "unknown".to_owned(), |c| c.to_string());
        Error::RemoteExit(format!(
            "channel closed with code {code} while evaluating `{command}`"
        ))
    }

    /// Runs the callback named by a `CALL` body and replies with its result.
    ///
    /// A callback may close the session (say, by evaluating `exit`); the
    /// pending `command` then fails with [`Error::RemoteExit`].
    fn serve_callback(&mut self, body: &str, command: &str) -> Result<()> {
        let reply = match self.run_callback(body) {
            Ok(value) => Message::ret(to_text(&value)),
            Err(message) => {
                tracing::debug!("callback failed: {message}");
                Message::error(message)
            }
        };
        let Some(transport) = self.transport.as_mut() else {
            return Err(self.exited_during(command));
        };
        if let Err(e) = transport.send(&reply) {
            self.close();
            return Err(e);
        }
        Ok(())
    }

    /// Looks up and invokes a callback, turning every failure into text.
    fn run_callback(&mut self, body: &str) -> std::result::Result<Value, String> {
        let mut words = parse_list(body).map_err(|e| e.to_string())?;
        if words.is_empty() {
            return Err("empty callback request".into());
        }
        let id = words.remove(0);
        let callback = self
            .callbacks
            .get(&id)
            .cloned()
            .ok_or_else(|| format!("no callback with id {id}"))?;
        match catch_unwind(AssertUnwindSafe(|| callback(self, &words))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(panic_message(payload.as_ref())),
        }
    }

    /// Applies an interpreter-side `rename` of a callback command.
    fn rename_callback(&mut self, body: &str) {
        let Some((old, new)) = parse_rename(body) else {
            tracing::warn!(body, "malformed rename notice");
            return;
        };
        if let Some(id) = self.names.remove(&qualify(&old)) {
            if new.is_empty() {
                self.callbacks.remove(&id);
            } else {
                self.names.insert(qualify(&new), id);
            }
        }
    }

    /// Registers `callback` as the interpreter command `name` and returns
    /// its identifier. Re-registering a name replaces the old callback.
    ///
    /// Unqualified names are global: `add` and `::add` are the same command.
    pub fn register(&mut self, name: &str, callback: Callback) -> Result<String> {
        let name = qualify(name);
        let id = self.next_id.to_string();
        self.next_id += 1;
        let command = format!(
            "proc {} args {{::tclbridge::invoke {id} {{*}}$args}}",
            stringify(&Value::from(name.as_str()))
        );
        self.eval(&command)?;
        self.callbacks.insert(id.clone(), callback);
        if let Some(old) = self.names.insert(name, id.clone()) {
            self.callbacks.remove(&old);
        }
        Ok(id)
    }

    /// Registers a closure; see [`register`](Self::register).
    pub fn register_fn<F>(&mut self, name: &str, f: F) -> Result<String>
    where
        F: Fn(&mut Session, &[String]) -> std::result::Result<Value, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, callback(f))
    }

    /// Forgets the callback with identifier `id`. The interpreter command
    /// stays defined and fails when called.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.names.retain(|_, v| v != id);
        self.callbacks.remove(id).is_some()
    }

    /// Forgets the callback bound to the command `name`.
    pub fn unregister_name(&mut self, name: &str) -> bool {
        match self.names.remove(&qualify(name)) {
            Some(id) => self.callbacks.remove(&id).is_some(),
            None => false,
        }
    }

    /// Number of registered callbacks.
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// `set name value`.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<String> {
        self.eval_args("set", &[Value::from(name), value.into()])
    }

    /// `set name`.
    pub fn get(&mut self, name: &str) -> Result<String> {
        self.eval_args("set", &[Value::from(name)])
    }

    /// `unset` each of `names`; with `nocomplain`, missing names are fine.
    pub fn unset(&mut self, names: &[&str], nocomplain: bool) -> Result<()> {
        let mut args: Vec<Value> = Vec::with_capacity(names.len() + 1);
        if nocomplain {
            args.push("-nocomplain".into());
        }
        args.extend(names.iter().map(|n| Value::from(*n)));
        self.eval_args("unset", &args).map(drop)
    }

    /// Evaluates a script file in the interpreter.
    pub fn source(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.eval_args("source", &[Value::from(path)])
    }

    /// Prints `text` on the interpreter's standard output.
    pub fn puts(&mut self, text: &str) -> Result<()> {
        self.eval_args("puts", &[Value::from(text)]).map(drop)
    }

    /// Changes the interpreter's working directory (home without a path).
    pub fn cd(&mut self, path: Option<&Path>) -> Result<()> {
        let args: Vec<Value> = path
            .map(|p| Value::from(p.to_string_lossy().into_owned()))
            .into_iter()
            .collect();
        self.eval_args("cd", &args).map(drop)
    }

    /// The interpreter's working directory.
    pub fn pwd(&mut self) -> Result<String> {
        self.eval("pwd")
    }

    /// The interpreter's patch level.
    pub fn version(&mut self) -> Result<String> {
        self.eval("info patchlevel")
    }

    /// The global namespace.
    pub fn root(&self) -> Namespace {
        Namespace::root()
    }
}

impl Interp for Session {
    fn eval(&mut self, command: &str) -> Result<String> {
        Session::eval(self, command)
    }

    fn register(&mut self, name: &str, callback: Callback) -> Result<String> {
        Session::register(self, name, callback)
    }

    fn unregister_name(&mut self, name: &str) -> bool {
        Session::unregister_name(self, name)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Global-namespace form of a command name.
fn qualify(name: &str) -> String {
    address::child("", name)
}

/// Splits an `old new` rename notice; `new` is empty for a deletion.
fn parse_rename(body: &str) -> Option<(String, String)> {
    let mut words = parse_list(body).ok()?.into_iter();
    let old = words.next()?;
    let new = words.next().unwrap_or_default();
    if words.next().is_some() {
        return None;
    }
    Some((old, new))
}

/// Text of a caught panic.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("callback panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("callback panicked: {s}")
    } else {
        "callback panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_notice_parses() {
        assert_eq!(parse_rename("a b"), Some(("a".into(), "b".into())));
        assert_eq!(parse_rename("::x {}"), Some(("::x".into(), String::new())));
        assert_eq!(parse_rename("a"), Some(("a".into(), String::new())));
        assert_eq!(parse_rename("a b c"), None);
        assert_eq!(parse_rename("{a"), None);
    }

    #[test]
    fn panic_payloads_become_text() {
        let caught = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "callback panicked: boom");
        let n = 3;
        let caught = catch_unwind(move || panic!("n={n}")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "callback panicked: n=3");
    }

    #[test]
    fn closed_session_refuses_commands() {
        let mut session = Session::new(SessionConfig::default());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(session.eval("set x 1"), Err(Error::NotOpen)));
        assert!(session.history().is_empty());
        session.close();
        assert!(!session.is_open());
    }

    #[test]
    fn unregister_unknown_is_false() {
        let mut session = Session::new(SessionConfig::default());
        assert!(!session.unregister("7"));
        assert!(!session.unregister_name("nope"));
    }

    #[test]
    fn command_names_are_qualified() {
        assert_eq!(qualify("add"), "::add");
        assert_eq!(qualify("::add"), "::add");
        assert_eq!(qualify("ns::f"), "::ns::f");
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::AwaitingResponse.to_string(), "awaiting-response");
    }
}
