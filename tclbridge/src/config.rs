//! Session configuration, its JSON form, and the fluent builder.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use serde::{Deserialize, Serialize};

use crate::session::Session;
use crate::{Error, Result};

/// Default command template: run `tclsh` on the staged entry script.
pub const DEFAULT_COMMAND: &str = "tclsh {script} {args}";

/// Channel between host and interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Backend {
    /// FIFOs on Unix, TCP loopback elsewhere.
    #[default]
    Auto,
    /// TCP loopback socket.
    Socket,
    /// Pair of named pipes in the staging directory.
    Pipe,
}

impl Backend {
    /// Resolves `Auto` for the current platform.
    pub const fn resolve(self) -> Self {
        match self {
            Self::Auto if cfg!(unix) => Self::Pipe,
            Self::Auto => Self::Socket,
            other => other,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Socket => "socket",
            Self::Pipe => "pipe",
        })
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "socket" | "tcp" => Ok(Self::Socket),
            "pipe" | "fifo" => Ok(Self::Pipe),
            _ => Err(format!("unknown backend: {s}")),
        }
    }
}

/// How transport arguments reach the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ArgsPassing {
    /// Written to a staged file that the entry script reads and deletes,
    /// keeping the key out of process listings.
    #[default]
    File,
    /// Substituted for `{args}` on the command line.
    Command,
}

impl std::fmt::Display for ArgsPassing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Command => "command",
        })
    }
}

impl std::str::FromStr for ArgsPassing {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "command" | "shell" => Ok(Self::Command),
            _ => Err(format!("unknown argument passing style: {s}")),
        }
    }
}

/// Listening port selection for the socket backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum PortSpec {
    /// One fixed port.
    One(u16),
    /// Ports tried in order; the first that binds wins.
    Candidates(Vec<u16>),
}

impl PortSpec {
    /// Ports to try, in order.
    pub fn ports(&self) -> Vec<u16> {
        match self {
            Self::One(p) => vec![*p],
            Self::Candidates(ps) => ps.clone(),
        }
    }
}

/// Serializable session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct SessionConfig {
    /// Command template with `{script}` and `{args}` placeholders.
    pub command: String,
    /// Complete environment for the interpreter; `None` inherits the host's.
    pub env: Option<BTreeMap<String, String>>,
    /// Channel backend.
    pub backend: Backend,
    /// Listening port for the socket backend; `None` picks an ephemeral one.
    pub port: Option<PortSpec>,
    /// Encrypt payloads and rotate the key after connecting.
    pub encrypt: bool,
    /// How transport arguments are passed.
    pub args_passing: ArgsPassing,
    /// Capture the interpreter's stdout/stderr (available after close).
    pub capture_output: bool,
    /// How long to wait for the interpreter to connect.
    pub connect_timeout_ms: u64,
    /// How long `close` waits for a graceful exit before killing.
    pub close_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_owned(),
            env: None,
            backend: Backend::Auto,
            port: None,
            encrypt: true,
            args_passing: ArgsPassing::File,
            capture_output: true,
            connect_timeout_ms: 30_000,
            close_timeout_ms: 5_000,
        }
    }
}

impl SessionConfig {
    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Writes the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }

    /// Checks the fields that cannot be validated by the type system.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(Error::Config("command template is empty".into()));
        }
        if !self.command.contains("{script}") {
            return Err(Error::Config(
                "command template has no {script} placeholder".into(),
            ));
        }
        if matches!(&self.port, Some(PortSpec::Candidates(ps)) if ps.is_empty()) {
            return Err(Error::Config("port candidate list is empty".into()));
        }
        if self.port.is_some() && self.backend.resolve() != Backend::Socket {
            return Err(Error::Config("a port requires the socket backend".into()));
        }
        Ok(())
    }

    /// Connect timeout as a [`Duration`].
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Close timeout as a [`Duration`].
    pub const fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

/// Builder for a [`Session`].
///
/// # Example
///
/// ```no_run
/// use tclbridge::{Backend, Session};
///
/// let mut session = Session::builder()
///     .command("tclsh {script} {args}")
///     .backend(Backend::Socket)
///     .encrypt(false)
///     .open()
///     .expect("failed to start tclsh");
/// assert_eq!(session.eval("expr {1 + 2}").unwrap(), "3");
/// ```
#[derive(Debug, Default)]
#[must_use = "a SessionBuilder does nothing until .build() or .open() is called"]
pub struct SessionBuilder {
    /// Configuration being assembled.
    config: SessionConfig,
}

impl SessionBuilder {
    /// Starts from an existing configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Extracts the configuration snapshot.
    pub fn to_config(&self) -> SessionConfig {
        self.config.clone()
    }

    /// Sets the command template.
    pub fn command(mut self, template: impl Into<String>) -> Self {
        self.config.command = template.into();
        self
    }

    /// Replaces the interpreter's environment with `vars`.
    pub fn env<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.config.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Sets the channel backend.
    pub const fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Listens on a fixed port (socket backend).
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(PortSpec::One(port));
        self
    }

    /// Tries each port in turn (socket backend).
    pub fn ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.config.port = Some(PortSpec::Candidates(ports.into_iter().collect()));
        self
    }

    /// Enables or disables payload encryption (default: enabled).
    pub const fn encrypt(mut self, enable: bool) -> Self {
        self.config.encrypt = enable;
        self
    }

    /// Sets how transport arguments are passed (default: file).
    pub const fn args_passing(mut self, style: ArgsPassing) -> Self {
        self.config.args_passing = style;
        self
    }

    /// Enables or disables stdout/stderr capture (default: enabled).
    pub const fn capture_output(mut self, enable: bool) -> Self {
        self.config.capture_output = enable;
        self
    }

    /// Sets the connect timeout.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the graceful close timeout.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Validates the configuration and returns a closed session.
    pub fn build(self) -> Result<Session> {
        self.config.validate()?;
        Ok(Session::new(self.config))
    }

    /// Builds the session and opens it.
    pub fn open(self) -> Result<Session> {
        let mut session = self.build()?;
        session.open()?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.command, DEFAULT_COMMAND);
        assert!(config.encrypt);
        assert_eq!(config.args_passing, ArgsPassing::File);
        assert_eq!(config.close_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_fills_missing_fields() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"backend":"socket","port":[5000,5001],"encrypt":false}"#)
                .unwrap();
        assert_eq!(config.backend, Backend::Socket);
        assert_eq!(config.port, Some(PortSpec::Candidates(vec![5000, 5001])));
        assert!(!config.encrypt);
        assert_eq!(config.command, DEFAULT_COMMAND);

        let one: SessionConfig = serde_json::from_str(r#"{"port":7000}"#).unwrap();
        assert_eq!(one.port, Some(PortSpec::One(7000)));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let config = SessionBuilder::default()
            .command("vivado -mode batch -source {script} -tclargs {args}")
            .env([("PATH", "/usr/bin")])
            .args_passing(ArgsPassing::Command)
            .to_config();
        config.save(&path).unwrap();
        assert_eq!(SessionConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn validation() {
        let mut config = SessionConfig {
            command: "tclsh".into(),
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.command = DEFAULT_COMMAND.into();
        config.backend = Backend::Pipe;
        config.port = Some(PortSpec::One(1));
        assert!(config.validate().is_err());

        config.backend = Backend::Socket;
        config.port = Some(PortSpec::Candidates(vec![]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn enum_text_forms() {
        assert_eq!("TCP".parse::<Backend>().unwrap(), Backend::Socket);
        assert_eq!("shell".parse::<ArgsPassing>().unwrap(), ArgsPassing::Command);
        assert!("carrier-pigeon".parse::<Backend>().is_err());
        assert_eq!(Backend::Pipe.to_string(), "pipe");
        assert_ne!(Backend::Auto.resolve(), Backend::Auto);
    }
}
