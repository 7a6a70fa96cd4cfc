//! Interpreter process plus a framed byte channel to it.
//!
//! [`Transport::open`] stages the support scripts, prepares the channel
//! (loopback listener or FIFO pair), launches the interpreter and waits for
//! it to attach. [`Transport::close`] is best-effort throughout and always
//! reclaims the process, the channel and the staging directory.

#[cfg(unix)]
mod pipe;
mod socket;
pub(crate) mod spawn;

use std::fmt;
use std::io::{Read, Write};
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tclbridge_proto::{Cipher, Endpoint, FrameReader, Key, Message};

use self::spawn::Spawned;
use crate::config::{ArgsPassing, Backend, SessionConfig};
use crate::resources::Resources;
use crate::{Error, Result};

/// Sleep between liveness checks while waiting on the child.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Boxed inbound stream.
type Reader = Box<dyn Read + Send>;
/// Boxed outbound stream.
type Writer = Box<dyn Write + Send>;

/// What the interpreter left behind once closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Output {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
}

/// Fails with [`Error::Process`] if the child has exited.
pub(crate) fn check_alive(spawned: &mut Spawned) -> Result<()> {
    match spawned.child.try_wait() {
        Ok(None) => Ok(()),
        Ok(Some(status)) => Err(Error::Process {
            message: format!("exited before connecting ({status})"),
            code: status.code(),
            stderr: spawn::collect(spawned.stderr.take()),
        }),
        Err(e) => Err(Error::Process {
            message: format!("wait: {e}"),
            code: None,
            stderr: String::new(),
        }),
    }
}

/// An attached interpreter.
pub struct Transport {
    /// The process and its output drains.
    spawned: Spawned,
    /// Framed channel; `None` once closed.
    endpoint: Option<Endpoint<Reader, Writer>>,
    /// Staging directory, removed on close.
    resources: Option<Resources>,
    /// Grace period for `close`.
    close_timeout: Duration,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("pid", &self.spawned.child.id())
            .field("attached", &self.endpoint.is_some())
            .finish_non_exhaustive()
    }
}

/// Channel prepared before the child starts.
enum Pending {
    /// Listening socket.
    Socket(std::net::TcpListener),
    /// FIFOs created in the staging directory.
    #[cfg(unix)]
    Pipe,
}

impl Transport {
    /// Launches the interpreter and waits for it to attach.
    ///
    /// With `key`, the interpreter receives it (hex) and `seed` alongside the
    /// endpoint, and the channel starts encrypted under that key.
    pub fn open(config: &SessionConfig, key: Option<&Key>, seed: &str) -> Result<Self> {
        let resources = Resources::stage()?;

        let backend = config.backend.resolve();
        let (pending, endpoint_arg) = match backend {
            Backend::Socket => {
                let listener = socket::bind(config.port.as_ref())?;
                let port = socket::port(&listener)?;
                (Pending::Socket(listener), port.to_string())
            }
            #[cfg(unix)]
            Backend::Pipe => {
                pipe::create(&resources.pipe_p2t())?;
                pipe::create(&resources.pipe_t2p())?;
                (Pending::Pipe, "pipe".to_owned())
            }
            other => {
                return Err(Error::Config(format!(
                    "backend {other} is not supported on this platform"
                )));
            }
        };

        let mut tcl_args = vec![endpoint_arg];
        if let Some(key) = key {
            tcl_args.push(key.to_hex());
            tcl_args.push(seed.to_owned());
        }
        let argv = match config.args_passing {
            ArgsPassing::Command => spawn::expand(&config.command, &resources.main_shell(), &tcl_args)?,
            ArgsPassing::File => {
                resources.write_args(&tcl_args)?;
                spawn::expand(&config.command, &resources.main_file(), &[])?
            }
        };

        let mut spawned = spawn::launch(&argv, config)?;
        let attached = match pending {
            Pending::Socket(listener) => {
                socket::accept(&listener, &mut spawned, config.connect_timeout()).and_then(|stream| {
                    let reader = stream
                        .try_clone()
                        .map_err(|e| Error::Transport(format!("clone socket: {e}")))?;
                    Ok((Box::new(reader) as Reader, Box::new(stream) as Writer, Vec::new()))
                })
            }
            #[cfg(unix)]
            Pending::Pipe => pipe::connect(
                &resources.pipe_p2t(),
                &resources.pipe_t2p(),
                &mut spawned,
                config.connect_timeout(),
            )
            .map(|c| (Box::new(c.reader) as Reader, Box::new(c.writer) as Writer, c.fragment)),
        };

        match attached {
            Ok((reader, writer, fragment)) => {
                tracing::info!(pid = spawned.child.id(), %backend, "interpreter attached");
                let cipher = key.map(|k| Cipher::new(k.clone()));
                Ok(Self {
                    spawned,
                    endpoint: Some(Endpoint::new(
                        FrameReader::with_fragment(reader, fragment),
                        writer,
                        cipher,
                    )),
                    resources: Some(resources),
                    close_timeout: config.close_timeout(),
                })
            }
            Err(e) => {
                kill(&mut spawned);
                let _ = spawned.child.wait();
                resources.close();
                Err(e)
            }
        }
    }

    /// Sends one message.
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        let endpoint = self.endpoint.as_mut().ok_or(Error::NotOpen)?;
        tracing::debug!(op = %msg.op, len = msg.body.len(), "send");
        endpoint.send(msg).map_err(Error::from)
    }

    /// Receives one message; errors are left unclassified for the caller.
    pub fn receive(&mut self) -> std::result::Result<Message, tclbridge_proto::Error> {
        let endpoint = self
            .endpoint
            .as_mut()
            .ok_or_else(|| tclbridge_proto::Error::Protocol("channel is closed".into()))?;
        let msg = endpoint.receive()?;
        tracing::debug!(op = %msg.op, len = msg.body.len(), "receive");
        Ok(msg)
    }

    /// Switches the payload key for both directions.
    pub fn set_key(&mut self, key: &Key) {
        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.set_cipher(Some(Cipher::new(key.clone())));
        }
    }

    /// Exit status, if the interpreter has exited.
    pub fn try_wait(&mut self) -> Option<ExitStatus> {
        self.spawned.child.try_wait().ok().flatten()
    }

    /// Waits up to `timeout` for the interpreter to exit on its own.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_wait() {
                return Some(status);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Asks the interpreter to exit, waits for the grace period, then kills
    /// it. Releases the channel and the staging directory. Never fails.
    pub fn close(mut self) -> Output {
        if let Some(endpoint) = self.endpoint.as_mut() {
            if let Err(e) = endpoint.send(&Message::call("exit 0")) {
                tracing::debug!("exit request not delivered: {e}");
            }
        }
        let status = match self.wait_timeout(self.close_timeout) {
            Some(status) => Some(status),
            None => {
                tracing::warn!(
                    pid = self.spawned.child.id(),
                    "interpreter did not exit within {} ms, killing",
                    self.close_timeout.as_millis()
                );
                kill(&mut self.spawned);
                self.spawned.child.wait().ok()
            }
        };
        self.endpoint = None;
        let output = Output {
            stdout: spawn::collect(self.spawned.stdout.take()),
            stderr: spawn::collect(self.spawned.stderr.take()),
            code: status.and_then(|s| s.code()),
        };
        if let Some(resources) = self.resources.take() {
            resources.close();
        }
        tracing::info!(code = ?output.code, "interpreter closed");
        output
    }
}

/// Kills the interpreter and anything it started in its process group.
fn kill(spawned: &mut Spawned) {
    if !matches!(spawned.child.try_wait(), Ok(None)) {
        return;
    }
    #[cfg(unix)]
    {
        if let Ok(pid) = i32::try_from(spawned.child.id()) {
            // SAFETY: signalling the process group created for this child.
            #[allow(unsafe_code)]
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    let _ = spawned.child.kill();
}
