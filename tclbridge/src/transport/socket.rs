//! TCP loopback backend.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use super::spawn::Spawned;
use super::{POLL_INTERVAL, check_alive};
use crate::config::PortSpec;
use crate::{Error, Result};

/// Binds a loopback listener on the first usable port of `spec`, or an
/// ephemeral port when `spec` is `None`.
pub fn bind(spec: Option<&PortSpec>) -> Result<TcpListener> {
    let ports = spec.map_or_else(|| vec![0], PortSpec::ports);
    let mut last = None;
    for port in ports {
        match TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))) {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                tracing::debug!(port, "bind failed: {e}");
                last = Some(e);
            }
        }
    }
    Err(Error::Transport(match last {
        Some(e) => format!("bind: {e}"),
        None => "bind: no port to try".into(),
    }))
}

/// The port a bound listener is on.
pub fn port(listener: &TcpListener) -> Result<u16> {
    listener
        .local_addr()
        .map(|a| a.port())
        .map_err(|e| Error::Transport(format!("local_addr: {e}")))
}

/// Waits for the interpreter to connect, failing early if it exits.
pub fn accept(listener: &TcpListener, spawned: &mut Spawned, timeout: Duration) -> Result<TcpStream> {
    listener
        .set_nonblocking(true)
        .map_err(|e| Error::Transport(format!("listen: {e}")))?;
    let deadline = Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "interpreter connected");
                stream
                    .set_nonblocking(false)
                    .and_then(|()| stream.set_nodelay(true))
                    .map_err(|e| Error::Transport(format!("accept: {e}")))?;
                return Ok(stream);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Transport(format!("accept: {e}"))),
        }
        check_alive(spawned)?;
        if Instant::now() >= deadline {
            return Err(Error::Transport(format!(
                "interpreter did not connect within {} ms",
                timeout.as_millis()
            )));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_bind_is_loopback() {
        let listener = bind(None).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn candidates_skip_taken_ports() {
        let taken = bind(None).unwrap();
        let busy = port(&taken).unwrap();
        let listener = bind(Some(&PortSpec::Candidates(vec![busy, 0]))).unwrap();
        assert_ne!(port(&listener).unwrap(), busy);
    }

    #[test]
    fn last_failure_is_reported() {
        let taken = bind(None).unwrap();
        let busy = port(&taken).unwrap();
        let err = bind(Some(&PortSpec::One(busy))).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
