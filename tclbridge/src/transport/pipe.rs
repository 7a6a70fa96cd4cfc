//! Named-pipe backend.
//!
//! The host creates two FIFOs in the staging directory. The interpreter opens
//! `pipe_p2t` for reading, then `pipe_t2p` for writing. The host opens both
//! ends non-blocking so that it can keep checking the child while it waits,
//! then switches them back to blocking mode.

#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::{Duration, Instant};

use nix::sys::stat::Mode;

use super::spawn::Spawned;
use super::{POLL_INTERVAL, check_alive};
use crate::{Error, Result};

/// Creates a FIFO readable and writable by the owner only.
pub fn create(path: &Path) -> Result<()> {
    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR)
        .map_err(|e| Error::Transport(format!("mkfifo {}: {e}", path.display())))
}

/// Both ends of the channel, plus any bytes read while connecting.
#[derive(Debug)]
pub struct Connected {
    /// Host → interpreter.
    pub writer: File,
    /// Interpreter → host.
    pub reader: File,
    /// Bytes received while waiting for the interpreter to attach.
    pub fragment: Vec<u8>,
}

/// Opens both FIFOs once the interpreter has opened its ends.
pub fn connect(p2t: &Path, t2p: &Path, spawned: &mut Spawned, timeout: Duration) -> Result<Connected> {
    let deadline = Instant::now() + timeout;

    // Opening the write end fails with ENXIO until a reader exists.
    let writer = loop {
        match OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(p2t)
        {
            Ok(file) => break file,
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {}
            Err(e) => return Err(Error::Transport(format!("open {}: {e}", p2t.display()))),
        }
        wait(spawned, deadline, timeout)?;
    };

    // The read end opens at once; EOF means no writer yet, EAGAIN means a
    // writer is attached but has not written.
    let mut reader = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(t2p)
        .map_err(|e| Error::Transport(format!("open {}: {e}", t2p.display())))?;
    let mut fragment = Vec::new();
    let mut chunk = [0u8; tclbridge_proto::frame::PACKET_SIZE];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => {}
            Ok(n) => {
                fragment.extend_from_slice(&chunk[..n]);
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Transport(format!("read {}: {e}", t2p.display()))),
        }
        wait(spawned, deadline, timeout)?;
    }

    set_blocking(&writer)?;
    set_blocking(&reader)?;
    tracing::debug!("interpreter attached to pipes");
    Ok(Connected {
        writer,
        reader,
        fragment,
    })
}

/// One polling step: fail if the child died or the deadline passed.
fn wait(spawned: &mut Spawned, deadline: Instant, timeout: Duration) -> Result<()> {
    check_alive(spawned)?;
    if Instant::now() >= deadline {
        return Err(Error::Transport(format!(
            "interpreter did not open its pipes within {} ms",
            timeout.as_millis()
        )));
    }
    std::thread::sleep(POLL_INTERVAL);
    Ok(())
}

/// Clears `O_NONBLOCK` on an open file.
fn set_blocking(file: &File) -> Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: fcntl(F_GETFL/F_SETFL) on a valid, owned descriptor.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(Error::Transport(format!("fcntl: {}", io::Error::last_os_error())));
    }
    // SAFETY: as above.
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) };
    if ret == -1 {
        return Err(Error::Transport(format!("fcntl: {}", io::Error::last_os_error())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    use super::*;

    #[test]
    fn fifo_is_private() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe_p2t");
        create(&path).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.file_type().is_fifo());
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert!(create(&path).is_err());
    }

    #[test]
    fn clears_nonblocking_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .unwrap();
        set_blocking(&file).unwrap();
        // SAFETY: valid descriptor.
        let flags = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETFL) };
        assert_eq!(flags & libc::O_NONBLOCK, 0);
    }
}
