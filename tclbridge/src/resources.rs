//! Staging directory for the interpreter-side support scripts and FIFOs.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::Result;

/// Interpreter side of the protocol.
const BRIDGE_TCL: &str = include_str!("../tcl/bridge.tcl");
/// Entry script that takes transport arguments from `argv`.
const MAIN_SHELL_TCL: &str = include_str!("../tcl/main_shell.tcl");
/// Entry script that takes transport arguments from the `args` file.
const MAIN_FILE_TCL: &str = include_str!("../tcl/main_file.tcl");
/// Plain-Tcl AES and base64, so encryption needs no tcllib.
const AES_TCL: &str = include_str!("../tcl/aes/aes.tcl");
/// Package index for `AES_TCL`.
const AES_PKG_INDEX: &str = include_str!("../tcl/aes/pkgIndex.tcl");

/// A private temporary directory holding everything the interpreter needs to
/// connect back. Removed on drop.
#[derive(Debug)]
pub struct Resources {
    /// The directory itself.
    dir: TempDir,
}

impl Resources {
    /// Creates the directory and writes the support scripts into it.
    pub fn stage() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("tclbridge.").tempdir()?;
        fs::create_dir(dir.path().join("aes"))?;
        for (name, text) in [
            ("bridge.tcl", BRIDGE_TCL),
            ("main_shell.tcl", MAIN_SHELL_TCL),
            ("main_file.tcl", MAIN_FILE_TCL),
            ("aes/aes.tcl", AES_TCL),
            ("aes/pkgIndex.tcl", AES_PKG_INDEX),
        ] {
            fs::write(dir.path().join(name), text)?;
        }
        tracing::debug!(dir = %dir.path().display(), "staged support scripts");
        Ok(Self { dir })
    }

    /// The staging directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Entry script for command-line argument passing.
    pub fn main_shell(&self) -> PathBuf {
        self.dir.path().join("main_shell.tcl")
    }

    /// Entry script for file argument passing.
    pub fn main_file(&self) -> PathBuf {
        self.dir.path().join("main_file.tcl")
    }

    /// Host → interpreter FIFO.
    pub fn pipe_p2t(&self) -> PathBuf {
        self.dir.path().join("pipe_p2t")
    }

    /// Interpreter → host FIFO.
    pub fn pipe_t2p(&self) -> PathBuf {
        self.dir.path().join("pipe_t2p")
    }

    /// File read (then deleted) by the file entry script.
    pub fn args_file(&self) -> PathBuf {
        self.dir.path().join("args")
    }

    /// Writes the transport arguments for the file entry script. The file is
    /// readable by the owner only.
    pub fn write_args(&self, args: &[String]) -> Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(self.args_file())?;
        writeln!(file, "{}", args.join(" "))?;
        Ok(())
    }

    /// Removes the directory, logging instead of failing.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(dir = %path.display(), "failed to remove staging directory: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_scripts_and_cleans_up() {
        let res = Resources::stage().unwrap();
        let dir = res.path().to_path_buf();
        assert!(
            dir.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("tclbridge.")
        );
        assert!(res.main_shell().is_file());
        assert!(res.main_file().is_file());
        let bridge = fs::read_to_string(dir.join("bridge.tcl")).unwrap();
        assert!(bridge.contains("proc ::tclbridge::invoke"));
        let aes = fs::read_to_string(dir.join("aes").join("pkgIndex.tcl")).unwrap();
        assert!(aes.contains("package ifneeded tclbridge::aes"));
        assert!(dir.join("aes").join("aes.tcl").is_file());
        res.close();
        assert!(!dir.exists());
    }

    #[test]
    fn args_file_is_one_line() {
        let res = Resources::stage().unwrap();
        res.write_args(&["pipe".into(), "00ff".into(), "abcd".into()])
            .unwrap();
        assert_eq!(
            fs::read_to_string(res.args_file()).unwrap(),
            "pipe 00ff abcd\n"
        );
        assert!(res.write_args(&[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn args_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let res = Resources::stage().unwrap();
        res.write_args(&["1234".into()]).unwrap();
        let mode = fs::metadata(res.args_file()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
