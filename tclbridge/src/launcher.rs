//! Command templates for stock `tclsh` and the Xilinx tool shells.
//!
//! The vendor tools are found through `PATH`, and their environment comes
//! from the installation's `settings64.sh`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::{DEFAULT_COMMAND, SessionBuilder};
use crate::{Error, Result};

/// A known interpreter host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Launcher {
    /// `tclsh` from `PATH`.
    Tclsh,
    /// Vivado in batch mode.
    Vivado,
    /// The Vitis `xsct` shell.
    Vitis,
    /// ISE `xtclsh`.
    Ise,
    /// PlanAhead in batch mode.
    PlanAhead,
}

impl Launcher {
    /// Every launcher.
    pub const ALL: [Self; 5] = [
        Self::Tclsh,
        Self::Vivado,
        Self::Vitis,
        Self::Ise,
        Self::PlanAhead,
    ];

    /// Executable looked up on `PATH`.
    pub const fn program(self) -> &'static str {
        match self {
            Self::Tclsh => "tclsh",
            Self::Vivado => "vivado",
            Self::Vitis => "vitis",
            Self::Ise => "ise",
            Self::PlanAhead => "planAhead",
        }
    }

    /// Interpreter binary relative to the installation directory, and the
    /// arguments that follow it.
    const fn local(self) -> (&'static str, &'static str) {
        match self {
            Self::Tclsh => ("tclsh", "{script} {args}"),
            Self::Vivado => ("bin/vivado", "-mode batch -source {script} -tclargs {args}"),
            Self::Vitis => ("bin/xsct", "{script} {args}"),
            Self::Ise => ("ISE/bin/lin64/xtclsh", "{script} {args}"),
            Self::PlanAhead => (
                "PlanAhead/bin/planAhead",
                "-mode batch -source {script} -tclargs {args}",
            ),
        }
    }

    /// How many levels above the `PATH` executable the installation lives.
    const fn depth(self) -> usize {
        match self {
            Self::Tclsh => 1,
            Self::Vivado | Self::Vitis => 2,
            Self::PlanAhead => 3,
            Self::Ise => 4,
        }
    }

    /// Whether the launcher ships a `settings64.sh`.
    pub const fn is_vendor(self) -> bool {
        !matches!(self, Self::Tclsh)
    }

    /// Locates the installation directory from `PATH`.
    ///
    /// PlanAhead ships inside ISE, so without a `planAhead` on `PATH` the
    /// ISE installation is used.
    pub fn find_program_dir(self) -> Result<PathBuf> {
        self.find_program_dir_in(std::env::var_os("PATH"))
    }

    /// [`find_program_dir`](Self::find_program_dir) over an explicit search
    /// path.
    fn find_program_dir_in(self, path: Option<OsString>) -> Result<PathBuf> {
        let exe = match which::which_in(self.program(), path.clone(), ".") {
            Ok(exe) => exe,
            Err(_) if self == Self::PlanAhead => {
                tracing::debug!("planAhead not on PATH, trying the ISE installation");
                return Self::Ise.find_program_dir_in(path);
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "{} not found on PATH: {e}",
                    self.program()
                )));
            }
        };
        exe.ancestors()
            .nth(self.depth())
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                Error::Config(format!(
                    "cannot derive the installation directory from {}",
                    exe.display()
                ))
            })
    }

    /// Command template for the installation at `program_dir`.
    pub fn command(self, program_dir: &Path) -> String {
        if !self.is_vendor() {
            return DEFAULT_COMMAND.to_owned();
        }
        let (bin, rest) = self.local();
        let path = program_dir.join(bin).to_string_lossy().into_owned();
        let quoted = shlex::try_quote(&path).map_or(path.clone(), |q| q.into_owned());
        format!("{quoted} {rest}")
    }

    /// Configures `builder` for this launcher.
    ///
    /// Without `program_dir`, the installation is located on `PATH`. With
    /// `source_env`, vendor launchers run with the environment their
    /// `settings64.sh` produces.
    pub fn configure(
        self,
        builder: SessionBuilder,
        program_dir: Option<&Path>,
        source_env: bool,
    ) -> Result<SessionBuilder> {
        if !self.is_vendor() {
            return Ok(builder.command(DEFAULT_COMMAND));
        }
        let dir = match program_dir {
            Some(dir) => dir.to_path_buf(),
            None => self.find_program_dir()?,
        };
        tracing::debug!(launcher = %self, dir = %dir.display(), "configuring vendor launcher");
        let builder = builder.command(self.command(&dir));
        if source_env {
            Ok(builder.env(settings_env(&dir)?))
        } else {
            Ok(builder)
        }
    }
}

impl std::fmt::Display for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Tclsh => "tclsh",
            Self::Vivado => "vivado",
            Self::Vitis => "vitis",
            Self::Ise => "ise",
            Self::PlanAhead => "planahead",
        })
    }
}

impl std::str::FromStr for Launcher {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown launcher: {s}"))
    }
}

/// Environment after sourcing `<dir>/settings64.sh` in bash.
pub fn settings_env(dir: &Path) -> Result<BTreeMap<String, String>> {
    let script = dir.join("settings64.sh");
    let output = Command::new("bash")
        .arg("-c")
        .arg("source \"$0\" >/dev/null && env -0")
        .arg(&script)
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::Process {
            message: format!("bash: {e}"),
            code: None,
            stderr: String::new(),
        })?;
    if !output.status.success() {
        return Err(Error::Process {
            message: format!("sourcing {} failed ({})", script.display(), output.status),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(parse_env(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses NUL-separated `KEY=VALUE` records.
fn parse_env(text: &str) -> BTreeMap<String, String> {
    text.split('\0')
        .filter_map(|record| record.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}
