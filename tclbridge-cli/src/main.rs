//! CLI for driving a Tcl interpreter through tclbridge.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod shell;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;
use tclbridge::proxy::Namespace;
use tclbridge::{ArgsPassing, Backend, Launcher, Session, SessionBuilder, SessionConfig, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tclbridge", version, about = "Drive a Tcl interpreter from the command line")]
struct Cli {
    #[command(flatten)]
    session: SessionArgs,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by every command that opens a session.
#[derive(clap::Args)]
struct SessionArgs {
    /// JSON session configuration to start from.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Known interpreter host (tclsh, vivado, vitis, ise, planahead).
    #[arg(long, global = true)]
    launcher: Option<Launcher>,

    /// Installation directory of a vendor launcher (default: found on PATH).
    #[arg(long, global = true, requires = "launcher")]
    program_dir: Option<PathBuf>,

    /// Skip sourcing the vendor installation's settings64.sh.
    #[arg(long, global = true, requires = "launcher")]
    no_source_env: bool,

    /// Command template with {script} and {args} placeholders.
    #[arg(long = "command", global = true)]
    template: Option<String>,

    /// Channel backend (auto, socket, pipe).
    #[arg(long, global = true)]
    backend: Option<Backend>,

    /// Listening port for the socket backend.
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Send payloads in plain text.
    #[arg(long, global = true)]
    no_encrypt: bool,

    /// How transport arguments reach the interpreter (file, command).
    #[arg(long, global = true)]
    args_passing: Option<ArgsPassing>,

    /// Set an environment variable for the interpreter (KEY=VALUE).
    #[arg(short = 'e', long = "env", global = true)]
    env: Vec<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a script and print its result.
    Eval {
        /// Script words, joined with spaces.
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        script: Vec<String>,
    },

    /// Source a script file and print its result.
    Run {
        /// Script file.
        file: PathBuf,
    },

    /// Print a variable.
    Get {
        /// Variable name.
        name: String,
    },

    /// Set a variable, then print its new value.
    Set {
        /// Variable name.
        name: String,
        /// Value, stored as a single word.
        value: String,
    },

    /// List the members of a namespace.
    #[command(visible_alias = "ls")]
    List {
        /// Namespace to list.
        #[arg(default_value = "::")]
        namespace: String,
        /// Output format.
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Start an interactive shell.
    Shell,

    /// Print the effective session configuration as JSON.
    Config {
        /// Write it to this file instead.
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// Machine-readable JSON.
    Json,
}

/// Members of one namespace.
#[derive(Serialize)]
struct Listing {
    namespace: String,
    namespaces: Vec<String>,
    functions: Vec<String>,
    variables: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = cli.dispatch() {
        eprintln!("tclbridge: {e:#}");
        std::process::exit(1);
    }
}

/// Logs to stderr; `RUST_LOG` overrides the verbosity flags.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    fn dispatch(self) -> Result<()> {
        match self.command {
            Command::Eval { script } => {
                let mut tcl = self.session.open()?;
                print_result(&tcl.eval(&script.join(" "))?);
                tcl.close();
                Ok(())
            }
            Command::Run { file } => {
                let mut tcl = self.session.open()?;
                print_result(&tcl.source(&file)?);
                tcl.close();
                Ok(())
            }
            Command::Get { name } => {
                let mut tcl = self.session.open()?;
                println!("{}", tcl.get(&name)?);
                Ok(())
            }
            Command::Set { name, value } => {
                let mut tcl = self.session.open()?;
                println!("{}", tcl.set(&name, Value::from(value))?);
                Ok(())
            }
            Command::List { namespace, format } => {
                let mut tcl = self.session.open()?;
                list(&mut tcl, &namespace, format)
            }
            Command::Shell => {
                let mut tcl = self.session.open()?;
                shell::run(&mut tcl)
            }
            Command::Config { save } => {
                let config = self.session.builder()?.to_config();
                match save {
                    Some(path) => config
                        .save(&path)
                        .with_context(|| format!("failed to write {}", path.display())),
                    None => {
                        println!("{}", serde_json::to_string_pretty(&config)?);
                        Ok(())
                    }
                }
            }
            Command::Completion { shell } => {
                clap_complete::generate(shell, &mut Self::command(), "tclbridge", &mut std::io::stdout());
                Ok(())
            }
        }
    }
}

impl SessionArgs {
    /// Folds the config file, launcher and flags into one builder, in that
    /// order of precedence (later wins).
    fn builder(&self) -> Result<SessionBuilder> {
        let mut builder = match &self.config {
            Some(path) => {
                let config = SessionConfig::load(path)
                    .with_context(|| format!("failed to load {}", path.display()))?;
                SessionBuilder::from_config(&config)
            }
            None => Session::builder(),
        };
        if let Some(launcher) = self.launcher {
            builder = launcher.configure(builder, self.program_dir.as_deref(), !self.no_source_env)?;
        }
        if let Some(template) = &self.template {
            builder = builder.command(template);
        }
        if let Some(backend) = self.backend {
            builder = builder.backend(backend);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if self.no_encrypt {
            builder = builder.encrypt(false);
        }
        if let Some(style) = self.args_passing {
            builder = builder.args_passing(style);
        }
        if !self.env.is_empty() {
            let mut env = builder
                .to_config()
                .env
                .unwrap_or_else(|| std::env::vars().collect());
            for pair in &self.env {
                let Some((key, value)) = pair.split_once('=') else {
                    bail!("invalid --env {pair:?}: expected KEY=VALUE");
                };
                env.insert(key.to_owned(), value.to_owned());
            }
            builder = builder.env(env);
        }
        Ok(builder.capture_output(false))
    }

    fn open(&self) -> Result<Session> {
        let config = self.builder()?.to_config();
        tracing::debug!(command = %config.command, backend = %config.backend, "opening session");
        SessionBuilder::from_config(&config)
            .open()
            .with_context(|| format!("failed to start `{}`", config.command))
    }
}

fn print_result(result: &str) {
    if !result.is_empty() {
        println!("{result}");
    }
}

fn list(tcl: &mut Session, namespace: &str, format: OutputFormat) -> Result<()> {
    let ns = Namespace::new(namespace);
    let listing = Listing {
        namespace: namespace.to_owned(),
        namespaces: ns.children(tcl)?,
        functions: ns.functions(tcl)?,
        variables: ns.variables(tcl)?,
    };

    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("{:<10} NAME", "KIND");
    for (kind, names) in [
        ("namespace", &listing.namespaces),
        ("function", &listing.functions),
        ("variable", &listing.variables),
    ] {
        for name in names {
            println!("{kind:<10} {name}");
        }
    }
    Ok(())
}
