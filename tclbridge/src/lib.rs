//! Drive a Tcl interpreter from Rust.
//!
//! `tclbridge` launches `tclsh` (or a vendor shell such as Vivado) as a
//! subprocess, connects to it over a loopback socket or a FIFO pair, and
//! speaks a small synchronous RPC protocol with it: the host evaluates
//! commands, and the interpreter can call registered host functions while a
//! command is pending. Payloads are AES-encrypted by default.
//!
//! # Quick start
//!
//! ```no_run
//! use tclbridge::{Session, Value};
//!
//! let mut tcl = Session::builder().open().expect("failed to start tclsh");
//!
//! tcl.set("greeting", "hello world").unwrap();
//! assert_eq!(tcl.eval("string length $greeting").unwrap(), "11");
//!
//! tcl.register_fn("add", |_, args| {
//!     let sum: i64 = args.iter().map(|a| a.parse::<i64>().unwrap_or(0)).sum();
//!     Ok(Value::Int(sum))
//! })
//! .unwrap();
//! assert_eq!(tcl.eval("add 2 3").unwrap(), "5");
//!
//! let list = tcl.root().variable("l").list();
//! tcl.eval("set l {a {b c} d}").unwrap();
//! list.set_element(&mut tcl, -1, "z").unwrap();
//! assert_eq!(tcl.get("l").unwrap(), "a {b c} z");
//! ```

mod config;
mod error;
pub mod launcher;
pub mod proxy;
mod resources;
mod session;
mod transport;
pub mod value;

pub use config::{
    ArgsPassing, Backend, DEFAULT_COMMAND, PortSpec, SessionBuilder, SessionConfig,
};
pub use error::{BoxError, Error, Result};
pub use launcher::Launcher;
pub use resources::Resources;
pub use session::{Callback, Interp, Session, SessionState, callback};
pub use transport::Output;
pub use value::Value;
