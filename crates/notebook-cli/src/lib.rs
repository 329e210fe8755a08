//! notebook-cli library: the pieces behind the `notebook` binary.
//!
//! Exposed as a library so integration tests can drive a session directly.

pub mod commands;
pub mod config;
pub mod file_remote;

pub use commands::{Command, Session, render_tree};
pub use config::load_config;
pub use file_remote::FileRemote;
