//! amo core library: a capability-gated, cancellable sandbox for `//!amo` workflow scripts,
//! plus the administrative pieces around it (configuration, permission files, workflow
//! installation) used by the CLI.

pub mod assets;
pub mod capabilities;
pub mod clipboard;
pub mod config;
pub mod downloader;
pub mod engine;
pub mod filesystem;
pub mod init;
pub mod network;
pub mod policy;
pub mod resolver;
pub mod script;
pub mod tools;
pub mod vars;

pub use engine::{Engine, EngineError, FailureKind, RunOptions};
pub use vars::RuntimeVariables;
