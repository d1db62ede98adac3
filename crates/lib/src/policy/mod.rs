//! Security policies gating the sandbox's host capabilities.
//!
//! Policies are plain values loaded once at session start and handed to the capability modules
//! that need them. The sandbox never writes them back; administrative changes go through the
//! `add`/`remove`/`save` helpers and take effect on the next session.

pub mod commands;
pub mod listfile;
pub mod network;
pub mod path;

use crate::config::Paths;

pub use commands::CommandWhitelist;
pub use network::{AllowEntry, NetworkAllowList};

/// A capability request the active policy refused. Surfaced to scripts as result data.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PolicyError {
    #[error("command '{command}' (base name '{base}') is not in the allowed CLI commands list")]
    CommandNotAllowed { command: String, base: String },
    #[error("URL not in allowed hosts whitelist: {0}")]
    UrlNotAllowed(String),
    #[error("scheme '{scheme}' not allowed for {url} (only http and https)")]
    SchemeNotAllowed { url: String, scheme: String },
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("path traversal not allowed: {0}")]
    PathTraversal(String),
    #[error("invalid entry: '{0}'")]
    InvalidEntry(String),
    #[error("'{0}' is already in the list")]
    AlreadyListed(String),
    #[error("'{0}' is not in the list")]
    NotListed(String),
}

/// Supplies the policies for one session.
pub trait PolicyProvider: Send + Sync {
    /// Command whitelist. Errors are treated as an empty (deny-all) list.
    fn command_whitelist(&self) -> anyhow::Result<CommandWhitelist>;

    /// Network allow-list. Errors leave the session without a network collaborator.
    fn network_allowlist(&self) -> anyhow::Result<NetworkAllowList>;
}

/// Reads the permission files under the per-user base directory, fresh on every call.
#[derive(Debug, Clone)]
pub struct FilePolicies {
    paths: Paths,
}

impl FilePolicies {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }
}

impl PolicyProvider for FilePolicies {
    fn command_whitelist(&self) -> anyhow::Result<CommandWhitelist> {
        CommandWhitelist::load(&self.paths.command_whitelist())
    }

    fn network_allowlist(&self) -> anyhow::Result<NetworkAllowList> {
        NetworkAllowList::load(&self.paths.network_allowlist())
    }
}

/// Fixed in-memory policies.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicies {
    pub commands: CommandWhitelist,
    pub network: NetworkAllowList,
}

impl StaticPolicies {
    pub fn new(commands: CommandWhitelist, network: NetworkAllowList) -> Self {
        Self { commands, network }
    }
}

impl PolicyProvider for StaticPolicies {
    fn command_whitelist(&self) -> anyhow::Result<CommandWhitelist> {
        Ok(self.commands.clone())
    }

    fn network_allowlist(&self) -> anyhow::Result<NetworkAllowList> {
        Ok(self.network.clone())
    }
}
