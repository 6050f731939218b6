//! The fatal-error taxonomy: distinguishes *why* a run aborted without
//! forcing every call site onto a bespoke `anyhow!` string. Each variant
//! still flows through `anyhow::Result` at the call site; only the top
//! (binary) boundary cares about the taxonomy itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("topology error: {0}")]
    Topology(String),

    #[error("IP assignment error: {0}")]
    Assignment(String),

    #[error("host validation error for '{host}': {reason}")]
    HostValidation { host: String, reason: String },

    #[error("could not resolve plugin '{plugin}': {reason}")]
    PluginResolution { plugin: String, reason: String },
}
