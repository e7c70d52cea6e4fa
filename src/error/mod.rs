use std::path::PathBuf;
use thiserror::Error;

/// CNI error code for an invalid network configuration
pub const CNI_INVALID_NETWORK_CONFIG: u32 = 7;
/// CNI error code for a transient failure the runtime may retry
pub const CNI_TRY_AGAIN_LATER: u32 = 11;
/// CNI error code for anything else
pub const CNI_GENERIC_FAILURE: u32 = 999;

/// Errors raised while applying offload settings
#[derive(Debug, Error)]
pub enum Error {
    /// The desired configuration has the wrong shape
    #[error("invalid ethtool configuration for interface {interface:?}: {reason}")]
    InvalidConfig { interface: String, reason: String },

    /// The network configuration could not be parsed at all
    #[error("invalid network configuration: {0}")]
    InvalidNetConf(String),

    /// A sandbox path could not be opened, entered or left
    #[error("network namespace {path}: {reason}")]
    Namespace { path: PathBuf, reason: String },

    /// An interface does not exist where it was looked up
    #[error("interface {interface:?} not found{location}: {reason}", location = in_namespace(.namespace))]
    InterfaceNotFound {
        interface: String,
        namespace: Option<PathBuf>,
        reason: String,
    },

    /// The external tool is missing from every search location
    #[error("could not find executable {0:?}")]
    ExecutableNotFound(String),

    /// No host interface matched the correlation keys
    #[error("could not find veth peer for netnsID {nsid}, peerInterfaceIndex {index}")]
    PeerNotFound { nsid: i32, index: u32 },

    /// More than one host interface matched the correlation keys
    #[error("ambiguous veth peer for netnsID {nsid}, peerInterfaceIndex {index}: candidates {candidates:?}")]
    AmbiguousPeer {
        nsid: i32,
        index: u32,
        candidates: Vec<String>,
    },

    /// The external tool ran but did not succeed
    #[error("command `{command}` failed ({status}): {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },

    /// A live setting differs from the configured one
    #[error("interface {interface:?}: {parameter} is {actual}, expected {expected}")]
    SettingMismatch {
        interface: String,
        parameter: String,
        expected: String,
        actual: String,
    },

    /// The kernel rejected or failed a netlink request
    #[error("netlink: {0}")]
    Netlink(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

fn in_namespace(namespace: &Option<PathBuf>) -> String {
    match namespace {
        Some(path) => format!(" in namespace {}", path.display()),
        None => " in host namespace".to_string(),
    }
}

impl Error {
    /// Shorthand for a validation failure on one configured interface
    pub fn invalid_config(interface: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            interface: interface.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the NotFound class
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::InterfaceNotFound { .. }
                | Self::ExecutableNotFound(_)
                | Self::PeerNotFound { .. }
                | Self::AmbiguousPeer { .. }
        )
    }

    /// CNI error code reported to the container runtime
    pub fn cni_code(&self) -> u32 {
        match self {
            Self::InvalidConfig { .. } | Self::InvalidNetConf(_) | Self::Json(_) => {
                CNI_INVALID_NETWORK_CONFIG
            }
            Self::InterfaceNotFound { .. } | Self::PeerNotFound { .. } => CNI_TRY_AGAIN_LATER,
            _ => CNI_GENERIC_FAILURE,
        }
    }
}

/// Result type for veth-ethtool operations
pub type Result<T> = std::result::Result<T, Error>;
