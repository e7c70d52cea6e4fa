//! Chained CNI plugin for ethtool offload settings
//!
//! This implementation provides a pure Rust chained CNI plugin that:
//! - Reads the interfaces reported by the previous plugin
//! - Applies offload settings to the interface inside the container namespace
//! - Finds the host-side end of its veth pair and applies peer settings there
//! - Passes the previous result through unchanged

pub mod commands;
pub mod config;
pub mod error;
pub mod ethtool;
pub mod exec;
pub mod link;
pub mod logging;
pub mod netns;
pub mod plugin;
pub mod types;
pub mod veth;

// Re-export commonly used items
pub use commands::{cmd_add, cmd_check, cmd_del, run_cni};
pub use config::{EthtoolConfig, EthtoolConfigs, NetConf};
pub use error::{Error, Result};
pub use plugin::EthtoolPlugin;
