use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// CNI versions this plugin accepts
pub const SUPPORTED_VERSIONS: &[&str] = &["0.3.0", "0.3.1", "0.4.0", "1.0.0", "1.1.0"];

/// CNI command arguments
#[derive(Debug, Clone)]
pub struct CmdArgs {
    /// Container ID
    pub container_id: String,
    /// Network namespace path (absent on some DEL calls)
    pub netns: Option<String>,
    /// Interface name
    pub ifname: String,
    /// Arguments
    pub args: HashMap<String, String>,
    /// Path
    pub path: String,
    /// Standard input data
    pub stdin_data: Vec<u8>,
}

/// The result handed over by the previous plugin in the chain.
///
/// Only the interface list is interpreted; everything else is carried
/// through untouched by [`PrevResult::print`].
#[derive(Debug, Clone)]
pub struct PrevResult {
    raw: serde_json::Value,
    interfaces: Vec<Interface>,
}

#[derive(Debug, Default, Deserialize)]
struct InterfaceList {
    #[serde(default)]
    interfaces: Option<Vec<Interface>>,
}

/// Interface information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Interface name
    pub name: String,
    /// MAC address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Sandbox path (network namespace); absent means the host namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<PathBuf>,
}

impl Interface {
    /// A host-namespace interface
    pub fn host(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mac: None,
            sandbox: None,
        }
    }

    /// An interface living in the namespace at `sandbox`
    pub fn sandboxed(name: &str, sandbox: impl AsRef<Path>) -> Self {
        Self {
            name: name.to_string(),
            mac: None,
            sandbox: Some(sandbox.as_ref().to_path_buf()),
        }
    }

    /// Whether the interface lives in the host/root namespace.
    ///
    /// Runtimes sometimes serialize the host namespace as an empty string.
    pub fn in_host_namespace(&self) -> bool {
        self.sandbox
            .as_ref()
            .map_or(true, |sandbox| sandbox.as_os_str().is_empty())
    }
}

impl PrevResult {
    /// Interpret a `prevResult` JSON object
    pub fn from_value(raw: serde_json::Value) -> serde_json::Result<Self> {
        let list: InterfaceList = serde_json::from_value(raw.clone())?;
        Ok(Self {
            raw,
            interfaces: list.interfaces.unwrap_or_default(),
        })
    }

    /// Interfaces reported by the previous plugin
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// The result to hand to the next plugin, stamped with `cni_version`
    pub fn to_output(&self, cni_version: &str) -> serde_json::Value {
        let mut out = self.raw.clone();
        if let Some(map) = out.as_object_mut() {
            map.insert(
                "cniVersion".to_string(),
                serde_json::Value::String(cni_version.to_string()),
            );
        }
        out
    }

    /// Print result as JSON
    pub fn print(&self, cni_version: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.to_output(cni_version))?;
        println!("{}", json);
        Ok(())
    }
}

/// Error object returned to the runtime on failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CniError {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    pub code: u32,
    pub msg: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

impl CniError {
    /// Build the error object for `err`
    pub fn from_anyhow(cni_version: &str, err: &anyhow::Error) -> Self {
        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<crate::Error>())
            .map_or(crate::error::CNI_GENERIC_FAILURE, crate::Error::cni_code);
        let details = err
            .chain()
            .skip(1)
            .map(|cause| cause.to_string())
            .collect::<Vec<_>>()
            .join(": ");
        Self {
            cni_version: cni_version.to_string(),
            code,
            msg: err.to_string(),
            details,
        }
    }
}

/// Output of the VERSION command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    #[serde(rename = "supportedVersions")]
    pub supported_versions: Vec<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            cni_version: "1.0.0".to_string(),
            supported_versions: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
        }
    }
}
