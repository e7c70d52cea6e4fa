use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::PrevResult;

/// Key selecting settings for the interface inside the namespace
pub const SELF_CLASSIFIER: &str = "self";
/// Key selecting settings for the host-side veth peer
pub const PEER_CLASSIFIER: &str = "peer";

/// Offload parameter name to desired on/off state
pub type Settings = BTreeMap<String, bool>;

/// The untyped `ethtool` object as it appears in the network configuration
pub type RawEthtoolConfigs = BTreeMap<String, BTreeMap<String, Settings>>;

/// Desired settings for one logical interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EthtoolConfig {
    /// Settings for the interface itself
    #[serde(rename = "self")]
    pub own: Settings,
    /// Settings for its veth peer in the host namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<Settings>,
}

impl EthtoolConfig {
    /// Validate the classifier map of `interface`.
    ///
    /// The key set must be exactly `{self}` or `{self, peer}` and each
    /// present map must name at least one parameter.
    pub fn validate(interface: &str, mut raw: BTreeMap<String, Settings>) -> Result<Self> {
        if let Some(unknown) = raw
            .keys()
            .find(|key| *key != SELF_CLASSIFIER && *key != PEER_CLASSIFIER)
        {
            return Err(Error::invalid_config(
                interface,
                format!("unrecognized key {unknown:?}, expected \"self\" and optionally \"peer\""),
            ));
        }

        let own = raw.remove(SELF_CLASSIFIER).ok_or_else(|| {
            Error::invalid_config(interface, "missing \"self\" settings")
        })?;
        if own.is_empty() {
            return Err(Error::invalid_config(interface, "\"self\" settings are empty"));
        }

        let peer = raw.remove(PEER_CLASSIFIER);
        if peer.as_ref().is_some_and(BTreeMap::is_empty) {
            return Err(Error::invalid_config(interface, "\"peer\" settings are empty"));
        }

        Ok(Self { own, peer })
    }

    /// Settings for the interface itself
    pub fn self_settings(&self) -> &Settings {
        &self.own
    }

    /// Settings for the veth peer, if any
    pub fn peer_settings(&self) -> Option<&Settings> {
        self.peer.as_ref()
    }
}

/// Desired settings for every configured interface, keyed by interface name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEthtoolConfigs")]
pub struct EthtoolConfigs(BTreeMap<String, EthtoolConfig>);

impl EthtoolConfigs {
    /// Validate every entry; an empty map is a valid no-op
    pub fn validate(raw: RawEthtoolConfigs) -> Result<Self> {
        raw.into_iter()
            .map(|(interface, entry)| {
                EthtoolConfig::validate(&interface, entry).map(|config| (interface, config))
            })
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Self)
    }

    /// Iterate entries in interface name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EthtoolConfig)> {
        self.0.iter().map(|(name, config)| (name.as_str(), config))
    }

    pub fn get(&self, interface: &str) -> Option<&EthtoolConfig> {
        self.0.get(interface)
    }

    pub fn insert(&mut self, interface: &str, config: EthtoolConfig) {
        self.0.insert(interface.to_string(), config);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<RawEthtoolConfigs> for EthtoolConfigs {
    type Error = Error;

    fn try_from(raw: RawEthtoolConfigs) -> Result<Self> {
        Self::validate(raw)
    }
}

/// Network configuration for the ethtool CNI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConf {
    /// CNI specification version
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    /// Name of the network
    #[serde(default)]
    pub name: String,
    /// Type of CNI plugin
    #[serde(rename = "type", default)]
    pub plugin_type: String,
    /// Log at debug level
    #[serde(default)]
    pub debug: bool,
    /// Append logs to this file instead of stderr
    #[serde(rename = "logfile", default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Offload settings per interface
    #[serde(default)]
    pub ethtool: EthtoolConfigs,
    /// Result of the previous plugin in the chain
    #[serde(rename = "prevResult", default, skip_serializing_if = "Option::is_none")]
    pub prev_result: Option<serde_json::Value>,
}

impl NetConf {
    /// Parse NetConf from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidNetConf(e.to_string()))
    }

    /// Load a single plugin config, or the first `veth-ethtool` entry of a conflist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))?;

        let Some(plugins) = value.get("plugins").and_then(|p| p.as_array()) else {
            return Ok(Self::parse(&bytes)?);
        };

        let mut plugin = plugins
            .iter()
            .find(|p| p.get("type").and_then(|t| t.as_str()) == Some(PLUGIN_TYPE))
            .cloned()
            .with_context(|| format!("No {} plugin in {}", PLUGIN_TYPE, path.display()))?;
        if let (Some(map), Some(version)) = (plugin.as_object_mut(), value.get("cniVersion")) {
            map.entry("cniVersion").or_insert_with(|| version.clone());
        }
        Ok(Self::parse(&serde_json::to_vec(&plugin)?)?)
    }

    /// Create a default configuration for a set of interfaces
    pub fn new_default(name: &str, ethtool: EthtoolConfigs) -> Self {
        Self {
            cni_version: "1.0.0".to_string(),
            name: name.to_string(),
            plugin_type: PLUGIN_TYPE.to_string(),
            debug: false,
            log_file: None,
            ethtool,
            prev_result: None,
        }
    }

    /// The previous result; this plugin only runs chained
    pub fn prev_result(&self) -> Result<PrevResult> {
        let raw = self
            .prev_result
            .clone()
            .ok_or_else(|| Error::InvalidNetConf("must be called as chained plugin".to_string()))?;
        PrevResult::from_value(raw)
            .map_err(|e| Error::InvalidNetConf(format!("failed to convert prevResult: {e}")))
    }

    /// Save configuration to a file
    pub fn save(&self, path: PathBuf) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// The `type` this plugin is registered under
pub const PLUGIN_TYPE: &str = "veth-ethtool";
