use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::{EthtoolConfig, EthtoolConfigs, Settings};
use crate::error::{Error, Result};
use crate::ethtool::{on_off, OffloadApplier};
use crate::link::Introspector;
use crate::netns::NamespaceAccess;
use crate::types::Interface;
use crate::veth;

/// Applies configured offload settings to interfaces and their veth peers
pub struct EthtoolPlugin<N, I, A> {
    netns: N,
    links: I,
    applier: A,
}

/// Where one configured interface and its peer live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target<'a> {
    pub interface: &'a str,
    pub sandbox: &'a Path,
    pub peer: Option<String>,
}

impl<N, I, A> EthtoolPlugin<N, I, A>
where
    N: NamespaceAccess,
    I: Introspector,
    A: OffloadApplier,
{
    /// Create a new plugin
    pub fn new(netns: N, links: I, applier: A) -> Self {
        Self {
            netns,
            links,
            applier,
        }
    }

    /// Apply every configured setting.
    ///
    /// Stops at the first failure; settings applied before it stay applied.
    pub fn add_network(&self, configs: &EthtoolConfigs, interfaces: &[Interface]) -> Result<()> {
        for (name, config) in configs.iter() {
            let target = self.resolve(name, config, interfaces)?;

            self.netns.with_namespace(target.sandbox, || {
                self.apply_settings(name, Some(target.sandbox), config.self_settings())
            })?;

            if let (Some(peer), Some(settings)) = (&target.peer, config.peer_settings()) {
                self.apply_settings(peer, None, settings)?;
            }

            info!(
                interface = name,
                netns = %target.sandbox.display(),
                peer = target.peer.as_deref().unwrap_or(""),
                "applied ethtool settings"
            );
        }
        Ok(())
    }

    /// Verify that live settings match the configuration
    pub fn check_network(&self, configs: &EthtoolConfigs, interfaces: &[Interface]) -> Result<()> {
        for (name, config) in configs.iter() {
            let target = self.resolve(name, config, interfaces)?;

            self.netns.with_namespace(target.sandbox, || {
                self.verify_settings(name, Some(target.sandbox), config.self_settings())
            })?;

            if let (Some(peer), Some(settings)) = (&target.peer, config.peer_settings()) {
                self.verify_settings(peer, None, settings)?;
            }
        }
        Ok(())
    }

    /// Find the sandbox of `name` and, if peer settings exist, its host-side peer
    pub fn resolve<'a>(
        &self,
        name: &'a str,
        config: &EthtoolConfig,
        interfaces: &'a [Interface],
    ) -> Result<Target<'a>> {
        let sandbox = veth::namespace_of(interfaces, name)?;

        let peer = match config.peer_settings() {
            Some(_) => Some(veth::peer_of(
                &self.netns,
                &self.links,
                interfaces,
                sandbox,
                name,
            )?),
            None => None,
        };
        debug!(
            interface = name,
            namespace = %sandbox.display(),
            veth = peer.as_deref().unwrap_or(""),
            "resolved interface"
        );

        Ok(Target {
            interface: name,
            sandbox,
            peer,
        })
    }

    fn apply_settings(
        &self,
        interface: &str,
        namespace: Option<&Path>,
        settings: &Settings,
    ) -> Result<()> {
        let netns = namespace.map(|path| path.display().to_string()).unwrap_or_default();
        for (parameter, &enabled) in settings {
            debug!(
                namespace = netns.as_str(),
                interface,
                parameter = parameter.as_str(),
                setting = enabled,
                "ethtool set"
            );
            self.applier
                .set(interface, parameter, enabled)
                .map_err(|err| with_namespace_context(err, namespace))?;
        }
        Ok(())
    }

    fn verify_settings(
        &self,
        interface: &str,
        namespace: Option<&Path>,
        settings: &Settings,
    ) -> Result<()> {
        let features = self
            .applier
            .features(interface)
            .map_err(|err| with_namespace_context(err, namespace))?;

        for (parameter, &expected) in settings {
            match features.get(parameter) {
                Some(&actual) if actual == expected => {}
                Some(&actual) => {
                    return Err(Error::SettingMismatch {
                        interface: interface.to_string(),
                        parameter: parameter.clone(),
                        expected: on_off(expected).to_string(),
                        actual: on_off(actual).to_string(),
                    });
                }
                None => warn!(
                    interface,
                    parameter = parameter.as_str(),
                    "feature not reported by ethtool -k, skipping check"
                ),
            }
        }
        Ok(())
    }
}

fn with_namespace_context(err: Error, namespace: Option<&Path>) -> Error {
    match (err, namespace) {
        (
            Error::Command {
                command,
                status,
                stderr,
            },
            Some(path),
        ) => Error::Command {
            command: format!("{command} (in {})", path.display()),
            status,
            stderr,
        },
        (err, Some(path)) => veth::in_sandbox(err, path),
        (err, None) => err,
    }
}
