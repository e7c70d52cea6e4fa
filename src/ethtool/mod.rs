use std::collections::BTreeMap;
use std::ffi::OsString;

use tracing::debug;

use crate::error::{Error, Result};
use crate::exec::{display_argv, CommandRunner, Invocation, Locator, SystemRunner};

/// Name of the offload configuration tool
pub const ETHTOOL: &str = "ethtool";

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Changes and reads offload features of an interface in the current namespace
pub trait OffloadApplier {
    /// Turn `parameter` on or off for `interface`
    fn set(&self, interface: &str, parameter: &str, enabled: bool) -> Result<CommandOutput>;

    /// Current feature states of `interface`
    fn features(&self, interface: &str) -> Result<BTreeMap<String, bool>>;
}

impl<A: OffloadApplier + ?Sized> OffloadApplier for &A {
    fn set(&self, interface: &str, parameter: &str, enabled: bool) -> Result<CommandOutput> {
        (**self).set(interface, parameter, enabled)
    }

    fn features(&self, interface: &str) -> Result<BTreeMap<String, bool>> {
        (**self).features(interface)
    }
}

/// `ethtool` invoked as an external command
#[derive(Debug, Clone)]
pub struct Ethtool<R = SystemRunner> {
    invocation: Invocation,
    runner: R,
}

impl Ethtool<SystemRunner> {
    /// Locate `ethtool` on this system
    pub fn from_env() -> Result<Self> {
        Self::locate(&Locator::from_env(), SystemRunner)
    }
}

impl<R: CommandRunner> Ethtool<R> {
    /// Resolve the executable once; a missing tool fails here, before any
    /// interface is touched
    pub fn locate(locator: &Locator, runner: R) -> Result<Self> {
        let invocation = locator.locate(ETHTOOL)?;
        Ok(Self { invocation, runner })
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let argv: Vec<OsString> = self.invocation.argv(args);
        let command = display_argv(&argv);
        debug!(%command, "running");

        let output = self.runner.run(&argv).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ExecutableNotFound(ETHTOOL.to_string()),
            _ => Error::Command {
                command: command.clone(),
                status: "not started".to_string(),
                stderr: e.to_string(),
            },
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(Error::Command {
                command,
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

impl<R: CommandRunner> OffloadApplier for Ethtool<R> {
    fn set(&self, interface: &str, parameter: &str, enabled: bool) -> Result<CommandOutput> {
        self.run(&["-K", interface, parameter, on_off(enabled)])
    }

    fn features(&self, interface: &str) -> Result<BTreeMap<String, bool>> {
        let output = self.run(&["-k", interface])?;
        Ok(parse_features(&output.stdout))
    }
}

/// The tool's spelling of a boolean
pub fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Parse `ethtool -k` output into feature states.
///
/// Lines look like `tx-checksumming: on` or `\ttx-checksum-ipv4: off [fixed]`;
/// the `Features for eth0:` header and anything unparseable are skipped.
pub fn parse_features(output: &str) -> BTreeMap<String, bool> {
    output
        .lines()
        .filter_map(|line| {
            let (name, rest) = line.trim().split_once(':')?;
            let state = match rest.split_whitespace().next()? {
                "on" => true,
                "off" => false,
                _ => return None,
            };
            Some((name.trim().to_string(), state))
        })
        .collect()
}
