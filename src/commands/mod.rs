use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::io::{self, Read};
use tracing::{debug, info};

use crate::config::NetConf;
use crate::ethtool::Ethtool;
use crate::link::NetlinkIntrospector;
use crate::logging;
use crate::netns::Netns;
use crate::plugin::EthtoolPlugin;
use crate::types::{CmdArgs, VersionInfo};

/// Parse command arguments from environment
pub fn parse_args() -> Result<CmdArgs> {
    // Get required environment variables
    let container_id = env::var("CNI_CONTAINERID")
        .context("CNI_CONTAINERID not found in environment")?;

    let ifname = env::var("CNI_IFNAME")
        .context("CNI_IFNAME not found in environment")?;

    // DEL may be called after the namespace is gone
    let netns = env::var("CNI_NETNS").ok().filter(|netns| !netns.is_empty());

    let path = env::var("CNI_PATH").unwrap_or_default();

    // Get args (if any)
    let args_str = env::var("CNI_ARGS").unwrap_or_default();
    let args = parse_cni_args(&args_str);

    // Read stdin data
    let mut stdin_data = Vec::new();
    io::stdin().read_to_end(&mut stdin_data)
        .context("Failed to read from stdin")?;

    Ok(CmdArgs {
        container_id,
        netns,
        ifname,
        args,
        path,
        stdin_data,
    })
}

/// Parse CNI_ARGS string into key-value pairs
pub fn parse_cni_args(args_str: &str) -> HashMap<String, String> {
    args_str
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Parse the network configuration and set up logging as it asks
fn load(args: &CmdArgs) -> Result<NetConf> {
    let conf = NetConf::parse(&args.stdin_data)?;
    logging::init(conf.debug, conf.log_file.as_deref())?;
    Ok(conf)
}

/// Execute the add command
pub fn cmd_add(args: &CmdArgs) -> Result<()> {
    let conf = load(args)?;
    debug!(
        container_id = %args.container_id,
        ifname = %args.ifname,
        conf = %serde_json::to_string(&conf.ethtool)?,
        logfile = ?conf.log_file,
        debug = conf.debug,
        "cmdAdd"
    );

    let prev_result = conf.prev_result()?;
    debug!(prev_result = ?prev_result.interfaces(), "cmdAdd");

    // Nothing configured: do not require the tool at all
    if conf.ethtool.is_empty() {
        info!(container_id = %args.container_id, "no ethtool settings configured");
        return prev_result.print(&conf.cni_version);
    }

    let ethtool = Ethtool::from_env()?;
    let plugin = EthtoolPlugin::new(Netns, NetlinkIntrospector, ethtool);
    plugin.add_network(&conf.ethtool, prev_result.interfaces())?;

    info!(
        container_id = %args.container_id,
        interfaces = conf.ethtool.len(),
        "ethtool settings applied"
    );

    // Pass through the result for the next plugin
    prev_result.print(&conf.cni_version)
}

/// Execute the delete command
pub fn cmd_del(args: &CmdArgs) -> Result<()> {
    let conf = load(args)?;
    // Offload settings disappear together with the interfaces
    debug!(
        container_id = %args.container_id,
        netns = ?args.netns,
        network = %conf.name,
        "cmdDel"
    );
    Ok(())
}

/// Execute the check command
pub fn cmd_check(args: &CmdArgs) -> Result<()> {
    let conf = load(args)?;
    debug!(container_id = %args.container_id, "cmdCheck");

    let prev_result = conf.prev_result()?;
    if conf.ethtool.is_empty() {
        return Ok(());
    }

    let ethtool = Ethtool::from_env()?;
    let plugin = EthtoolPlugin::new(Netns, NetlinkIntrospector, ethtool);
    plugin.check_network(&conf.ethtool, prev_result.interfaces())?;
    Ok(())
}

/// Execute the version command
pub fn cmd_version() -> Result<()> {
    println!("{}", serde_json::to_string(&VersionInfo::default())?);
    Ok(())
}

/// Main entry point for the CNI plugin
pub fn run_cni() -> Result<()> {
    // Get command from environment
    let cmd = env::var("CNI_COMMAND")
        .context("CNI_COMMAND not found in environment")?;

    // Execute the appropriate command
    match cmd.as_str() {
        "ADD" => cmd_add(&parse_args()?),
        "DEL" => cmd_del(&parse_args()?),
        "CHECK" => cmd_check(&parse_args()?),
        "VERSION" => cmd_version(),
        _ => anyhow::bail!("Unknown CNI command: {}", cmd),
    }
}
