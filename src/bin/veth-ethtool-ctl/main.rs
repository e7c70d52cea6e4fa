use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use veth_ethtool::config::{EthtoolConfig, EthtoolConfigs, NetConf, Settings};
use veth_ethtool::ethtool::{on_off, Ethtool, OffloadApplier};
use veth_ethtool::link::NetlinkIntrospector;
use veth_ethtool::logging;
use veth_ethtool::netns::{NamespaceAccess, Netns};
use veth_ethtool::types::Interface;
use veth_ethtool::veth;

/// A command line tool to generate, validate and inspect veth-ethtool settings
#[derive(Parser)]
#[clap(name = "veth-ethtool-ctl", author, version, about)]
struct Cli {
    /// Enable verbose output
    #[clap(short, long)]
    verbose: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a plugin configuration entry
    Generate {
        /// Interface name inside the container
        #[clap(long, default_value = "eth0")]
        iface: String,

        /// Setting for the interface itself (feature=on|off)
        #[clap(long = "self", value_parser = parse_setting, required = true)]
        own: Vec<(String, bool)>,

        /// Setting for the host-side veth peer (feature=on|off)
        #[clap(long, value_parser = parse_setting)]
        peer: Vec<(String, bool)>,

        /// Network name
        #[clap(long, default_value = "veth-ethtool")]
        name: String,

        /// Log at debug level
        #[clap(long)]
        debug: bool,

        /// Log file for the plugin
        #[clap(long)]
        logfile: Option<PathBuf>,

        /// Output file path
        #[clap(long)]
        output: Option<PathBuf>,
    },

    /// Validate a plugin configuration or conflist
    Validate {
        /// Configuration file
        #[clap(long)]
        config: PathBuf,
    },

    /// Print the host-side veth peer of a namespaced interface
    Peer {
        /// Network namespace path
        #[clap(long)]
        netns: PathBuf,

        /// Interface name inside the namespace
        #[clap(long, default_value = "eth0")]
        ifname: String,
    },

    /// Show offload features of an interface
    Show {
        /// Interface name
        #[clap(long)]
        ifname: String,

        /// Network namespace path; host namespace if omitted
        #[clap(long)]
        netns: Option<PathBuf>,
    },
}

fn parse_setting(s: &str) -> Result<(String, bool)> {
    let (key, value) = s
        .split_once('=')
        .with_context(|| format!("Invalid feature=on|off format: {}", s))?;
    let enabled = match value {
        "on" | "true" => true,
        "off" | "false" => false,
        _ => anyhow::bail!("Invalid setting {:?} for {}, expected on or off", value, key),
    };
    Ok((key.to_string(), enabled))
}

fn generate_network_config(
    iface: &str,
    own: Vec<(String, bool)>,
    peer: Vec<(String, bool)>,
    name: &str,
    debug: bool,
    logfile: Option<PathBuf>,
) -> Result<NetConf> {
    let mut raw = BTreeMap::new();
    raw.insert("self".to_string(), own.into_iter().collect::<Settings>());
    if !peer.is_empty() {
        raw.insert("peer".to_string(), peer.into_iter().collect::<Settings>());
    }

    let mut ethtool = EthtoolConfigs::default();
    ethtool.insert(iface, EthtoolConfig::validate(iface, raw)?);

    let mut conf = NetConf::new_default(name, ethtool);
    conf.debug = debug;
    conf.log_file = logfile;
    Ok(conf)
}

fn print_settings(label: &str, settings: &Settings) {
    println!("    {}:", label);
    for (parameter, enabled) in settings {
        println!("      {}: {}", parameter, on_off(*enabled));
    }
}

fn find_peer(netns: &Path, ifname: &str) -> Result<String> {
    let links = NetlinkIntrospector;
    let candidates = links
        .link_names()
        .context("Failed to list host interfaces")?
        .iter()
        .map(|name| Interface::host(name))
        .collect::<Vec<_>>();
    debug!(candidates = candidates.len(), "listed host interfaces");

    Ok(veth::peer_of(&Netns, &links, &candidates, netns, ifname)?)
}

fn show_features(ifname: &str, netns: Option<&Path>) -> Result<BTreeMap<String, bool>> {
    let ethtool = Ethtool::from_env()?;
    let features = match netns {
        Some(path) => Netns.with_namespace(path, || ethtool.features(ifname))?,
        None => ethtool.features(ifname)?,
    };
    Ok(features)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configure logging based on verbosity
    logging::init_cli(cli.verbose)?;

    match cli.command {
        Commands::Generate { iface, own, peer, name, debug, logfile, output } => {
            let config = generate_network_config(&iface, own, peer, &name, debug, logfile)?;

            if let Some(path) = output {
                config.save(path.clone())?;
                println!("Network configuration written to {}", path.display());
            } else {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },

        Commands::Validate { config } => {
            let conf = NetConf::load(&config)?;
            info!(path = %config.display(), "configuration is valid");

            println!("Configuration {} is valid", config.display());
            if conf.ethtool.is_empty() {
                println!("  No interfaces configured");
            }
            for (name, entry) in conf.ethtool.iter() {
                println!("  Interface {}:", name);
                print_settings("self", entry.self_settings());
                if let Some(peer) = entry.peer_settings() {
                    print_settings("peer", peer);
                }
            }
        },

        Commands::Peer { netns, ifname } => {
            let peer = find_peer(&netns, &ifname)?;
            println!("{}", peer);
        },

        Commands::Show { ifname, netns } => {
            let features = show_features(&ifname, netns.as_deref())?;

            println!("Features for {}:", ifname);
            for (feature, enabled) in features {
                println!("  {}: {}", feature, on_off(enabled));
            }
        },
    }

    Ok(())
}
