use veth_ethtool::commands::run_cni;
use veth_ethtool::types::{CniError, VersionInfo};

fn main() {
    // Run the CNI plugin
    if let Err(err) = run_cni() {
        tracing::error!("CNI plugin error: {:#}", err);

        // Output error in CNI format
        let error = CniError::from_anyhow(&VersionInfo::default().cni_version, &err);
        match serde_json::to_string(&error) {
            Ok(json) => println!("{}", json),
            Err(_) => eprintln!("{:#}", err),
        }
        std::process::exit(1);
    }
}
