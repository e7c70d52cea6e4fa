//! Finding the host-side end of a veth pair.
//!
//! The two ends of a pair share no name. What links them is the kernel's
//! view from the host: the host end's IFLA_LINK holds the index of the
//! namespaced end, and its IFLA_LINK_NETNSID holds the ID the host assigned
//! to the namespace that end lives in. Indices are only unique within one
//! namespace, so both keys have to match.

use std::path::Path;

use itertools::Itertools;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::link::{Introspector, NSID_NOT_ASSIGNED};
use crate::netns::NamespaceAccess;
use crate::types::Interface;

/// The sandbox of the namespaced interface called `name`
pub fn namespace_of<'a>(interfaces: &'a [Interface], name: &str) -> Result<&'a Path> {
    let mut named = interfaces.iter().filter(|intf| intf.name == name).peekable();
    if named.peek().is_none() {
        return Err(Error::InterfaceNotFound {
            interface: name.to_string(),
            namespace: None,
            reason: "could not find namespaced interface in prevResult".to_string(),
        });
    }

    named
        .find(|intf| !intf.in_host_namespace())
        .and_then(|intf| intf.sandbox.as_deref())
        .ok_or_else(|| {
            Error::invalid_config(name, "expected interface to be inside a namespace")
        })
}

/// Name of the host interface whose peer is `peer_index` in namespace `nsid`.
///
/// Only interfaces without a sandbox are candidates. Candidates that can no
/// longer be resolved are skipped. More than one match is an error rather
/// than a guess.
pub fn find_peer<I: Introspector>(
    links: &I,
    interfaces: &[Interface],
    nsid: i32,
    peer_index: u32,
) -> Result<String> {
    let matches = interfaces
        .iter()
        .filter(|intf| intf.in_host_namespace())
        .filter(|intf| match links.attributes_of(&intf.name) {
            Ok(attributes) => {
                trace!(candidate = %intf.name, ?attributes, "veth peer candidate");
                attributes.parent_index == peer_index && attributes.link_netnsid == Some(nsid)
            }
            Err(err) => {
                debug!(candidate = %intf.name, %err, "skipping unresolvable candidate");
                false
            }
        })
        .map(|intf| intf.name.clone())
        .unique()
        .collect::<Vec<_>>();

    match matches.into_iter().at_most_one() {
        Ok(Some(name)) => Ok(name),
        Ok(None) => Err(Error::PeerNotFound {
            nsid,
            index: peer_index,
        }),
        Err(rest) => Err(Error::AmbiguousPeer {
            nsid,
            index: peer_index,
            candidates: rest.collect(),
        }),
    }
}

/// Resolve the host-side peer of `name`, which lives in `sandbox`.
///
/// Must be called from the host namespace: the interface index is read
/// inside the sandbox, the namespace ID and candidates from outside.
pub fn peer_of<N, I>(
    netns: &N,
    links: &I,
    candidates: &[Interface],
    sandbox: &Path,
    name: &str,
) -> Result<String>
where
    N: NamespaceAccess,
    I: Introspector,
{
    let index = netns.with_namespace(sandbox, || {
        links.index_of(name).map_err(|err| in_sandbox(err, sandbox))
    })?;

    let nsid = links.correlation_id_of(sandbox)?;
    if nsid == NSID_NOT_ASSIGNED {
        return Err(Error::Namespace {
            path: sandbox.to_path_buf(),
            reason: "no namespace ID assigned by the host".to_string(),
        });
    }
    debug!(interface = name, netns = %sandbox.display(), index, nsid, "looking up veth peer");

    find_peer(links, candidates, nsid, index)
}

/// Attach the sandbox to a lookup failure made inside it
pub(crate) fn in_sandbox(err: Error, sandbox: &Path) -> Error {
    match err {
        Error::InterfaceNotFound {
            interface,
            namespace: None,
            reason,
        } => Error::InterfaceNotFound {
            interface,
            namespace: Some(sandbox.to_path_buf()),
            reason,
        },
        other => other,
    }
}
