//! Link attribute queries over rtnetlink.
//!
//! Each query opens its own netlink socket on a single-threaded runtime
//! driven by the calling thread. The socket binds to whatever network
//! namespace the thread is in at that moment, so a query issued inside a
//! [`crate::netns::NamespaceAccess`] excursion sees that namespace.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use futures::{StreamExt, TryStreamExt};
use rtnetlink::packet_core::{NetlinkMessage, NetlinkPayload, NLM_F_REQUEST};
use rtnetlink::packet_route::link::{LinkAttribute, LinkMessage};
use rtnetlink::packet_route::nsid::{NsidAttribute, NsidMessage};
use rtnetlink::packet_route::RouteNetlinkMessage;
use rtnetlink::{new_connection, Handle};
use tracing::trace;

use crate::error::{Error, Result};

/// Attributes of a live interface as seen from the querying namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkAttributes {
    /// Interface index
    pub index: u32,
    /// Index of the link's peer (IFLA_LINK), 0 if none
    pub parent_index: u32,
    /// ID the querying namespace assigned to the namespace holding the peer
    /// (IFLA_LINK_NETNSID); absent when the peer is local
    pub link_netnsid: Option<i32>,
}

impl LinkAttributes {
    fn from_message(message: &LinkMessage) -> Self {
        let mut attributes = Self {
            index: message.header.index,
            parent_index: 0,
            link_netnsid: None,
        };
        for nla in &message.attributes {
            match nla {
                LinkAttribute::Link(index) => attributes.parent_index = *index,
                LinkAttribute::LinkNetNsId(id) => attributes.link_netnsid = Some(*id),
                _ => {}
            }
        }
        attributes
    }
}

/// Looks up link and namespace identifiers
pub trait Introspector {
    /// Index of `name` in the current namespace
    fn index_of(&self, name: &str) -> Result<u32> {
        self.attributes_of(name).map(|attributes| attributes.index)
    }

    /// Attributes of `name` in the current namespace
    fn attributes_of(&self, name: &str) -> Result<LinkAttributes>;

    /// ID the current namespace assigned to the namespace at `path`
    fn correlation_id_of(&self, path: &Path) -> Result<i32>;
}

impl<I: Introspector + ?Sized> Introspector for &I {
    fn index_of(&self, name: &str) -> Result<u32> {
        (**self).index_of(name)
    }

    fn attributes_of(&self, name: &str) -> Result<LinkAttributes> {
        (**self).attributes_of(name)
    }

    fn correlation_id_of(&self, path: &Path) -> Result<i32> {
        (**self).correlation_id_of(path)
    }
}

/// Kernel reply when no ID has been assigned (NETNSA_NSID_NOT_ASSIGNED)
pub const NSID_NOT_ASSIGNED: i32 = -1;

/// Introspector backed by rtnetlink
#[derive(Debug, Clone, Copy, Default)]
pub struct NetlinkIntrospector;

impl NetlinkIntrospector {
    /// Run `f` against a fresh connection in the calling thread's namespace
    fn query<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Handle) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
            .map_err(|e| Error::Netlink(format!("failed to create runtime: {e}")))?;

        runtime.block_on(async {
            let (connection, handle, _) = new_connection()
                .map_err(|e| Error::Netlink(format!("failed to open netlink socket: {e}")))?;
            tokio::spawn(connection);
            f(handle).await
        })
    }

    /// Names of every link in the current namespace
    pub fn link_names(&self) -> Result<Vec<String>> {
        self.query(|handle| async move {
            let mut links = handle.link().get().execute();
            let mut names = Vec::new();
            while let Some(link) = links
                .try_next()
                .await
                .map_err(|e| Error::Netlink(format!("failed to dump links: {e}")))?
            {
                names.extend(link.attributes.iter().find_map(|nla| match nla {
                    LinkAttribute::IfName(name) => Some(name.clone()),
                    _ => None,
                }));
            }
            Ok(names)
        })
    }
}

impl Introspector for NetlinkIntrospector {
    fn attributes_of(&self, name: &str) -> Result<LinkAttributes> {
        let attributes = self.query(|handle| async move {
            let mut links = handle.link().get().match_name(name.to_string()).execute();
            let link = links
                .try_next()
                .await
                .map_err(|e| Error::InterfaceNotFound {
                    interface: name.to_string(),
                    namespace: None,
                    reason: e.to_string(),
                })?
                .ok_or_else(|| Error::InterfaceNotFound {
                    interface: name.to_string(),
                    namespace: None,
                    reason: "no such link".to_string(),
                })?;
            Ok(LinkAttributes::from_message(&link))
        })?;
        trace!(interface = name, ?attributes, "link attributes");
        Ok(attributes)
    }

    fn correlation_id_of(&self, path: &Path) -> Result<i32> {
        let file = File::open(path).map_err(|e| Error::Namespace {
            path: path.to_path_buf(),
            reason: format!("could not open file for reading: {e}"),
        })?;
        let fd = u32::try_from(file.as_raw_fd())
            .map_err(|_| Error::Netlink("invalid namespace descriptor".to_string()))?;

        let netns = path.to_path_buf();
        let nsid = self.query(|mut handle| async move {
            let mut message = NsidMessage::default();
            message.attributes.push(NsidAttribute::Fd(fd));
            let mut request = NetlinkMessage::from(RouteNetlinkMessage::GetNsId(message));
            request.header.flags = NLM_F_REQUEST;

            let responses = handle
                .request(request)
                .map_err(|e| nsid_error(&netns, e.to_string()))?;
            futures::pin_mut!(responses);
            while let Some(response) = responses.next().await {
                match response.payload {
                    NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewNsId(reply)) => {
                        if let Some(id) = reply.attributes.iter().find_map(|nla| match nla {
                            NsidAttribute::Id(id) => Some(*id),
                            _ => None,
                        }) {
                            return Ok(id);
                        }
                    }
                    NetlinkPayload::Error(err) => {
                        return Err(nsid_error(&netns, format!("{err:?}")));
                    }
                    _ => {}
                }
            }
            Err(nsid_error(&netns, "no namespace ID in reply".to_string()))
        })?;

        // Held until the kernel has answered.
        drop(file);
        trace!(netns = %path.display(), nsid, "namespace correlation ID");
        Ok(nsid)
    }
}

fn nsid_error(path: &Path, reason: String) -> Error {
    Error::Netlink(format!(
        "issue getting netns ID by fd, file: {}, err: {}",
        path.display(),
        reason
    ))
}
