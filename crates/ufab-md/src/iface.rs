use std::net::SocketAddr;

use ufab_types::{make_error_msg, Result, StatusCode};

use crate::component::TlSelector;
use crate::config::ConfigBundle;
use crate::md::MemoryDomain;

/// A communication interface opened on a transport.
///
/// Opaque to this layer; data-path operations belong to the transport
/// crates.
pub trait Iface: Send {}

impl std::fmt::Debug for dyn Iface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iface").finish_non_exhaustive()
    }
}

/// How an interface connects.
#[derive(Debug, Clone)]
pub enum OpenMode {
    /// Open on a concrete transport resource from discovery.
    Device { tl_name: String, dev_name: String },
    /// Connect to a remote socket address.
    SockaddrClient { addr: SocketAddr },
    /// Listen on a local socket address.
    SockaddrServer { addr: SocketAddr },
}

/// Parameters for [`iface_open`].
#[derive(Debug, Clone)]
pub struct IfaceParams {
    pub mode: OpenMode,
}

impl IfaceParams {
    /// The transport this open targets, when named explicitly.
    fn selector(&self) -> TlSelector<'_> {
        match &self.mode {
            OpenMode::Device { tl_name, .. } => TlSelector::Name(tl_name),
            OpenMode::SockaddrClient { .. } | OpenMode::SockaddrServer { .. } => {
                TlSelector::Sockaddr
            }
        }
    }
}

/// Open a communication interface on a memory domain.
///
/// Device opens select the transport by name; sockaddr opens take the
/// first sockaddr-capable transport registered under the MD's component.
/// A transport that cannot be found reports `NO_DEVICE`.
pub fn iface_open(
    md: &MemoryDomain,
    params: &IfaceParams,
    config: &ConfigBundle,
) -> Result<Box<dyn Iface>> {
    // Interface opening requires a queryable MD.
    md.query()?;

    let tl = match md.component().find_tl(params.selector()) {
        Some(tl) => tl,
        None => {
            return match &params.mode {
                OpenMode::Device { tl_name, .. } => {
                    tracing::error!(tl = %tl_name, "transport does not exist");
                    make_error_msg(
                        StatusCode::NO_DEVICE,
                        format!("transport '{}' does not exist", tl_name),
                    )
                }
                _ => {
                    tracing::error!("no sockaddr transport registered on the md");
                    make_error_msg(
                        StatusCode::NO_DEVICE,
                        "no sockaddr transport registered on the md",
                    )
                }
            };
        }
    };

    tl.open_iface(md, params, config)
}
