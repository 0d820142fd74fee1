use std::any::Any;
use std::fmt;

use ufab_types::{make_error_msg, Result, RkeyCode, StatusCode};

use crate::component::Component;
use crate::md::{fixed_component_name, MemoryDomain, COMPONENT_NAME_MAX};
use crate::mem::MemHandle;

/// Rkey value reported for memory that needs no real remote key. Peers
/// treat it as opaque like any other rkey.
pub const STUB_RKEY: u64 = 0xdead_beef;

/// Whether packed remote keys carry an owning-component prefix.
///
/// Chosen per memory domain at open time. Both sides of an rkey exchange
/// must use the same mode; the packed formats are not interoperable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RkeyIntegrity {
    /// Pack only the driver's token bytes.
    #[default]
    Disabled,
    /// Prepend the fixed-width component name and verify it on unpack,
    /// catching keys routed to the wrong component.
    NamePrefix,
}

/// Opaque driver-defined state backing an unpacked remote key.
pub struct RkeyHandle(Box<dyn Any + Send>);

impl RkeyHandle {
    pub fn new<T: Any + Send>(inner: T) -> Self {
        Self(Box::new(inner))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn downcast<T: Any>(self) -> std::result::Result<Box<T>, RkeyHandle> {
        self.0.downcast::<T>().map_err(RkeyHandle)
    }
}

impl fmt::Debug for RkeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RkeyHandle(..)")
    }
}

/// An unpacked remote key together with the component that produced it.
///
/// Single-owner; release consumes the bundle, so a key cannot be used
/// after release or released twice.
pub struct RkeyBundle {
    rkey: u64,
    handle: Option<RkeyHandle>,
    component_name: String,
}

impl RkeyBundle {
    /// The remote key value to put on the wire.
    pub fn rkey(&self) -> u64 {
        self.rkey
    }

    /// Driver-side state, if the component keeps any.
    pub fn handle(&self) -> Option<&RkeyHandle> {
        self.handle.as_ref()
    }

    /// Name of the component that unpacked this key.
    pub fn component_name(&self) -> &str {
        &self.component_name
    }
}

impl fmt::Debug for RkeyBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RkeyBundle")
            .field("rkey", &self.rkey)
            .field("component_name", &self.component_name)
            .finish_non_exhaustive()
    }
}

impl MemoryDomain {
    /// Pack the access token for `memh` into `buffer` for transmission to
    /// a peer.
    ///
    /// The buffer must be at least `rkey_packed_size` bytes as reported by
    /// [`MemoryDomain::query`]. With [`RkeyIntegrity::NamePrefix`] the
    /// owning component's fixed-width name is written first and the
    /// driver's token follows it.
    pub fn mkey_pack(&self, memh: &MemHandle, buffer: &mut [u8]) -> Result<()> {
        match self.rkey_integrity() {
            RkeyIntegrity::Disabled => self.driver().mkey_pack(memh, buffer),
            RkeyIntegrity::NamePrefix => {
                if buffer.len() < COMPONENT_NAME_MAX {
                    return make_error_msg(
                        RkeyCode::BUFFER_TOO_SHORT,
                        format!(
                            "rkey buffer of {} bytes cannot hold the {}-byte name prefix",
                            buffer.len(),
                            COMPONENT_NAME_MAX
                        ),
                    );
                }
                let (prefix, rest) = buffer.split_at_mut(COMPONENT_NAME_MAX);
                prefix.copy_from_slice(&fixed_component_name(self.component_name()));
                self.driver().mkey_pack(memh, rest)
            }
        }
    }
}

/// Unpack a remote key received from a peer.
///
/// `integrity` must match the mode the peer packed with. Under
/// [`RkeyIntegrity::NamePrefix`] the embedded component name is checked
/// against `component` before the driver sees any bytes; a mismatch means
/// the key was routed to the wrong component and is rejected.
pub fn rkey_unpack(
    component: &dyn Component,
    buffer: &[u8],
    integrity: RkeyIntegrity,
) -> Result<RkeyBundle> {
    let token = match integrity {
        RkeyIntegrity::Disabled => buffer,
        RkeyIntegrity::NamePrefix => {
            if buffer.len() < COMPONENT_NAME_MAX {
                return make_error_msg(
                    RkeyCode::BUFFER_TOO_SHORT,
                    format!(
                        "rkey buffer of {} bytes is shorter than the {}-byte name prefix",
                        buffer.len(),
                        COMPONENT_NAME_MAX
                    ),
                );
            }
            let (prefix, rest) = buffer.split_at(COMPONENT_NAME_MAX);
            if prefix != fixed_component_name(component.name()) {
                let packed = name_from_prefix(prefix);
                tracing::error!(
                    packed_by = packed,
                    unpacked_by = component.name(),
                    "remote key does not belong to this component"
                );
                return make_error_msg(
                    RkeyCode::COMPONENT_MISMATCH,
                    format!(
                        "remote key was packed by component '{}', not '{}'",
                        packed,
                        component.name()
                    ),
                );
            }
            rest
        }
    };

    let (rkey, handle) = component.rkey_unpack(token)?;
    Ok(RkeyBundle {
        rkey,
        handle,
        component_name: component.name().to_string(),
    })
}

/// Translate a remote address under an unpacked key into a local pointer.
///
/// Only valid on components whose MDs advertise
/// [`crate::md::MdFlags::RKEY_PTR`].
pub fn rkey_ptr(
    component: &dyn Component,
    bundle: &RkeyBundle,
    remote_addr: u64,
) -> Result<*mut u8> {
    check_bundle_owner(component, bundle.component_name())?;
    component.rkey_ptr(bundle.rkey, bundle.handle.as_ref(), remote_addr)
}

/// Release an unpacked remote key, consuming the bundle.
pub fn rkey_release(component: &dyn Component, bundle: RkeyBundle) -> Result<()> {
    check_bundle_owner(component, bundle.component_name())?;
    component.rkey_release(bundle.rkey, bundle.handle)
}

fn check_bundle_owner(component: &dyn Component, owner: &str) -> Result<()> {
    if owner != component.name() {
        return make_error_msg(
            StatusCode::INVALID_PARAM,
            format!(
                "remote key belongs to component '{}', not '{}'",
                owner,
                component.name()
            ),
        );
    }
    Ok(())
}

/// Unpack for memory that was packed without a real remote key.
pub fn stub_rkey_unpack() -> (u64, Option<RkeyHandle>) {
    (STUB_RKEY, None)
}

fn name_from_prefix(prefix: &[u8]) -> String {
    let end = prefix.iter().position(|&b| b == 0).unwrap_or(prefix.len());
    String::from_utf8_lossy(&prefix[..end]).into_owned()
}
