use std::any::Any;
use std::fmt;
use std::net::SocketAddr;

use bitflags::bitflags;
use ufab_types::{make_error_msg, Result, StatusCode};

use crate::md::{MemoryDomain, MemoryType};

bitflags! {
    /// Flags for memory allocation and registration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemFlags: u32 {
        /// Register the memory while allowing other operations to progress
        /// (hint; the driver may ignore it).
        const NONBLOCK = 1 << 0;
        /// Allocate at a fixed address.
        const FIXED = 1 << 1;
        /// Enable remote put access.
        const ACCESS_REMOTE_PUT = 1 << 5;
        /// Enable remote get access.
        const ACCESS_REMOTE_GET = 1 << 6;
        /// Enable remote atomic access.
        const ACCESS_REMOTE_ATOMIC = 1 << 7;

        /// Remote put and get access.
        const ACCESS_RMA = Self::ACCESS_REMOTE_PUT.bits() | Self::ACCESS_REMOTE_GET.bits();
        /// All remote access modes.
        const ACCESS_ALL = Self::ACCESS_REMOTE_PUT.bits()
            | Self::ACCESS_REMOTE_GET.bits()
            | Self::ACCESS_REMOTE_ATOMIC.bits();
    }
}

/// Usage advice passed to [`MemoryDomain::mem_advise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAdvice {
    /// No special treatment.
    Normal,
    /// The range will be accessed soon; prefault it.
    WillNeed,
}

/// Accessibility mode for [`MemoryDomain::is_sockaddr_accessible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockaddrAccessibility {
    /// The address is usable for listening locally.
    Local,
    /// The address is reachable as a remote peer.
    Remote,
}

/// Tri-state answer to the optional huge-page capability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HugePageStatus {
    /// The driver cannot tell. Distinct from "not huge".
    Unsupported,
    NotHuge,
    Huge,
}

impl HugePageStatus {
    /// Collapse to a boolean; `Unsupported` reads as `false`.
    pub fn as_bool(self) -> bool {
        self == HugePageStatus::Huge
    }
}

/// Opaque driver-defined token for a region of registered or allocated
/// memory.
///
/// Owned by the memory domain that created it until explicitly consumed by
/// `mem_free` or `mem_dereg`; move semantics give it exactly one release
/// path.
pub struct MemHandle(Box<dyn Any + Send>);

impl MemHandle {
    pub fn new<T: Any + Send>(inner: T) -> Self {
        Self(Box::new(inner))
    }

    /// Borrow the driver's token.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Take the driver's token back, consuming the handle.
    pub fn downcast<T: Any>(self) -> std::result::Result<Box<T>, MemHandle> {
        self.0.downcast::<T>().map_err(MemHandle)
    }
}

impl fmt::Debug for MemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MemHandle(..)")
    }
}

/// Result of [`MemoryDomain::mem_alloc`].
#[derive(Debug)]
pub struct Allocation {
    /// Handle for the allocated region.
    pub memh: MemHandle,
    /// Start of the allocation.
    pub address: *mut u8,
    /// Actual length; the driver may have rounded the request up.
    pub length: usize,
}

fn check_access_flags(flags: MemFlags) -> Result<()> {
    if !flags.intersects(MemFlags::ACCESS_ALL) {
        return make_error_msg(
            StatusCode::INVALID_PARAM,
            "memory flags carry no recognized access mode",
        );
    }
    Ok(())
}

/// Memory operations: validating dispatch to the driver's operation table.
/// No retries, no timeouts; a blocked driver call blocks the caller.
impl MemoryDomain {
    /// Allocate fabric-accessible memory. `name` labels the allocation for
    /// diagnostics.
    pub fn mem_alloc(&mut self, length: usize, flags: MemFlags, name: &str) -> Result<Allocation> {
        if length == 0 {
            return make_error_msg(
                StatusCode::INVALID_PARAM,
                "allocation length must be non-zero",
            );
        }
        check_access_flags(flags)?;
        self.driver_mut().mem_alloc(length, flags, name)
    }

    /// Free memory obtained from [`MemoryDomain::mem_alloc`].
    pub fn mem_free(&mut self, memh: MemHandle) -> Result<()> {
        self.driver_mut().mem_free(memh)
    }

    /// Register existing memory for fabric access. May block on pinning.
    pub fn mem_reg(&mut self, address: *mut u8, length: usize, flags: MemFlags) -> Result<MemHandle> {
        if length == 0 || address.is_null() {
            return make_error_msg(
                StatusCode::INVALID_PARAM,
                "registration requires a non-null address and non-zero length",
            );
        }
        check_access_flags(flags)?;
        self.driver_mut().mem_reg(address, length, flags)
    }

    /// Deregister memory registered with [`MemoryDomain::mem_reg`].
    pub fn mem_dereg(&mut self, memh: MemHandle) -> Result<()> {
        self.driver_mut().mem_dereg(memh)
    }

    /// Advise on expected usage of part of a registered region.
    pub fn mem_advise(
        &mut self,
        memh: &MemHandle,
        address: *mut u8,
        length: usize,
        advice: MemAdvice,
    ) -> Result<()> {
        if length == 0 || address.is_null() {
            return make_error_msg(
                StatusCode::INVALID_PARAM,
                "advise requires a non-null address and non-zero length",
            );
        }
        self.driver_mut().mem_advise(memh, address, length, advice)
    }

    /// Detect the memory type of an address range.
    pub fn detect_memory_type(&self, address: *const u8, length: usize) -> Result<MemoryType> {
        self.driver().detect_memory_type(address, length)
    }

    /// Whether the given socket address is reachable through this MD.
    pub fn is_sockaddr_accessible(
        &self,
        sockaddr: &SocketAddr,
        mode: SockaddrAccessibility,
    ) -> bool {
        self.driver().is_sockaddr_accessible(sockaddr, mode)
    }

    /// Whether `memh` is backed by huge pages.
    ///
    /// Drivers without the capability report
    /// [`HugePageStatus::Unsupported`], never an error.
    pub fn is_hugetlb(&self, memh: &MemHandle) -> HugePageStatus {
        self.driver().is_hugetlb(memh)
    }
}
