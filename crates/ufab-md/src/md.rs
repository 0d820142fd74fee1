use std::net::SocketAddr;
use std::sync::Arc;

use bitflags::bitflags;
use serde::Serialize;
use ufab_types::Result;

use crate::component::RegisteredComponent;
use crate::config::ConfigBundle;
use crate::mem::{Allocation, HugePageStatus, MemAdvice, MemFlags, MemHandle, SockaddrAccessibility};
use crate::rkey::RkeyIntegrity;

/// Maximum component name length, in bytes.
pub const COMPONENT_NAME_MAX: usize = 8;
/// Maximum memory-domain name length, in bytes.
pub const MD_NAME_MAX: usize = 16;
/// Maximum transport name length, in bytes.
pub const TL_NAME_MAX: usize = 10;
/// Maximum device name length, in bytes.
pub const DEVICE_NAME_MAX: usize = 32;

bitflags! {
    /// Memory-domain capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MdFlags: u32 {
        /// The MD supports memory allocation (`mem_alloc`).
        const ALLOC = 1 << 0;
        /// The MD supports memory registration (`mem_reg`).
        const REG = 1 << 1;
        /// The MD requires a local memory handle for zero-copy operations.
        const NEED_MEMH = 1 << 2;
        /// The MD requires a remote key for remote memory access.
        const NEED_RKEY = 1 << 3;
        /// The MD supports `mem_advise`.
        const ADVISE = 1 << 4;
        /// The MD supports allocation at a fixed address.
        const FIXED = 1 << 5;
        /// The MD supports dereferencing remote keys (`rkey_ptr`).
        const RKEY_PTR = 1 << 6;
        /// The MD supports socket-address connectivity.
        const SOCKADDR = 1 << 7;
    }
}

/// Kind of memory a region lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Host,
    Cuda,
    CudaManaged,
    Rocm,
}

/// Memory-domain attributes reported by [`MemoryDomain::query`].
#[derive(Debug, Clone)]
pub struct MdAttr {
    /// Capability flags.
    pub flags: MdFlags,
    /// Maximal allocation size, bytes.
    pub max_alloc: usize,
    /// Maximal registration size, bytes.
    pub max_reg: usize,
    /// Size of a packed remote key, bytes. Includes the component-name
    /// prefix when rkey integrity checking is enabled.
    pub rkey_packed_size: usize,
    /// Memory type the MD operates on.
    pub mem_type: MemoryType,
    /// Owning component name, fixed-width and zero-padded. Filled in by
    /// the layer, not the driver.
    pub component_name: [u8; COMPONENT_NAME_MAX],
}

impl MdAttr {
    /// The component name with trailing zero padding removed.
    pub fn component_name_str(&self) -> &str {
        let end = self
            .component_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(COMPONENT_NAME_MAX);
        std::str::from_utf8(&self.component_name[..end]).unwrap_or("")
    }
}

/// Zero-padded fixed-width rendering of a component name. Over-long names
/// are rejected at registration, so truncation cannot occur here.
pub(crate) fn fixed_component_name(name: &str) -> [u8; COMPONENT_NAME_MAX] {
    let mut fixed = [0u8; COMPONENT_NAME_MAX];
    let len = name.len().min(COMPONENT_NAME_MAX);
    fixed[..len].copy_from_slice(&name.as_bytes()[..len]);
    fixed
}

/// Driver-side operation table of an opened memory domain.
///
/// Supplied by the component at open time; every operation except
/// `is_hugetlb` is mandatory. Operations may block for as long as the
/// underlying syscalls (memory pinning, hardware registration) take.
pub trait MdDriver: Send {
    /// Name of the component this driver belongs to.
    fn component_name(&self) -> &str;

    /// Query the MD's attributes. The layer overrides `component_name`
    /// and adjusts `rkey_packed_size` afterwards.
    fn query(&self) -> Result<MdAttr>;

    /// Allocate memory accessible by the fabric. The driver may round the
    /// length up.
    fn mem_alloc(&mut self, length: usize, flags: MemFlags, name: &str) -> Result<Allocation>;

    /// Free memory returned by `mem_alloc`.
    fn mem_free(&mut self, memh: MemHandle) -> Result<()>;

    /// Register existing memory for fabric access.
    fn mem_reg(&mut self, address: *mut u8, length: usize, flags: MemFlags) -> Result<MemHandle>;

    /// Deregister memory registered with `mem_reg`.
    fn mem_dereg(&mut self, memh: MemHandle) -> Result<()>;

    /// Advise on the expected usage of part of a registered region.
    fn mem_advise(
        &mut self,
        memh: &MemHandle,
        address: *mut u8,
        length: usize,
        advice: MemAdvice,
    ) -> Result<()>;

    /// Serialize the access token for `memh` into `buffer`.
    fn mkey_pack(&self, memh: &MemHandle, buffer: &mut [u8]) -> Result<()>;

    /// Detect the memory type of an address range.
    fn detect_memory_type(&self, address: *const u8, length: usize) -> Result<MemoryType>;

    /// Whether the given socket address is reachable through this MD.
    fn is_sockaddr_accessible(&self, sockaddr: &SocketAddr, mode: SockaddrAccessibility) -> bool;

    /// Whether `memh` is backed by huge pages. Optional capability; the
    /// default reports that the driver cannot tell.
    fn is_hugetlb(&self, _memh: &MemHandle) -> HugePageStatus {
        HugePageStatus::Unsupported
    }
}

/// An opened memory domain.
///
/// Exclusively owned by the caller that opened it; all operations are
/// synchronous and the layer performs no internal locking. Closing (or
/// dropping) the MD releases every driver-side resource it still owns,
/// including memory handles the caller failed to free — relying on that is
/// a leak risk on fabrics that pin memory, not an error.
pub struct MemoryDomain {
    registered: Arc<RegisteredComponent>,
    driver: Box<dyn MdDriver>,
    rkey_integrity: RkeyIntegrity,
}

impl std::fmt::Debug for MemoryDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDomain")
            .field("registered", &self.registered)
            .field("rkey_integrity", &self.rkey_integrity)
            .finish_non_exhaustive()
    }
}

impl MemoryDomain {
    /// Open a memory domain on `registered`'s component.
    ///
    /// Both peers of a future rkey exchange must agree on `integrity`
    /// out of band; the packed formats are not interoperable.
    pub fn open(
        registered: &Arc<RegisteredComponent>,
        md_name: &str,
        config: &ConfigBundle,
        integrity: RkeyIntegrity,
    ) -> Result<Self> {
        let driver = registered.component().open_md(md_name, config)?;
        debug_assert_eq!(
            driver.component_name(),
            registered.name(),
            "driver reports a different owning component"
        );
        Ok(Self {
            registered: Arc::clone(registered),
            driver,
            rkey_integrity: integrity,
        })
    }

    /// Close the memory domain, releasing all driver resources.
    pub fn close(self) {}

    /// The component this MD was opened on.
    pub fn component(&self) -> &Arc<RegisteredComponent> {
        &self.registered
    }

    /// The owning component's name.
    pub fn component_name(&self) -> &str {
        self.registered.name()
    }

    /// The rkey integrity mode this MD packs keys with.
    pub fn rkey_integrity(&self) -> RkeyIntegrity {
        self.rkey_integrity
    }

    pub(crate) fn driver(&self) -> &dyn MdDriver {
        self.driver.as_ref()
    }

    pub(crate) fn driver_mut(&mut self) -> &mut dyn MdDriver {
        self.driver.as_mut()
    }

    /// Query the MD's attributes.
    ///
    /// Layers identity on top of the driver's answer: the owning
    /// component's name is copied into the fixed-width `component_name`
    /// field so later rkey operations can self-validate, and the packed
    /// rkey size grows by the name prefix when integrity checking is on.
    pub fn query(&self) -> Result<MdAttr> {
        let mut attr = self.driver.query()?;
        attr.component_name = fixed_component_name(self.registered.name());
        if self.rkey_integrity == RkeyIntegrity::NamePrefix {
            attr.rkey_packed_size += COMPONENT_NAME_MAX;
        }
        Ok(attr)
    }
}

/// Descriptor of one memory domain a component can open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MdResourceDesc {
    /// MD name, at most [`MD_NAME_MAX`] bytes; passed to
    /// [`MemoryDomain::open`].
    pub md_name: String,
}
