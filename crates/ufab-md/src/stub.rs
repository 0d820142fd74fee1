//! Loopback component backed by process heap memory.
//!
//! Useful as a reference driver and for exercising the layer without
//! fabric hardware: allocation is `std::alloc`, registration is
//! bookkeeping only, and packed rkeys are the region's base address.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::net::SocketAddr;
use std::sync::Arc;

use ufab_types::{make_error_msg, Result, RkeyCode, StatusCode};

use crate::component::{Component, ComponentRegistry, TlCaps, TlComponent};
use crate::config::{ConfigBundle, ConfigField, ConfigType};
use crate::iface::{Iface, IfaceParams};
use crate::md::{MdAttr, MdDriver, MdResourceDesc, MemoryDomain, MemoryType, MdFlags};
use crate::mem::{Allocation, MemAdvice, MemFlags, MemHandle, SockaddrAccessibility};
use crate::resource::{single_md_resource, DeviceType, TlResourceDesc};
use crate::rkey::RkeyHandle;

pub const STUB_COMPONENT_NAME: &str = "stub";
const STUB_RKEY_SIZE: usize = std::mem::size_of::<u64>();

static STUB_MD_SCHEMA: &[ConfigField] = &[
    ConfigField {
        name: "ALIGN",
        default: "8",
        doc: "Allocation alignment in bytes; must be a power of two",
        ty: ConfigType::Uint,
    },
    ConfigField {
        name: "PREFAULT",
        default: "n",
        doc: "Touch allocated pages at allocation time",
        ty: ConfigType::Bool,
    },
    ConfigField {
        name: "OPEN_TIMEOUT",
        default: "100ms",
        doc: "Budget for opening the memory domain",
        ty: ConfigType::Duration,
    },
];

static STUB_IFACE_SCHEMA: &[ConfigField] = &[
    ConfigField {
        name: "SEG_SIZE",
        default: "8192",
        doc: "Copy segment size in bytes",
        ty: ConfigType::Uint,
    },
    ConfigField {
        name: "BACKLOG",
        default: "64",
        doc: "Listen backlog for sockaddr servers",
        ty: ConfigType::Uint,
    },
];

enum StubRegion {
    /// Owned by the MD; freed back to the allocator.
    Allocated { addr: usize, layout: Layout },
    /// Caller-owned memory, registration is bookkeeping only.
    Registered { addr: usize },
}

impl StubRegion {
    fn addr(&self) -> usize {
        match self {
            StubRegion::Allocated { addr, .. } => *addr,
            StubRegion::Registered { addr } => *addr,
        }
    }
}

struct StubMd {
    align: usize,
    prefault: bool,
    /// Allocations not yet freed; released on drop.
    live: Vec<(usize, Layout)>,
}

impl StubMd {
    fn take_region(&mut self, memh: MemHandle) -> Result<StubRegion> {
        match memh.downcast::<StubRegion>() {
            Ok(region) => Ok(*region),
            Err(_) => make_error_msg(
                StatusCode::INVALID_PARAM,
                "memory handle does not belong to the stub md",
            ),
        }
    }
}

impl Drop for StubMd {
    fn drop(&mut self) {
        for (addr, layout) in self.live.drain(..) {
            unsafe { dealloc(addr as *mut u8, layout) };
        }
    }
}

impl MdDriver for StubMd {
    fn component_name(&self) -> &str {
        STUB_COMPONENT_NAME
    }

    fn query(&self) -> Result<MdAttr> {
        Ok(MdAttr {
            flags: MdFlags::ALLOC
                | MdFlags::REG
                | MdFlags::ADVISE
                | MdFlags::RKEY_PTR
                | MdFlags::SOCKADDR,
            max_alloc: usize::MAX,
            max_reg: usize::MAX,
            rkey_packed_size: STUB_RKEY_SIZE,
            mem_type: MemoryType::Host,
            component_name: [0; crate::md::COMPONENT_NAME_MAX],
        })
    }

    fn mem_alloc(&mut self, length: usize, _flags: MemFlags, name: &str) -> Result<Allocation> {
        let layout = match Layout::from_size_align(length, self.align) {
            Ok(layout) => layout,
            Err(_) => {
                return make_error_msg(
                    StatusCode::INVALID_PARAM,
                    format!("cannot lay out {} bytes aligned to {}", length, self.align),
                )
            }
        };

        let address = unsafe { alloc_zeroed(layout) };
        if address.is_null() {
            return make_error_msg(
                StatusCode::NO_MEMORY,
                format!("failed to allocate {} bytes for '{}'", length, name),
            );
        }
        if self.prefault {
            let page = 4096;
            let mut offset = 0;
            while offset < length {
                unsafe { address.add(offset).write_volatile(0) };
                offset += page;
            }
        }

        self.live.push((address as usize, layout));
        Ok(Allocation {
            memh: MemHandle::new(StubRegion::Allocated {
                addr: address as usize,
                layout,
            }),
            address,
            length,
        })
    }

    fn mem_free(&mut self, memh: MemHandle) -> Result<()> {
        match self.take_region(memh)? {
            StubRegion::Allocated { addr, layout } => {
                self.live.retain(|(a, _)| *a != addr);
                unsafe { dealloc(addr as *mut u8, layout) };
                Ok(())
            }
            StubRegion::Registered { .. } => make_error_msg(
                StatusCode::INVALID_PARAM,
                "registered memory must be released with mem_dereg",
            ),
        }
    }

    fn mem_reg(&mut self, address: *mut u8, _length: usize, _flags: MemFlags) -> Result<MemHandle> {
        Ok(MemHandle::new(StubRegion::Registered {
            addr: address as usize,
        }))
    }

    fn mem_dereg(&mut self, memh: MemHandle) -> Result<()> {
        match self.take_region(memh)? {
            StubRegion::Registered { .. } => Ok(()),
            StubRegion::Allocated { .. } => make_error_msg(
                StatusCode::INVALID_PARAM,
                "allocated memory must be released with mem_free",
            ),
        }
    }

    fn mem_advise(
        &mut self,
        _memh: &MemHandle,
        _address: *mut u8,
        _length: usize,
        _advice: MemAdvice,
    ) -> Result<()> {
        Ok(())
    }

    fn mkey_pack(&self, memh: &MemHandle, buffer: &mut [u8]) -> Result<()> {
        let region = match memh.downcast_ref::<StubRegion>() {
            Some(region) => region,
            None => {
                return make_error_msg(
                    StatusCode::INVALID_PARAM,
                    "memory handle does not belong to the stub md",
                )
            }
        };
        if buffer.len() < STUB_RKEY_SIZE {
            return make_error_msg(
                RkeyCode::BUFFER_TOO_SHORT,
                format!("stub rkey needs {} bytes", STUB_RKEY_SIZE),
            );
        }
        buffer[..STUB_RKEY_SIZE].copy_from_slice(&(region.addr() as u64).to_le_bytes());
        Ok(())
    }

    fn detect_memory_type(&self, _address: *const u8, _length: usize) -> Result<MemoryType> {
        Ok(MemoryType::Host)
    }

    fn is_sockaddr_accessible(&self, sockaddr: &SocketAddr, _mode: SockaddrAccessibility) -> bool {
        sockaddr.ip().is_loopback()
    }
}

/// The loopback component.
pub struct StubComponent;

impl Component for StubComponent {
    fn name(&self) -> &str {
        STUB_COMPONENT_NAME
    }

    fn config_prefix(&self) -> &str {
        "STUB_"
    }

    fn md_config_schema(&self) -> &'static [ConfigField] {
        STUB_MD_SCHEMA
    }

    fn query_md_resources(&self) -> Result<Vec<MdResourceDesc>> {
        Ok(single_md_resource(STUB_COMPONENT_NAME))
    }

    fn open_md(&self, _md_name: &str, config: &ConfigBundle) -> Result<Box<dyn MdDriver>> {
        let align = config.get_uint("ALIGN")? as usize;
        if !align.is_power_of_two() {
            return make_error_msg(
                StatusCode::INVALID_PARAM,
                format!("ALIGN must be a power of two, got {}", align),
            );
        }
        Ok(Box::new(StubMd {
            align,
            prefault: config.get_bool("PREFAULT")?,
            live: Vec::new(),
        }))
    }

    fn rkey_unpack(&self, buffer: &[u8]) -> Result<(u64, Option<RkeyHandle>)> {
        if buffer.len() < STUB_RKEY_SIZE {
            return make_error_msg(
                RkeyCode::UNPACK_FAILED,
                format!("stub rkey needs {} bytes, got {}", STUB_RKEY_SIZE, buffer.len()),
            );
        }
        let mut bytes = [0u8; STUB_RKEY_SIZE];
        bytes.copy_from_slice(&buffer[..STUB_RKEY_SIZE]);
        Ok((u64::from_le_bytes(bytes), None))
    }

    fn rkey_ptr(
        &self,
        _rkey: u64,
        _handle: Option<&RkeyHandle>,
        remote_addr: u64,
    ) -> Result<*mut u8> {
        // Loopback: remote addresses are local addresses.
        Ok(remote_addr as *mut u8)
    }

    fn rkey_release(&self, _rkey: u64, _handle: Option<RkeyHandle>) -> Result<()> {
        Ok(())
    }
}

struct StubIface;

impl Iface for StubIface {}

/// The loopback transport registered under [`StubComponent`].
pub struct StubTl;

impl TlComponent for StubTl {
    fn name(&self) -> &str {
        "stub"
    }

    fn caps(&self) -> TlCaps {
        TlCaps::CONNECT_TO_IFACE | TlCaps::CONNECT_TO_SOCKADDR
    }

    fn config_prefix(&self) -> &str {
        "STUB_TL_"
    }

    fn iface_config_schema(&self) -> &'static [ConfigField] {
        STUB_IFACE_SCHEMA
    }

    fn query_resources(&self, _md: &MemoryDomain) -> Result<Vec<TlResourceDesc>> {
        Ok(vec![TlResourceDesc {
            tl_name: "stub".to_string(),
            dev_name: "stub0".to_string(),
            dev_type: DeviceType::Loopback,
        }])
    }

    fn open_iface(
        &self,
        _md: &MemoryDomain,
        _params: &IfaceParams,
        _config: &ConfigBundle,
    ) -> Result<Box<dyn Iface>> {
        Ok(Box::new(StubIface))
    }
}

/// Register the stub component and its transport.
pub fn register_stub(registry: &ComponentRegistry) -> Result<()> {
    let registered = registry.register(Arc::new(StubComponent))?;
    registered.register_tl(Arc::new(StubTl))?;
    Ok(())
}
