//! Mock component, driver and transport shared by the unit tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ufab_types::{make_error, make_error_msg, Result, RkeyCode, StatusCode, TlCode};

use crate::component::{Component, TlCaps, TlComponent};
use crate::config::{config_read, ConfigBundle, ConfigField, ConfigType};
use crate::iface::{Iface, IfaceParams};
use crate::md::{MdAttr, MdDriver, MdFlags, MdResourceDesc, MemoryDomain, MemoryType, COMPONENT_NAME_MAX};
use crate::mem::{Allocation, MemAdvice, MemFlags, MemHandle, SockaddrAccessibility};
use crate::resource::{single_md_resource, DeviceType, TlResourceDesc};
use crate::rkey::RkeyHandle;

static TEST_MD_SCHEMA: &[ConfigField] = &[
    ConfigField {
        name: "ALIGN",
        default: "8",
        doc: "Allocation alignment in bytes",
        ty: ConfigType::Uint,
    },
    ConfigField {
        name: "ERROR_URGE",
        default: "n",
        doc: "Escalate soft failures",
        ty: ConfigType::Bool,
    },
];

static TEST_IFACE_SCHEMA: &[ConfigField] = &[ConfigField {
    name: "SEG_SIZE",
    default: "8192",
    doc: "Copy segment size in bytes",
    ty: ConfigType::Uint,
}];

/// Driver token used by [`TestComponent`]'s driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestMemh {
    pub addr: usize,
    pub length: usize,
}

/// A default MD configuration matching [`TestComponent`]'s schema.
pub fn md_config() -> ConfigBundle {
    config_read(TEST_MD_SCHEMA, "UFAB_", "MOCK_").unwrap()
}

/// Mock component with injectable failure modes.
pub struct TestComponent {
    name: String,
    prefix: String,
    fail_open: bool,
    fail_query: bool,
    reg_counter: Option<Arc<AtomicUsize>>,
}

impl TestComponent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: format!("{}_", name.to_uppercase()),
            fail_open: false,
            fail_query: false,
            reg_counter: None,
        }
    }

    /// Make `open_md` fail.
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make the opened driver's `query` fail.
    pub fn fail_query(mut self) -> Self {
        self.fail_query = true;
        self
    }

    /// Count every `mem_reg` call that reaches the driver.
    pub fn with_reg_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.reg_counter = Some(counter);
        self
    }
}

impl Component for TestComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn config_prefix(&self) -> &str {
        &self.prefix
    }

    fn md_config_schema(&self) -> &'static [ConfigField] {
        TEST_MD_SCHEMA
    }

    fn query_md_resources(&self) -> Result<Vec<MdResourceDesc>> {
        Ok(single_md_resource(&self.name))
    }

    fn open_md(&self, _md_name: &str, _config: &ConfigBundle) -> Result<Box<dyn MdDriver>> {
        if self.fail_open {
            return make_error(ufab_types::MdCode::OPEN_FAILED);
        }
        Ok(Box::new(TestMd {
            component_name: self.name.clone(),
            fail_query: self.fail_query,
            reg_counter: self.reg_counter.clone(),
            allocs: Vec::new(),
        }))
    }

    fn rkey_unpack(&self, buffer: &[u8]) -> Result<(u64, Option<RkeyHandle>)> {
        if buffer.len() < 8 {
            return make_error(RkeyCode::UNPACK_FAILED);
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buffer[..8]);
        Ok((u64::from_le_bytes(bytes), None))
    }

    fn rkey_ptr(
        &self,
        _rkey: u64,
        _handle: Option<&RkeyHandle>,
        remote_addr: u64,
    ) -> Result<*mut u8> {
        Ok(remote_addr as *mut u8)
    }

    fn rkey_release(&self, _rkey: u64, _handle: Option<RkeyHandle>) -> Result<()> {
        Ok(())
    }
}

struct TestMd {
    component_name: String,
    fail_query: bool,
    reg_counter: Option<Arc<AtomicUsize>>,
    allocs: Vec<(usize, Vec<u8>)>,
}

impl MdDriver for TestMd {
    fn component_name(&self) -> &str {
        &self.component_name
    }

    fn query(&self) -> Result<MdAttr> {
        if self.fail_query {
            return make_error(StatusCode::IO_ERROR);
        }
        Ok(MdAttr {
            flags: MdFlags::ALLOC | MdFlags::REG | MdFlags::ADVISE,
            max_alloc: 1 << 30,
            max_reg: 1 << 30,
            rkey_packed_size: 8,
            mem_type: MemoryType::Host,
            component_name: [0; COMPONENT_NAME_MAX],
        })
    }

    fn mem_alloc(&mut self, length: usize, _flags: MemFlags, _name: &str) -> Result<Allocation> {
        let mut backing = vec![0u8; length.max(1)];
        let address = backing.as_mut_ptr();
        self.allocs.push((address as usize, backing));
        Ok(Allocation {
            memh: MemHandle::new(TestMemh {
                addr: address as usize,
                length,
            }),
            address,
            length,
        })
    }

    fn mem_free(&mut self, memh: MemHandle) -> Result<()> {
        let token = take_token(memh)?;
        self.allocs.retain(|(addr, _)| *addr != token.addr);
        Ok(())
    }

    fn mem_reg(&mut self, address: *mut u8, length: usize, _flags: MemFlags) -> Result<MemHandle> {
        if let Some(counter) = &self.reg_counter {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(MemHandle::new(TestMemh {
            addr: address as usize,
            length,
        }))
    }

    fn mem_dereg(&mut self, memh: MemHandle) -> Result<()> {
        take_token(memh).map(|_| ())
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
        let token = match memh.downcast_ref::<TestMemh>() {
            Some(token) => token,
            None => return make_error(StatusCode::INVALID_PARAM),
        };
        if buffer.len() < 8 {
            return make_error(RkeyCode::BUFFER_TOO_SHORT);
        }
        buffer[..8].copy_from_slice(&(token.addr as u64).to_le_bytes());
        Ok(())
    }

    fn detect_memory_type(&self, _address: *const u8, _length: usize) -> Result<MemoryType> {
        Ok(MemoryType::Host)
    }

    fn is_sockaddr_accessible(&self, sockaddr: &SocketAddr, _mode: SockaddrAccessibility) -> bool {
        sockaddr.ip().is_loopback()
    }
}

fn take_token(memh: MemHandle) -> Result<TestMemh> {
    match memh.downcast::<TestMemh>() {
        Ok(token) => Ok(*token),
        Err(_) => make_error_msg(
            StatusCode::INVALID_PARAM,
            "memory handle does not belong to the mock driver",
        ),
    }
}

/// Mock transport with configurable devices and an injectable query
/// failure.
pub struct TestTl {
    name: String,
    prefix: String,
    caps: TlCaps,
    devices: Vec<String>,
    fail_query: bool,
}

impl TestTl {
    pub fn new(name: &str, caps: TlCaps) -> Self {
        Self {
            name: name.to_string(),
            prefix: format!("{}_", name.to_uppercase()),
            caps,
            devices: Vec::new(),
            fail_query: false,
        }
    }

    /// Report one resource per listed device name.
    pub fn with_devices(mut self, devices: &[&str]) -> Self {
        self.devices = devices.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Make `query_resources` fail.
    pub fn fail_query(mut self) -> Self {
        self.fail_query = true;
        self
    }
}

impl TlComponent for TestTl {
    fn name(&self) -> &str {
        &self.name
    }

    fn caps(&self) -> TlCaps {
        self.caps
    }

    fn config_prefix(&self) -> &str {
        &self.prefix
    }

    fn iface_config_schema(&self) -> &'static [ConfigField] {
        TEST_IFACE_SCHEMA
    }

    fn query_resources(&self, _md: &MemoryDomain) -> Result<Vec<TlResourceDesc>> {
        if self.fail_query {
            return make_error(TlCode::QUERY_FAILED);
        }
        Ok(self
            .devices
            .iter()
            .map(|dev| TlResourceDesc {
                tl_name: self.name.clone(),
                dev_name: dev.clone(),
                dev_type: DeviceType::Net,
            })
            .collect())
    }

    fn open_iface(
        &self,
        _md: &MemoryDomain,
        _params: &IfaceParams,
        _config: &ConfigBundle,
    ) -> Result<Box<dyn Iface>> {
        Ok(Box::new(TestIface))
    }
}

struct TestIface;

impl Iface for TestIface {}
