//! Memory-domain layer of the fabric stack.
//!
//! A [`ComponentRegistry`] holds the fabric components available in the
//! process; each component can open [`MemoryDomain`]s, which expose memory
//! allocation, registration and remote-key operations, and carry the
//! transports used to discover communication resources and open
//! interfaces.

pub mod component;
pub mod config;
pub mod iface;
pub mod md;
pub mod mem;
pub mod resource;
pub mod rkey;
pub mod stub;

#[cfg(test)]
mod test_support;

pub use component::{Component, ComponentRegistry, RegisteredComponent, TlCaps, TlComponent, TlSelector};
pub use config::{
    config_read, iface_config_read, md_config_read, ConfigBundle, ConfigField, ConfigParseError,
    ConfigType, ConfigValue,
};
pub use iface::{iface_open, Iface, IfaceParams, OpenMode};
pub use md::{
    MdAttr, MdDriver, MdFlags, MdResourceDesc, MemoryDomain, MemoryType, COMPONENT_NAME_MAX,
    DEVICE_NAME_MAX, MD_NAME_MAX, TL_NAME_MAX,
};
pub use mem::{
    Allocation, HugePageStatus, MemAdvice, MemFlags, MemHandle, SockaddrAccessibility,
};
pub use resource::{
    empty_md_resources, single_md_resource, DeviceType, DiscoverySkip, TlResourceDesc,
    TlResourceList,
};
pub use rkey::{
    rkey_ptr, rkey_release, rkey_unpack, stub_rkey_unpack, RkeyBundle, RkeyHandle, RkeyIntegrity,
    STUB_RKEY,
};
pub use stub::{register_stub, StubComponent, StubTl, STUB_COMPONENT_NAME};
