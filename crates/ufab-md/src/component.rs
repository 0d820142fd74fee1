use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;
use ufab_types::{make_error_msg, Result, StatusCode};

use crate::config::{ConfigBundle, ConfigField};
use crate::iface::{Iface, IfaceParams};
use crate::md::{MdDriver, MdResourceDesc, MemoryDomain, COMPONENT_NAME_MAX, TL_NAME_MAX};
use crate::resource::TlResourceDesc;
use crate::rkey::RkeyHandle;

bitflags! {
    /// Capability flags advertised by a transport component.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TlCaps: u32 {
        /// The transport connects point-to-point interfaces directly.
        const CONNECT_TO_IFACE = 1 << 0;
        /// The transport connects individual endpoints.
        const CONNECT_TO_EP = 1 << 1;
        /// The transport can establish connections from a socket address.
        const CONNECT_TO_SOCKADDR = 1 << 2;
    }
}

/// Trait implemented by each memory-domain component (one per fabric
/// driver family).
///
/// A component provides memory-domain and remote-key operations; the
/// transports registered under it provide communication resources. All
/// operations are mandatory; optional capabilities live on [`MdDriver`].
pub trait Component: Send + Sync {
    /// Component name, at most [`COMPONENT_NAME_MAX`] bytes.
    fn name(&self) -> &str;

    /// Prefix for this component's MD configuration keys (e.g. `"IB_"`).
    fn config_prefix(&self) -> &str;

    /// Schema describing the component's MD configuration options.
    fn md_config_schema(&self) -> &'static [ConfigField];

    /// Describe the memory domains this component can open.
    fn query_md_resources(&self) -> Result<Vec<MdResourceDesc>>;

    /// Open a memory domain. Returns the driver-side operation table; the
    /// layer wraps it into a [`MemoryDomain`].
    fn open_md(&self, md_name: &str, config: &ConfigBundle) -> Result<Box<dyn MdDriver>>;

    /// Unpack a remote key from its driver-defined token bytes.
    ///
    /// The buffer passed here never contains the layer's component-name
    /// prefix; that is stripped by [`crate::rkey::rkey_unpack`].
    fn rkey_unpack(&self, buffer: &[u8]) -> Result<(u64, Option<RkeyHandle>)>;

    /// Translate a remote virtual address into a locally dereferenceable
    /// pointer, for fabrics that support direct mapping.
    fn rkey_ptr(&self, rkey: u64, handle: Option<&RkeyHandle>, remote_addr: u64)
        -> Result<*mut u8>;

    /// Release an unpacked remote key.
    fn rkey_release(&self, rkey: u64, handle: Option<RkeyHandle>) -> Result<()>;
}

/// Trait implemented by each transport (TL) component.
///
/// Transport components are registered under exactly one [`Component`] and
/// shared read-only across every memory domain opened on it.
pub trait TlComponent: Send + Sync {
    /// Transport name, at most [`TL_NAME_MAX`] bytes.
    fn name(&self) -> &str;

    /// Capability flags for transport selection.
    fn caps(&self) -> TlCaps;

    /// Prefix for this transport's interface configuration keys.
    fn config_prefix(&self) -> &str;

    /// Schema describing the transport's interface configuration options.
    fn iface_config_schema(&self) -> &'static [ConfigField];

    /// Describe the communication resources this transport exposes on the
    /// given memory domain. Every returned descriptor must carry this
    /// transport's own name.
    fn query_resources(&self, md: &MemoryDomain) -> Result<Vec<TlResourceDesc>>;

    /// Open a point-to-point interface on the given memory domain.
    fn open_iface(
        &self,
        md: &MemoryDomain,
        params: &IfaceParams,
        config: &ConfigBundle,
    ) -> Result<Box<dyn Iface>>;
}

/// Selects a transport among those registered under a component.
#[derive(Debug, Clone, Copy)]
pub enum TlSelector<'a> {
    /// Exact transport name match.
    Name(&'a str),
    /// First transport advertising [`TlCaps::CONNECT_TO_SOCKADDR`].
    Sockaddr,
}

/// A component together with the ordered list of transports registered
/// under it.
///
/// Transport registration is append-only and expected to happen during a
/// single-threaded initialization phase; lookups afterwards are safe under
/// concurrent readers.
pub struct RegisteredComponent {
    component: Arc<dyn Component>,
    transports: RwLock<Vec<Arc<dyn TlComponent>>>,
}

impl std::fmt::Debug for RegisteredComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredComponent")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

impl RegisteredComponent {
    fn new(component: Arc<dyn Component>) -> Self {
        Self {
            component,
            transports: RwLock::new(Vec::new()),
        }
    }

    /// The component's name.
    pub fn name(&self) -> &str {
        self.component.name()
    }

    /// The underlying component.
    pub fn component(&self) -> &Arc<dyn Component> {
        &self.component
    }

    /// Register a transport under this component, preserving order.
    pub fn register_tl(&self, tl: Arc<dyn TlComponent>) -> Result<()> {
        if tl.name().len() > TL_NAME_MAX {
            return make_error_msg(
                StatusCode::INVALID_PARAM,
                format!("transport name '{}' exceeds {} bytes", tl.name(), TL_NAME_MAX),
            );
        }
        self.transports.write().push(tl);
        Ok(())
    }

    /// Snapshot of the registered transports, in registration order.
    pub fn transports(&self) -> Vec<Arc<dyn TlComponent>> {
        self.transports.read().clone()
    }

    /// Find a transport in registration order.
    ///
    /// Returns `None` when the list is empty or nothing matches; this is a
    /// normal, reportable condition.
    pub fn find_tl(&self, selector: TlSelector<'_>) -> Option<Arc<dyn TlComponent>> {
        let transports = self.transports.read();
        transports
            .iter()
            .find(|tl| match selector {
                TlSelector::Name(name) => tl.name() == name,
                TlSelector::Sockaddr => tl.caps().contains(TlCaps::CONNECT_TO_SOCKADDR),
            })
            .cloned()
    }
}

/// Process-wide list of registered components.
///
/// Constructed once at startup and passed explicitly; registration is
/// append-only (no removal), and all read paths take a shared lock.
pub struct ComponentRegistry {
    components: RwLock<Vec<Arc<RegisteredComponent>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(Vec::new()),
        }
    }

    /// Register a component. Fails with `INVALID_PARAM` on an over-long
    /// name and `BUSY` on a duplicate.
    pub fn register(&self, component: Arc<dyn Component>) -> Result<Arc<RegisteredComponent>> {
        if component.name().len() > COMPONENT_NAME_MAX {
            return make_error_msg(
                StatusCode::INVALID_PARAM,
                format!(
                    "component name '{}' exceeds {} bytes",
                    component.name(),
                    COMPONENT_NAME_MAX
                ),
            );
        }

        let mut components = self.components.write();
        if components.iter().any(|c| c.name() == component.name()) {
            return make_error_msg(
                StatusCode::BUSY,
                format!("component '{}' is already registered", component.name()),
            );
        }

        let registered = Arc::new(RegisteredComponent::new(component));
        components.push(Arc::clone(&registered));
        Ok(registered)
    }

    /// Register a transport under a previously registered component.
    pub fn register_tl(&self, component_name: &str, tl: Arc<dyn TlComponent>) -> Result<()> {
        match self.lookup(component_name) {
            Some(registered) => registered.register_tl(tl),
            None => make_error_msg(
                StatusCode::NO_DEVICE,
                format!("component '{}' is not registered", component_name),
            ),
        }
    }

    /// Look up a component by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<RegisteredComponent>> {
        self.components
            .read()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Snapshot of all registered components, in registration order.
    pub fn components(&self) -> Vec<Arc<RegisteredComponent>> {
        self.components.read().clone()
    }

    /// Aggregate the MD resources of every registered component.
    ///
    /// A component that fails to describe its resources is logged and
    /// skipped; discovery continues for the rest.
    pub fn query_md_resources(&self) -> Vec<MdResourceDesc> {
        let mut resources = Vec::new();
        for registered in self.components.read().iter() {
            match registered.component().query_md_resources() {
                Ok(mut found) => resources.append(&mut found),
                Err(status) => {
                    tracing::debug!(
                        component = registered.name(),
                        %status,
                        "failed to query MD resources"
                    );
                }
            }
        }
        resources
    }

    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestComponent, TestTl};

    #[test]
    fn test_register_and_lookup() {
        let registry = ComponentRegistry::new();
        registry.register(Arc::new(TestComponent::new("ib"))).unwrap();
        registry.register(Arc::new(TestComponent::new("shm"))).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("ib").is_some());
        assert!(registry.lookup("shm").is_some());
        assert!(registry.lookup("tcp").is_none());
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let registry = ComponentRegistry::new();
        registry.register(Arc::new(TestComponent::new("ib"))).unwrap();

        let err = registry
            .register(Arc::new(TestComponent::new("ib")))
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::BUSY);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_name_too_long() {
        let registry = ComponentRegistry::new();
        let err = registry
            .register(Arc::new(TestComponent::new("much_too_long_name")))
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::INVALID_PARAM);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_tl_unknown_component() {
        let registry = ComponentRegistry::new();
        let err = registry
            .register_tl("ib", Arc::new(TestTl::new("rc", TlCaps::CONNECT_TO_EP)))
            .unwrap_err();
        assert_eq!(err.code(), StatusCode::NO_DEVICE);
    }

    #[test]
    fn test_find_tl_by_name() {
        let registry = ComponentRegistry::new();
        let ib = registry.register(Arc::new(TestComponent::new("ib"))).unwrap();
        ib.register_tl(Arc::new(TestTl::new("rc", TlCaps::CONNECT_TO_EP)))
            .unwrap();
        ib.register_tl(Arc::new(TestTl::new("dc", TlCaps::CONNECT_TO_IFACE)))
            .unwrap();

        let found = ib.find_tl(TlSelector::Name("dc")).unwrap();
        assert_eq!(found.name(), "dc");
        assert!(ib.find_tl(TlSelector::Name("ud")).is_none());
    }

    #[test]
    fn test_find_tl_sockaddr_capability() {
        let registry = ComponentRegistry::new();
        let ib = registry.register(Arc::new(TestComponent::new("ib"))).unwrap();
        ib.register_tl(Arc::new(TestTl::new("rc", TlCaps::CONNECT_TO_EP)))
            .unwrap();
        ib.register_tl(Arc::new(TestTl::new(
            "tcp_sa",
            TlCaps::CONNECT_TO_SOCKADDR,
        )))
        .unwrap();

        let found = ib.find_tl(TlSelector::Sockaddr).unwrap();
        assert_eq!(found.name(), "tcp_sa");
    }

    #[test]
    fn test_find_tl_empty_list() {
        let registry = ComponentRegistry::new();
        let ib = registry.register(Arc::new(TestComponent::new("ib"))).unwrap();
        assert!(ib.find_tl(TlSelector::Name("rc")).is_none());
        assert!(ib.find_tl(TlSelector::Sockaddr).is_none());
    }

    #[test]
    fn test_find_tl_never_crosses_components() {
        let registry = ComponentRegistry::new();
        let ib = registry.register(Arc::new(TestComponent::new("ib"))).unwrap();
        let shm = registry.register(Arc::new(TestComponent::new("shm"))).unwrap();
        ib.register_tl(Arc::new(TestTl::new("rc", TlCaps::CONNECT_TO_EP)))
            .unwrap();
        shm.register_tl(Arc::new(TestTl::new("posix", TlCaps::CONNECT_TO_IFACE)))
            .unwrap();

        assert!(ib.find_tl(TlSelector::Name("posix")).is_none());
        assert!(shm.find_tl(TlSelector::Name("rc")).is_none());
    }

    #[test]
    fn test_tl_registration_order_preserved() {
        let registry = ComponentRegistry::new();
        let ib = registry.register(Arc::new(TestComponent::new("ib"))).unwrap();
        for name in ["rc", "dc", "ud"] {
            ib.register_tl(Arc::new(TestTl::new(name, TlCaps::CONNECT_TO_EP)))
                .unwrap();
        }

        let names: Vec<_> = ib.transports().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, ["rc", "dc", "ud"]);

        // First match wins when several transports share a capability.
        let first = ib.find_tl(TlSelector::Name("rc")).unwrap();
        assert_eq!(first.name(), "rc");
    }
}
