use serde::Serialize;
use ufab_types::Status;

use crate::md::{MdResourceDesc, MemoryDomain, MD_NAME_MAX};

/// Kind of device behind a transport resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Network device.
    Net,
    /// Shared-memory device.
    Shm,
    /// Accelerator device.
    Acc,
    /// Intra-process loopback.
    Loopback,
}

/// Descriptor of one transport resource reachable via a memory domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlResourceDesc {
    /// Transport name; always equals the name of the transport that
    /// reported the resource.
    pub tl_name: String,
    /// Hardware device name, at most [`crate::md::DEVICE_NAME_MAX`] bytes.
    pub dev_name: String,
    /// Device type.
    pub dev_type: DeviceType,
}

/// A transport that contributed nothing to discovery, and why.
#[derive(Debug)]
pub struct DiscoverySkip {
    pub tl_name: String,
    pub status: Status,
}

/// Outcome of transport resource discovery: the aggregated resources plus
/// a side list of transports that failed to query.
#[derive(Debug, Default)]
pub struct TlResourceList {
    pub resources: Vec<TlResourceDesc>,
    pub skipped: Vec<DiscoverySkip>,
}

impl TlResourceList {
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl MemoryDomain {
    /// Discover the transport resources offered by every transport
    /// registered under this MD's component.
    ///
    /// Aggregation is best-effort: a transport that fails to query is
    /// logged, recorded in `skipped`, and does not abort discovery for the
    /// remaining transports. A transport returning zero resources simply
    /// contributes nothing.
    pub fn query_tl_resources(&self) -> TlResourceList {
        let mut list = TlResourceList::default();

        for tl in self.component().transports() {
            let found = match tl.query_resources(self) {
                Ok(found) => found,
                Err(status) => {
                    tracing::debug!(tl = tl.name(), %status, "failed to query transport resources");
                    list.skipped.push(DiscoverySkip {
                        tl_name: tl.name().to_string(),
                        status,
                    });
                    continue;
                }
            };

            for resource in found {
                // A transport reporting a resource under another name is a
                // defect in that driver's query implementation.
                debug_assert_eq!(resource.tl_name, tl.name());
                list.resources.push(resource);
            }
        }

        list
    }
}

/// Describe a single synthetic MD resource named after the component, for
/// components with exactly one memory domain and no real enumeration.
pub fn single_md_resource(component_name: &str) -> Vec<MdResourceDesc> {
    let end = component_name.len().min(MD_NAME_MAX);
    vec![MdResourceDesc {
        md_name: component_name[..end].to_string(),
    }]
}

/// Describe no MD resources at all, for components that exist without an
/// openable memory domain.
pub fn empty_md_resources() -> Vec<MdResourceDesc> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentRegistry, TlCaps};
    use crate::rkey::RkeyIntegrity;
    use crate::test_support::{md_config, TestComponent, TestTl};
    use std::sync::Arc;
    use ufab_types::TlCode;

    fn md_with_tls(tls: Vec<TestTl>) -> MemoryDomain {
        let registry = ComponentRegistry::new();
        let rc = registry.register(Arc::new(TestComponent::new("mock"))).unwrap();
        for tl in tls {
            rc.register_tl(Arc::new(tl)).unwrap();
        }
        MemoryDomain::open(&rc, "mock0", &md_config(), RkeyIntegrity::Disabled).unwrap()
    }

    #[test]
    fn test_discovery_aggregates_in_order() {
        let md = md_with_tls(vec![
            TestTl::new("rc", TlCaps::CONNECT_TO_EP).with_devices(&["mlx5_0", "mlx5_1"]),
            TestTl::new("ud", TlCaps::CONNECT_TO_IFACE).with_devices(&["mlx5_0"]),
        ]);

        let list = md.query_tl_resources();
        assert_eq!(list.len(), 3);
        assert!(list.skipped.is_empty());
        assert_eq!(list.resources[0].tl_name, "rc");
        assert_eq!(list.resources[0].dev_name, "mlx5_0");
        assert_eq!(list.resources[1].dev_name, "mlx5_1");
        assert_eq!(list.resources[2].tl_name, "ud");
    }

    #[test]
    fn test_discovery_best_effort() {
        // T1 returns 2 resources, T2 fails, T3 returns none: the caller
        // sees exactly T1's resources and no error.
        let md = md_with_tls(vec![
            TestTl::new("t1", TlCaps::CONNECT_TO_EP).with_devices(&["d0", "d1"]),
            TestTl::new("t2", TlCaps::CONNECT_TO_EP).fail_query(),
            TestTl::new("t3", TlCaps::CONNECT_TO_EP),
        ]);

        let list = md.query_tl_resources();
        assert_eq!(list.len(), 2);
        assert!(list.resources.iter().all(|r| r.tl_name == "t1"));

        assert_eq!(list.skipped.len(), 1);
        assert_eq!(list.skipped[0].tl_name, "t2");
        assert_eq!(list.skipped[0].status.code(), TlCode::QUERY_FAILED);
    }

    #[test]
    fn test_discovery_empty() {
        let md = md_with_tls(vec![]);
        let list = md.query_tl_resources();
        assert!(list.is_empty());
        assert!(list.skipped.is_empty());
    }

    #[test]
    fn test_discovery_all_failing() {
        let md = md_with_tls(vec![
            TestTl::new("t1", TlCaps::CONNECT_TO_EP).fail_query(),
            TestTl::new("t2", TlCaps::CONNECT_TO_EP).fail_query(),
        ]);
        let list = md.query_tl_resources();
        assert!(list.is_empty());
        assert_eq!(list.skipped.len(), 2);
    }

    #[test]
    fn test_single_md_resource() {
        let resources = single_md_resource("posix");
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].md_name, "posix");
    }

    #[test]
    fn test_empty_md_resources() {
        assert!(empty_md_resources().is_empty());
    }
}
