//! Domain types persisted by the state store.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use flotilla_provider::types::{HealthState, LifecycleState, PlacementConfig};

/// A compute instance known to belong to a server group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Provider-assigned id, unique within the group.
    pub id: String,
    pub name: String,
    pub region: String,
    pub zone: String,
    pub cloud_provider: String,
    /// Health as observed by a load balancer (discrete fleets).
    pub health_state: Option<HealthState>,
    /// Provider lifecycle state (pool-backed fleets).
    pub lifecycle_state: Option<LifecycleState>,
    /// Resolved lazily via VNIC lookup; absent until the provider has
    /// wired the interface.
    pub private_ip: Option<String>,
    /// Launch timestamp, epoch milliseconds.
    pub launch_time: u64,
}

/// A named, versioned fleet of instances owned by one account.
///
/// `instance_pool_id` is the strategy discriminator for existing groups:
/// set iff the fleet is backed by a provider-managed instance pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerGroup {
    pub name: String,
    pub account: String,
    pub region: String,
    pub zone: String,
    /// Launch parameters (imageId, shape, subnetId, availabilityDomain,
    /// sshAuthorizedKeys, compartmentId, createdTime).
    #[serde(default)]
    pub launch_config: HashMap<String, Value>,
    pub target_size: u32,
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub disabled: bool,
    pub load_balancer_id: Option<String>,
    pub backend_set_name: Option<String>,
    pub instance_pool_id: Option<String>,
    pub instance_configuration_id: Option<String>,
    #[serde(default)]
    pub placements: Vec<PlacementConfig>,
}

impl ServerGroup {
    /// Composite table key: `{account}/{name}`.
    pub fn table_key(&self) -> String {
        table_key(&self.account, &self.name)
    }

    /// Whether this group is backed by a provider-managed instance pool.
    pub fn is_pool_backed(&self) -> bool {
        self.instance_pool_id.is_some()
    }

    /// String-typed launch config entry, `None` if absent or not a string.
    pub fn launch_config_str(&self, key: &str) -> Option<&str> {
        self.launch_config.get(key).and_then(Value::as_str)
    }

    /// Address set of the current membership.
    pub fn address_set(&self) -> BTreeSet<String> {
        addresses_of(&self.instances)
    }
}

/// Composite table key for a `(account, name)` pair.
pub fn table_key(account: &str, name: &str) -> String {
    format!("{account}/{name}")
}

/// Private-IP set of a membership list. Instances whose IP has not been
/// resolved yet do not contribute an address.
pub fn addresses_of(instances: &[Instance]) -> BTreeSet<String> {
    instances
        .iter()
        .filter_map(|i| i.private_ip.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_instance(id: &str, ip: Option<&str>) -> Instance {
        Instance {
            id: id.to_string(),
            name: format!("{id}-name"),
            region: "r1".to_string(),
            zone: "ad1".to_string(),
            cloud_provider: "flotilla".to_string(),
            health_state: None,
            lifecycle_state: Some(LifecycleState::Running),
            private_ip: ip.map(str::to_string),
            launch_time: 1000,
        }
    }

    #[test]
    fn addresses_skip_unresolved_instances() {
        let instances = vec![
            test_instance("a", Some("10.0.0.1")),
            test_instance("b", None),
            test_instance("c", Some("10.0.0.3")),
        ];
        let addrs = addresses_of(&instances);
        assert_eq!(addrs.len(), 2);
        assert!(addrs.contains("10.0.0.1"));
        assert!(addrs.contains("10.0.0.3"));
    }

    #[test]
    fn address_set_is_order_insensitive() {
        let forward = vec![
            test_instance("a", Some("10.0.0.1")),
            test_instance("b", Some("10.0.0.2")),
        ];
        let reverse = vec![
            test_instance("b", Some("10.0.0.2")),
            test_instance("a", Some("10.0.0.1")),
        ];
        assert_eq!(addresses_of(&forward), addresses_of(&reverse));
    }

    #[test]
    fn table_key_is_account_scoped() {
        assert_eq!(table_key("prod", "web-v001"), "prod/web-v001");
    }
}
