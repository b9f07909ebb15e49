//! Wire-level request and response types for the provider contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lifecycle state a provider reports for a compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Provisioning,
    Running,
    Starting,
    Stopping,
    Stopped,
    CreatingImage,
    Terminating,
    Terminated,
}

impl LifecycleState {
    /// States counted as live fleet membership. Anything on the way down
    /// (stopping, terminating) is excluded.
    pub fn is_good(self) -> bool {
        matches!(
            self,
            LifecycleState::Provisioning | LifecycleState::Running | LifecycleState::Starting
        )
    }
}

/// Health as observed by a load balancer or health provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Up,
    Down,
    Starting,
    Unknown,
    OutOfService,
}

/// Parameters for launching a single compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDetails {
    pub availability_domain: String,
    pub compartment_id: String,
    pub image_id: String,
    pub shape: String,
    pub subnet_id: String,
    pub display_name: String,
    /// Free-form instance metadata, e.g. `ssh_authorized_keys`.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A freshly launched instance as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchedInstance {
    pub id: String,
    pub display_name: String,
    pub region: String,
    pub availability_domain: String,
    /// Creation timestamp, epoch milliseconds.
    pub time_created: u64,
}

/// A reusable launch template for pool-managed instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfigurationDetails {
    pub display_name: String,
    pub compartment_id: String,
    pub launch: LaunchDetails,
}

/// Placement of pool instances within one availability domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementConfig {
    pub availability_domain: String,
    pub primary_subnet_id: String,
    #[serde(default)]
    pub fault_domains: Vec<String>,
}

/// Parameters for creating an instance pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePoolDetails {
    pub display_name: String,
    pub compartment_id: String,
    pub instance_configuration_id: String,
    pub size: u32,
    pub placements: Vec<PlacementConfig>,
}

/// Parameters for updating an existing instance pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePoolDetails {
    pub instance_configuration_id: String,
    pub size: u32,
    pub placements: Vec<PlacementConfig>,
}

/// Summary view of an instance pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancePool {
    pub id: String,
    pub display_name: String,
    /// Desired size as the provider currently reports it.
    pub size: u32,
    pub lifecycle_state: LifecycleState,
}

/// A member of an instance pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInstance {
    pub id: String,
    pub display_name: String,
    pub region: String,
    pub availability_domain: String,
    pub state: LifecycleState,
    pub time_created: u64,
}

/// Attachment record linking an instance to a VNIC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnicAttachment {
    pub id: String,
    pub instance_id: String,
    pub vnic_id: String,
}

/// A virtual network interface card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vnic {
    pub id: String,
    /// Absent until the provider finishes wiring the interface.
    pub private_ip: Option<String>,
}

/// A load-balancer backend entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    pub ip_address: String,
    pub port: u16,
    pub weight: Option<u32>,
}

/// Health-check settings for a backend set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthChecker {
    pub protocol: String,
    pub port: u16,
    pub url_path: String,
}

/// TLS settings for a backend set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslConfiguration {
    pub certificate_name: String,
    pub verify_peer_certificate: bool,
}

/// Cookie-based session stickiness settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPersistence {
    pub cookie_name: String,
}

/// A named group of backends sharing policy and health checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSet {
    pub name: String,
    pub policy: Option<String>,
    pub backends: Vec<Backend>,
    pub health_checker: HealthChecker,
    pub ssl: Option<SslConfiguration>,
    pub session_persistence: Option<SessionPersistence>,
}

/// A load balancer with its backend sets keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub display_name: String,
    pub backend_sets: HashMap<String, BackendSet>,
}

/// Full replacement payload for one backend set. The provider applies
/// the backend list wholesale, so callers must carry over every setting
/// they do not intend to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBackendSet {
    pub backends: Vec<Backend>,
    pub policy: Option<String>,
    pub health_checker: HealthChecker,
    pub ssl: Option<SslConfiguration>,
    pub session_persistence: Option<SessionPersistence>,
}

/// Terminal and in-flight states of an asynchronous provider operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkRequestStatus {
    Accepted,
    InProgress,
    Succeeded,
    Failed,
}

/// Handle for an asynchronous provider operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub id: String,
    pub status: WorkRequestStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn good_states_cover_startup_and_running() {
        assert!(LifecycleState::Provisioning.is_good());
        assert!(LifecycleState::Starting.is_good());
        assert!(LifecycleState::Running.is_good());
    }

    #[test]
    fn shutdown_states_are_not_good() {
        assert!(!LifecycleState::Stopping.is_good());
        assert!(!LifecycleState::Stopped.is_good());
        assert!(!LifecycleState::CreatingImage.is_good());
        assert!(!LifecycleState::Terminating.is_good());
        assert!(!LifecycleState::Terminated.is_good());
    }
}
