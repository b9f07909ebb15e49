//! Cloud provider contract for the flotilla reconciliation engine.
//!
//! The engine talks to exactly one seam: the [`CloudProvider`] trait. It
//! covers the compute surface (instances, instance configurations,
//! instance pools, VNIC lookups) and the load-balancer surface (read a
//! load balancer, replace a backend set, poll the resulting work
//! request). Production deployments implement it over a provider SDK;
//! tests use the scripted [`mock::MockCloud`] behind the `mock` feature.

pub mod error;
pub mod types;

#[cfg(feature = "mock")]
pub mod mock;

use async_trait::async_trait;

pub use error::{ProviderError, ProviderResult};
pub use types::*;

/// Identifier stamped on instances managed by this engine.
pub const PROVIDER_ID: &str = "flotilla";

/// Asynchronous cloud provider client.
///
/// All methods map one-to-one onto provider API calls; implementations
/// translate SDK failures into [`ProviderError`] and must surface the
/// HTTP status so callers can recognize 404s.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Launch a single compute instance.
    async fn launch_instance(&self, details: &LaunchDetails) -> ProviderResult<LaunchedInstance>;

    /// Terminate a compute instance by id.
    async fn terminate_instance(&self, instance_id: &str) -> ProviderResult<()>;

    /// Create a launch template for pool-managed instances. Returns the
    /// new configuration's id.
    async fn create_instance_configuration(
        &self,
        details: &InstanceConfigurationDetails,
    ) -> ProviderResult<String>;

    /// Create an instance pool from an existing configuration.
    async fn create_instance_pool(&self, details: &CreatePoolDetails)
    -> ProviderResult<InstancePool>;

    /// Update an instance pool's size, configuration or placements.
    async fn update_instance_pool(
        &self,
        pool_id: &str,
        details: &UpdatePoolDetails,
    ) -> ProviderResult<InstancePool>;

    /// Fetch an instance pool's current summary.
    async fn get_instance_pool(&self, pool_id: &str) -> ProviderResult<InstancePool>;

    /// Terminate an instance pool along with the instances it manages.
    async fn terminate_instance_pool(&self, pool_id: &str) -> ProviderResult<()>;

    /// List the instances currently belonging to a pool.
    async fn list_instance_pool_instances(
        &self,
        compartment_id: &str,
        pool_id: &str,
    ) -> ProviderResult<Vec<PoolInstance>>;

    /// List the VNIC attachments of an instance.
    async fn list_vnic_attachments(
        &self,
        compartment_id: &str,
        instance_id: &str,
    ) -> ProviderResult<Vec<VnicAttachment>>;

    /// Fetch a VNIC by id.
    async fn get_vnic(&self, vnic_id: &str) -> ProviderResult<Vnic>;

    /// Fetch a load balancer with its backend sets.
    async fn get_load_balancer(&self, load_balancer_id: &str) -> ProviderResult<LoadBalancer>;

    /// Replace a backend set wholesale. Returns the id of the work
    /// request tracking the asynchronous update.
    async fn update_backend_set(
        &self,
        load_balancer_id: &str,
        backend_set_name: &str,
        details: &UpdateBackendSet,
    ) -> ProviderResult<String>;

    /// Fetch the status of an asynchronous operation.
    async fn get_work_request(&self, work_request_id: &str) -> ProviderResult<WorkRequest>;
}
