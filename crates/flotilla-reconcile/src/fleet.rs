//! Fleet provisioning strategies.
//!
//! A server group is either a `Discrete` fleet, where the engine
//! launches and terminates individual instances itself, or a `Pooled`
//! fleet, where sizing is delegated to a provider-managed instance
//! pool. The strategy is chosen once (placements at creation, pool id
//! afterwards) and dispatched through this enum, never re-derived from
//! field null-checks at call sites.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, warn};

use flotilla_provider::types::{
    CreatePoolDetails, HealthState, InstanceConfigurationDetails, LaunchDetails, PlacementConfig,
    UpdatePoolDetails,
};
use flotilla_provider::{CloudProvider, ProviderError, PROVIDER_ID};
use flotilla_state::{Instance, ServerGroup};

use crate::error::ReconcileResult;
use crate::task::{phase, TaskSink};

/// Provisioning strategy of a server group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fleet {
    /// Instances launched and terminated one at a time by the engine.
    Discrete,
    /// Sizing delegated to a provider-managed instance pool.
    Pooled,
}

impl Fleet {
    /// Strategy for a group being created: non-empty placements select
    /// the pool path.
    pub fn for_create(placements: &[PlacementConfig]) -> Self {
        if placements.is_empty() {
            Fleet::Discrete
        } else {
            Fleet::Pooled
        }
    }

    /// Strategy of an existing group.
    pub fn of(group: &ServerGroup) -> Self {
        if group.is_pool_backed() {
            Fleet::Pooled
        } else {
            Fleet::Discrete
        }
    }

    /// Provision the group's initial capacity.
    pub async fn provision(
        self,
        provider: &dyn CloudProvider,
        task: &dyn TaskSink,
        group: &mut ServerGroup,
    ) -> ReconcileResult<ProvisionReport> {
        match self {
            Fleet::Discrete => provision_discrete(provider, task, group).await,
            Fleet::Pooled => provision_pooled(provider, group).await,
        }
    }

    /// Bring the group to `target` instances.
    pub async fn resize(
        self,
        provider: &dyn CloudProvider,
        task: &dyn TaskSink,
        group: &mut ServerGroup,
        target: u32,
    ) -> ReconcileResult<()> {
        match self {
            Fleet::Pooled => resize_pool(provider, group, target).await,
            Fleet::Discrete => match target.cmp(&group.target_size) {
                Ordering::Greater => increase(provider, task, group, target).await,
                Ordering::Less => decrease(provider, task, group, target).await,
                Ordering::Equal => {
                    task.update_status(
                        phase::RESIZE,
                        "Already running the requested number of instances",
                    );
                    Ok(())
                }
            },
        }
    }

    /// Terminate the group's capacity. A discrete fleet terminates each
    /// known instance; a pooled fleet additionally terminates the pool,
    /// which takes any remaining pool-managed instances with it. A 404
    /// on any resource means it is already gone and is tolerated; any
    /// other error aborts the remainder.
    pub async fn terminate_all(
        self,
        provider: &dyn CloudProvider,
        task: &dyn TaskSink,
        group: &mut ServerGroup,
    ) -> ReconcileResult<()> {
        for instance in &group.instances {
            task.update_status(
                phase::DESTROY,
                &format!("Terminating instance: {}", instance.name),
            );
            match provider.terminate_instance(&instance.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(instance = %instance.id, "instance already terminated");
                }
                Err(e) => return Err(e.into()),
            }
        }
        group.instances.clear();

        if self == Fleet::Pooled {
            if let Some(pool_id) = group.instance_pool_id.clone() {
                task.update_status(
                    phase::DESTROY,
                    &format!("Terminating instance pool {pool_id}"),
                );
                match provider.terminate_instance_pool(&pool_id).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        debug!(pool = %pool_id, "instance pool already terminated");
                    }
                    Err(e) => return Err(e.into()),
                }
                group.instance_pool_id = None;
            }
        }
        Ok(())
    }
}

/// Outcome of a batch provisioning attempt.
#[derive(Debug)]
pub struct ProvisionReport {
    pub requested: u32,
    pub created: u32,
    pub errors: Vec<ProviderError>,
}

impl ProvisionReport {
    /// Nothing came up and at least one launch was attempted.
    pub fn is_total_failure(&self) -> bool {
        self.created == 0 && !self.errors.is_empty()
    }

    /// One line summarizing every collected error.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ProviderError::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Launch `target_size` instances one at a time, collecting per-instance
/// failures without aborting the batch. The group's target size ends up
/// reflecting what actually came up.
async fn provision_discrete(
    provider: &dyn CloudProvider,
    task: &dyn TaskSink,
    group: &mut ServerGroup,
) -> ReconcileResult<ProvisionReport> {
    let requested = group.target_size;
    let mut errors = Vec::new();
    for index in 0..requested {
        task.update_status(phase::DEPLOY, &format!("Creating instance {index}"));
        match launch_one(provider, group, index).await {
            Ok(instance) => group.instances.push(instance),
            Err(e) => {
                task.update_status(phase::DEPLOY, &format!("Creating instance failed: {e}"));
                errors.push(e);
            }
        }
    }
    let created = group.instances.len() as u32;
    group.target_size = created;
    Ok(ProvisionReport {
        requested,
        created,
        errors,
    })
}

/// Create the launch template, then the pool itself. Both identifiers
/// are recorded on the group before the caller persists it; actual
/// instances materialize later and are picked up by convergence.
async fn provision_pooled(
    provider: &dyn CloudProvider,
    group: &mut ServerGroup,
) -> ReconcileResult<ProvisionReport> {
    let configuration = InstanceConfigurationDetails {
        display_name: format!("{}-config", group.name),
        compartment_id: compartment_of(group),
        launch: launch_details(group, &format!("{}-instance", group.name)),
    };
    let configuration_id = provider.create_instance_configuration(&configuration).await?;
    group.instance_configuration_id = Some(configuration_id.clone());

    let pool = provider
        .create_instance_pool(&CreatePoolDetails {
            display_name: group.name.clone(),
            compartment_id: compartment_of(group),
            instance_configuration_id: configuration_id,
            size: group.target_size,
            placements: group.placements.clone(),
        })
        .await?;
    debug!(pool = %pool.id, group = %group.name, "instance pool created");
    group.instance_pool_id = Some(pool.id);

    Ok(ProvisionReport {
        requested: group.target_size,
        created: group.target_size,
        errors: Vec::new(),
    })
}

/// Pool-backed resize is a single pool update; the provider scales the
/// membership asynchronously.
async fn resize_pool(
    provider: &dyn CloudProvider,
    group: &mut ServerGroup,
    target: u32,
) -> ReconcileResult<()> {
    let Some(pool_id) = group.instance_pool_id.clone() else {
        warn!(group = %group.name, "pool-backed group has no pool id, skipping resize");
        return Ok(());
    };
    provider
        .update_instance_pool(
            &pool_id,
            &UpdatePoolDetails {
                instance_configuration_id: group
                    .instance_configuration_id
                    .clone()
                    .unwrap_or_default(),
                size: target,
                placements: group.placements.clone(),
            },
        )
        .await?;
    group.target_size = target;
    Ok(())
}

/// Launch the missing instances, collecting per-instance failures. The
/// target size advances only by the count actually created.
async fn increase(
    provider: &dyn CloudProvider,
    task: &dyn TaskSink,
    group: &mut ServerGroup,
    target: u32,
) -> ReconcileResult<()> {
    let current = group.target_size;
    let mut created = 0u32;
    let mut errors = Vec::new();
    for index in current..target {
        task.update_status(phase::RESIZE, &format!("Creating instance {index}"));
        match launch_one(provider, group, index).await {
            Ok(instance) => {
                group.instances.push(instance);
                created += 1;
            }
            Err(e) => {
                task.update_status(phase::RESIZE, &format!("Creating instance failed: {e}"));
                errors.push(e);
            }
        }
    }
    if !errors.is_empty() {
        task.update_status(
            phase::RESIZE,
            &format!(
                "Created {created} of {} requested instances",
                target - current
            ),
        );
    }
    group.target_size = current + created;
    Ok(())
}

/// Terminate the excess instances in membership order. 404 means the
/// instance is already gone; any other error aborts the remainder and
/// leaves the failed instance in the membership list.
async fn decrease(
    provider: &dyn CloudProvider,
    task: &dyn TaskSink,
    group: &mut ServerGroup,
    target: u32,
) -> ReconcileResult<()> {
    let excess = group.target_size.saturating_sub(target) as usize;
    let count = excess.min(group.instances.len());
    for _ in 0..count {
        let instance = group.instances.remove(0);
        task.update_status(
            phase::RESIZE,
            &format!("Terminating instance: {}", instance.name),
        );
        match provider.terminate_instance(&instance.id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(instance = %instance.id, "instance already terminated");
            }
            Err(e) => {
                group.instances.insert(0, instance);
                return Err(e.into());
            }
        }
    }
    group.target_size = target;
    Ok(())
}

async fn launch_one(
    provider: &dyn CloudProvider,
    group: &ServerGroup,
    index: u32,
) -> Result<Instance, ProviderError> {
    let details = launch_details(group, &format!("{}-{index}", group.name));
    let launched = provider.launch_instance(&details).await?;
    Ok(Instance {
        id: launched.id,
        name: launched.display_name,
        region: launched.region,
        zone: launched.availability_domain,
        cloud_provider: PROVIDER_ID.to_string(),
        health_state: Some(HealthState::Starting),
        lifecycle_state: None,
        private_ip: None,
        launch_time: launched.time_created,
    })
}

fn launch_details(group: &ServerGroup, display_name: &str) -> LaunchDetails {
    LaunchDetails {
        availability_domain: config_str(group, "availabilityDomain"),
        compartment_id: compartment_of(group),
        image_id: config_str(group, "imageId"),
        shape: config_str(group, "shape"),
        subnet_id: config_str(group, "subnetId"),
        display_name: display_name.to_string(),
        metadata: metadata_of(group),
    }
}

fn metadata_of(group: &ServerGroup) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    if let Some(keys) = group.launch_config_str("sshAuthorizedKeys") {
        if !keys.trim().is_empty() {
            metadata.insert("ssh_authorized_keys".to_string(), keys.to_string());
        }
    }
    metadata
}

fn compartment_of(group: &ServerGroup) -> String {
    config_str(group, "compartmentId")
}

fn config_str(group: &ServerGroup, key: &str) -> String {
    group.launch_config_str(key).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_provider::mock::MockCloud;
    use serde_json::json;

    use crate::task::RecordingTask;

    fn test_group(name: &str, target_size: u32) -> ServerGroup {
        let mut launch_config = HashMap::new();
        launch_config.insert("imageId".to_string(), json!("ocid.image.1"));
        launch_config.insert("shape".to_string(), json!("VM.Standard2.1"));
        launch_config.insert("subnetId".to_string(), json!("ocid.subnet.1"));
        launch_config.insert("availabilityDomain".to_string(), json!("AD-1"));
        launch_config.insert("compartmentId".to_string(), json!("ocid.compartment.1"));
        ServerGroup {
            name: name.to_string(),
            account: "prod".to_string(),
            region: "us-phoenix-1".to_string(),
            zone: "AD-1".to_string(),
            launch_config,
            target_size,
            instances: Vec::new(),
            disabled: false,
            load_balancer_id: None,
            backend_set_name: None,
            instance_pool_id: None,
            instance_configuration_id: None,
            placements: Vec::new(),
        }
    }

    fn placement() -> PlacementConfig {
        PlacementConfig {
            availability_domain: "AD-1".to_string(),
            primary_subnet_id: "ocid.subnet.1".to_string(),
            fault_domains: Vec::new(),
        }
    }

    #[test]
    fn strategy_selection() {
        assert_eq!(Fleet::for_create(&[]), Fleet::Discrete);
        assert_eq!(Fleet::for_create(&[placement()]), Fleet::Pooled);

        let mut group = test_group("web-v001", 2);
        assert_eq!(Fleet::of(&group), Fleet::Discrete);
        group.instance_pool_id = Some("ocid.instancepool.1".to_string());
        assert_eq!(Fleet::of(&group), Fleet::Pooled);
    }

    #[tokio::test]
    async fn discrete_provision_names_instances_by_index() {
        let cloud = MockCloud::new();
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 3);

        let report = Fleet::Discrete
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();

        assert_eq!(report.created, 3);
        assert!(report.errors.is_empty());
        let names: Vec<String> = group.instances.iter().map(|i| i.name.clone()).collect();
        assert_eq!(names, vec!["web-v001-0", "web-v001-1", "web-v001-2"]);
        assert!(group
            .instances
            .iter()
            .all(|i| i.health_state == Some(HealthState::Starting)));
    }

    #[tokio::test]
    async fn discrete_provision_collects_partial_failures() {
        let cloud = MockCloud::new();
        cloud.fail_launch_at(1);
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 3);

        let report = Fleet::Discrete
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();

        assert_eq!(report.requested, 3);
        assert_eq!(report.created, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(!report.is_total_failure());
        assert_eq!(group.target_size, 2);
    }

    #[tokio::test]
    async fn discrete_provision_total_failure() {
        let cloud = MockCloud::new();
        cloud.fail_launch_at(0);
        cloud.fail_launch_at(1);
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 2);

        let report = Fleet::Discrete
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();

        assert!(report.is_total_failure());
        assert!(group.instances.is_empty());
    }

    #[tokio::test]
    async fn pooled_provision_records_both_ids() {
        let cloud = MockCloud::new();
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 3);
        group.placements = vec![placement()];

        Fleet::Pooled
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();

        assert!(group.instance_configuration_id.is_some());
        assert!(group.instance_pool_id.is_some());
        let configs = cloud.configurations();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].display_name, "web-v001-config");
        assert_eq!(configs[0].launch.display_name, "web-v001-instance");
    }

    #[tokio::test]
    async fn pooled_resize_is_one_pool_update() {
        let cloud = MockCloud::new();
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 3);
        group.placements = vec![placement()];
        Fleet::Pooled
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();

        Fleet::Pooled
            .resize(&cloud, &task, &mut group, 5)
            .await
            .unwrap();

        let updates = cloud.pool_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1.size, 5);
        assert_eq!(updates[0].1.placements, group.placements);
        assert_eq!(group.target_size, 5);
        assert!(cloud.launched().is_empty());
    }

    #[tokio::test]
    async fn increase_advances_target_only_by_created_count() {
        let cloud = MockCloud::new();
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 2);
        Fleet::Discrete
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();

        // Launches 2 and 4 succeed, 3 fails: one of two new instances.
        cloud.fail_launch_at(3);
        Fleet::Discrete
            .resize(&cloud, &task, &mut group, 5)
            .await
            .unwrap();

        assert_eq!(group.target_size, 4);
        assert_eq!(group.instances.len(), 4);
    }

    #[tokio::test]
    async fn decrease_tolerates_missing_instances() {
        let cloud = MockCloud::new();
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 3);
        Fleet::Discrete
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();

        cloud.remove_instance(&group.instances[0].id);
        Fleet::Discrete
            .resize(&cloud, &task, &mut group, 1)
            .await
            .unwrap();

        assert_eq!(group.target_size, 1);
        assert_eq!(group.instances.len(), 1);
        // Only the second excess instance reached the provider.
        assert_eq!(cloud.terminated().len(), 1);
    }

    #[tokio::test]
    async fn decrease_aborts_on_non_404_error() {
        let cloud = MockCloud::new();
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 3);
        Fleet::Discrete
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();

        cloud.fail_terminate(&group.instances[0].id);
        let result = Fleet::Discrete.resize(&cloud, &task, &mut group, 0).await;

        assert!(result.is_err());
        // The failed instance stays in the membership list.
        assert_eq!(group.instances.len(), 3);
        assert_eq!(group.target_size, 3);
    }

    #[tokio::test]
    async fn zero_delta_resize_is_a_noop() {
        let cloud = MockCloud::new();
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 2);
        Fleet::Discrete
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();

        Fleet::Discrete
            .resize(&cloud, &task, &mut group, 2)
            .await
            .unwrap();

        assert_eq!(cloud.launched().len(), 2);
        assert!(cloud.terminated().is_empty());
    }

    #[tokio::test]
    async fn terminate_all_tolerates_404_per_instance() {
        let cloud = MockCloud::new();
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 3);
        Fleet::Discrete
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();

        cloud.remove_instance(&group.instances[1].id);
        Fleet::Discrete
            .terminate_all(&cloud, &task, &mut group)
            .await
            .unwrap();

        assert!(group.instances.is_empty());
        assert_eq!(cloud.terminated().len(), 2);
    }

    #[tokio::test]
    async fn terminate_all_removes_the_backing_pool() {
        let cloud = MockCloud::new();
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 3);
        group.placements = vec![placement()];
        Fleet::Pooled
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();
        let pool_id = group.instance_pool_id.clone().unwrap();

        Fleet::Pooled
            .terminate_all(&cloud, &task, &mut group)
            .await
            .unwrap();

        assert_eq!(cloud.terminated_pools(), vec![pool_id.clone()]);
        assert!(group.instance_pool_id.is_none());
        let lookup = cloud.get_instance_pool(&pool_id).await;
        assert!(matches!(lookup, Err(ref e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn terminate_all_tolerates_a_vanished_pool() {
        let cloud = MockCloud::new();
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 3);
        group.placements = vec![placement()];
        Fleet::Pooled
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();
        let pool_id = group.instance_pool_id.clone().unwrap();

        cloud.remove_pool(&pool_id);
        Fleet::Pooled
            .terminate_all(&cloud, &task, &mut group)
            .await
            .unwrap();

        assert!(cloud.terminated_pools().is_empty());
        assert!(group.instance_pool_id.is_none());
    }

    #[tokio::test]
    async fn launches_carry_ssh_keys_as_metadata() {
        let cloud = MockCloud::new();
        let task = RecordingTask::new();
        let mut group = test_group("web-v001", 1);
        group
            .launch_config
            .insert("sshAuthorizedKeys".to_string(), json!("ssh-rsa AAAA test"));

        Fleet::Discrete
            .provision(&cloud, &task, &mut group)
            .await
            .unwrap();

        let launched = cloud.launched();
        assert_eq!(launched.len(), 1);
        let details = launch_details(&group, "web-v001-0");
        assert_eq!(
            details.metadata.get("ssh_authorized_keys").map(String::as_str),
            Some("ssh-rsa AAAA test")
        );
    }
}
