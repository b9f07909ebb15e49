//! Reconciler — server-group lifecycle operations.
//!
//! Every operation loads the group from the state store, mutates it
//! against the provider through the group's [`Fleet`] strategy, and
//! persists the result. Operations on a group that does not exist are
//! reported through the task sink and answered with `false` / `None`
//! rather than an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use flotilla_provider::types::PlacementConfig;
use flotilla_provider::CloudProvider;
use flotilla_state::{ServerGroup, StateStore};

use crate::backend_sync;
use crate::error::{ReconcileError, ReconcileResult};
use crate::fleet::Fleet;
use crate::poller::{self, PollConfig, PollState, PoolConvergence};
use crate::task::{phase, TaskSink};

/// Min/desired/max sizing envelope accepted on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub min: u32,
    pub desired: u32,
    pub max: u32,
}

/// Description of a server group to create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateServerGroup {
    pub account: String,
    pub name: String,
    pub region: String,
    pub zone: String,
    #[serde(default)]
    pub launch_config: HashMap<String, Value>,
    /// Explicit instance count; overrides `capacity.desired` when set.
    pub target_size: Option<u32>,
    pub capacity: Option<Capacity>,
    pub load_balancer_id: Option<String>,
    pub backend_set_name: Option<String>,
    /// Non-empty placements select the pool-backed strategy.
    #[serde(default)]
    pub placements: Vec<PlacementConfig>,
}

impl CreateServerGroup {
    /// Effective initial size: an explicit target size always wins over
    /// the capacity's desired value; neither present means zero.
    pub fn desired_size(&self) -> u32 {
        self.target_size
            .or_else(|| self.capacity.map(|c| c.desired))
            .unwrap_or(0)
    }

    fn into_group(self) -> ServerGroup {
        let target_size = self.desired_size();
        let mut launch_config = self.launch_config;
        launch_config
            .entry("createdTime".to_string())
            .or_insert_with(|| json!(epoch_millis()));
        ServerGroup {
            name: self.name,
            account: self.account,
            region: self.region,
            zone: self.zone,
            launch_config,
            target_size,
            instances: Vec::new(),
            disabled: false,
            load_balancer_id: self.load_balancer_id,
            backend_set_name: self.backend_set_name,
            instance_pool_id: None,
            instance_configuration_id: None,
            placements: self.placements,
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Server-group reconciliation controller.
pub struct Reconciler {
    provider: Arc<dyn CloudProvider>,
    store: StateStore,
    poll: PollConfig,
}

impl Reconciler {
    pub fn new(provider: Arc<dyn CloudProvider>, store: StateStore) -> Self {
        Self {
            provider,
            store,
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Create a server group.
    ///
    /// Per-instance launch failures are collected, not fatal: whatever
    /// came up is persisted with the target size reflecting it. Only a
    /// batch where nothing came up is an error, and nothing is persisted
    /// for it.
    pub async fn create(
        &self,
        task: &dyn TaskSink,
        spec: CreateServerGroup,
    ) -> ReconcileResult<ServerGroup> {
        let fleet = Fleet::for_create(&spec.placements);
        let mut group = spec.into_group();
        task.update_status(
            phase::DEPLOY,
            &format!(
                "Composing server group {} with {} instance(s)",
                group.name, group.target_size
            ),
        );

        let report = fleet
            .provision(self.provider.as_ref(), task, &mut group)
            .await?;
        if report.is_total_failure() {
            task.update_status(
                phase::DEPLOY,
                &format!("Server group creation failed: {}", report.summary()),
            );
            task.fail();
            return Err(ReconcileError::ProvisioningFailed {
                group: group.name,
                reasons: report.summary(),
            });
        }
        if !report.errors.is_empty() {
            task.update_status(
                phase::DEPLOY,
                &format!(
                    "Server group {} created with {} of {} requested instances",
                    group.name, report.created, report.requested
                ),
            );
        }
        self.store.upsert_server_group(&group)?;

        // Discrete fleets attach to the load balancer right away;
        // pool-backed membership is registered by running convergence,
        // which syncs the backend set as instances materialize.
        match fleet {
            Fleet::Discrete => {
                if group.load_balancer_id.is_some() && !group.instances.is_empty() {
                    self.register_created_instances(task, &mut group).await?;
                }
            }
            Fleet::Pooled => {
                if group.load_balancer_id.is_some() {
                    let mut convergence = PoolConvergence::new(self.poll.clone());
                    convergence
                        .run(self.provider.as_ref(), &self.store, task, &mut group)
                        .await?;
                }
            }
        }

        info!(group = %group.name, account = %group.account, "server group created");
        task.update_status(
            phase::DEPLOY,
            &format!("Done creating server group {}", group.name),
        );
        Ok(group)
    }

    async fn register_created_instances(
        &self,
        task: &dyn TaskSink,
        group: &mut ServerGroup,
    ) -> ReconcileResult<()> {
        task.update_status(phase::DEPLOY, "Looking up instance IP addresses");
        poller::resolve_missing_ips(self.provider.as_ref(), group).await?;
        self.store.upsert_server_group(group)?;
        backend_sync::update_backend_set(self.provider.as_ref(), task, group, &[], &group.instances)
            .await
    }

    /// Resize a group to `target_size`. Returns `false` when the group
    /// does not exist.
    pub async fn resize(
        &self,
        task: &dyn TaskSink,
        account: &str,
        name: &str,
        target_size: u32,
    ) -> ReconcileResult<bool> {
        let Some(mut group) = self.store.get_server_group(account, name)? else {
            task.update_status(phase::RESIZE, &format!("Server group {name} not found"));
            return Ok(false);
        };
        task.update_status(
            phase::RESIZE,
            &format!("Found server group {name}, resizing to {target_size}"),
        );
        Fleet::of(&group)
            .resize(self.provider.as_ref(), task, &mut group, target_size)
            .await?;
        task.update_status(
            phase::RESIZE,
            &format!("Updating persistent data for {name}"),
        );
        self.store.upsert_server_group(&group)?;
        Ok(true)
    }

    /// Mark a group disabled. Only the flag changes: backend-set
    /// membership is left untouched.
    pub async fn disable(
        &self,
        task: &dyn TaskSink,
        account: &str,
        name: &str,
    ) -> ReconcileResult<()> {
        self.set_disabled(task, phase::DISABLE, account, name, true)
            .await
    }

    /// Clear a group's disabled flag.
    pub async fn enable(
        &self,
        task: &dyn TaskSink,
        account: &str,
        name: &str,
    ) -> ReconcileResult<()> {
        self.set_disabled(task, phase::ENABLE, account, name, false)
            .await
    }

    async fn set_disabled(
        &self,
        task: &dyn TaskSink,
        phase: &str,
        account: &str,
        name: &str,
        disabled: bool,
    ) -> ReconcileResult<()> {
        let Some(mut group) = self.store.get_server_group(account, name)? else {
            task.update_status(phase, &format!("Server group {name} not found"));
            return Ok(());
        };
        group.disabled = disabled;
        task.update_status(phase, &format!("Updating persistent data for {name}"));
        self.store.upsert_server_group(&group)?;
        Ok(())
    }

    /// Terminate every known instance and delete the record. Returns
    /// `false` when the group does not exist.
    pub async fn destroy(
        &self,
        task: &dyn TaskSink,
        account: &str,
        name: &str,
    ) -> ReconcileResult<bool> {
        let Some(mut group) = self.store.get_server_group(account, name)? else {
            task.update_status(phase::DESTROY, &format!("Server group {name} not found"));
            return Ok(false);
        };
        task.update_status(phase::DESTROY, &format!("Found server group {name}"));
        Fleet::of(&group)
            .terminate_all(self.provider.as_ref(), task, &mut group)
            .await?;
        task.update_status(
            phase::DESTROY,
            &format!("Removing persistent data for {name}"),
        );
        self.store.delete_server_group(account, name)?;
        info!(group = %name, account = %account, "server group destroyed");
        Ok(true)
    }

    /// Run the convergence loop for a pool-backed group. `None` when the
    /// group does not exist.
    pub async fn converge(
        &self,
        task: &dyn TaskSink,
        account: &str,
        name: &str,
    ) -> ReconcileResult<Option<PollState>> {
        let Some(mut group) = self.store.get_server_group(account, name)? else {
            return Ok(None);
        };
        let mut convergence = PoolConvergence::new(self.poll.clone());
        let state = convergence
            .run(self.provider.as_ref(), &self.store, task, &mut group)
            .await?;
        Ok(Some(state))
    }

    pub fn get_server_group(
        &self,
        account: &str,
        name: &str,
    ) -> ReconcileResult<Option<ServerGroup>> {
        Ok(self.store.get_server_group(account, name)?)
    }

    pub fn list_server_groups(&self, account: &str) -> ReconcileResult<Vec<ServerGroup>> {
        Ok(self.store.list_server_groups(account)?)
    }
}
