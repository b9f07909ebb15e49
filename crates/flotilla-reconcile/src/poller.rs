//! Pool convergence — bounded polling of instance-pool membership.
//!
//! After a pool-backed create or resize the provider scales the pool
//! asynchronously. `PoolConvergence` polls at a fixed interval until the
//! observed address count reaches the group's target size or a deadline
//! expires. Each poll that disagrees with local state runs a membership
//! sync: pool instances in a "good" lifecycle state are merged into the
//! group, missing private IPs are resolved through VNIC lookups, and any
//! change to the address set is persisted and pushed to the backend
//! synchronizer.
//!
//! All timing goes through `tokio::time`, so tests drive the loop with
//! a paused clock instead of real delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use flotilla_provider::{CloudProvider, ProviderError, PROVIDER_ID};
use flotilla_state::{addresses_of, Instance, ServerGroup, StateStore};

use crate::backend_sync;
use crate::error::ReconcileResult;
use crate::task::{phase, TaskSink};

/// Polling cadence and bound for convergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Sleep between polls, e.g. `"5s"`.
    pub interval: String,
    /// Overall deadline, e.g. `"10m"`.
    pub timeout: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: "5s".to_string(),
            timeout: "10m".to_string(),
        }
    }
}

impl PollConfig {
    pub fn interval_duration(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_secs(5))
    }

    pub fn timeout_duration(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(600))
    }
}

/// State of the convergence loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Not yet started.
    Idle,
    /// Actively reconciling observed membership.
    Syncing,
    /// Observed address count reached the target size.
    Converged,
    /// The deadline expired first. Reported via the task sink, not an
    /// error: the pool may still converge on its own.
    TimedOut,
}

/// Bounded convergence loop over one pool-backed server group.
pub struct PoolConvergence {
    config: PollConfig,
    state: PollState,
}

impl PoolConvergence {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            state: PollState::Idle,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Poll until `group` has `target_size` addressable instances or the
    /// deadline expires. The group is persisted on every membership
    /// change, so partial progress survives a timeout.
    pub async fn run(
        &mut self,
        provider: &dyn CloudProvider,
        store: &StateStore,
        task: &dyn TaskSink,
        group: &mut ServerGroup,
    ) -> ReconcileResult<PollState> {
        let Some(pool_id) = group.instance_pool_id.clone() else {
            warn!(group = %group.name, "convergence requested for a non-pool-backed group");
            self.state = if group.address_set().len() as u32 == group.target_size {
                PollState::Converged
            } else {
                PollState::TimedOut
            };
            return Ok(self.state);
        };

        let interval = self.config.interval_duration();
        let deadline = Instant::now() + self.config.timeout_duration();

        loop {
            self.state = PollState::Syncing;
            // A vanished pool still triggers a sync: the listing answers
            // 404 as well, which drains the membership.
            let reported = match provider.get_instance_pool(&pool_id).await {
                Ok(pool) => Some(pool.size),
                Err(e) if e.is_not_found() => {
                    task.update_status(
                        phase::RESIZE,
                        &format!("Instance pool for {} did not exist...continuing", group.name),
                    );
                    None
                }
                Err(e) => return Err(e.into()),
            };

            let observed = group.address_set().len() as u32;
            if reported != Some(observed) {
                sync_instances(provider, store, task, group).await?;
            }

            let observed = group.address_set().len() as u32;
            if observed == group.target_size {
                self.state = PollState::Converged;
                break;
            }
            if Instant::now() >= deadline {
                task.update_status(
                    phase::RESIZE,
                    &format!(
                        "Timed out waiting for {} to reach {} up instances (got {observed})",
                        group.name, group.target_size
                    ),
                );
                self.state = PollState::TimedOut;
                break;
            }
            task.update_status(
                phase::RESIZE,
                &format!(
                    "Waiting for {} to reach {} up instances (got {observed})",
                    group.name, group.target_size
                ),
            );
            sleep(interval).await;
        }
        Ok(self.state)
    }
}

/// Reconcile the group's membership list against the pool's listing.
///
/// Pool members in a non-good lifecycle state are dropped; known
/// instances are reused by id so already-resolved addresses are kept.
/// Returns whether the address set changed; only a change persists the
/// group and invokes the backend synchronizer.
pub(crate) async fn sync_instances(
    provider: &dyn CloudProvider,
    store: &StateStore,
    task: &dyn TaskSink,
    group: &mut ServerGroup,
) -> ReconcileResult<bool> {
    let Some(pool_id) = group.instance_pool_id.clone() else {
        return Ok(false);
    };
    let compartment = group
        .launch_config_str("compartmentId")
        .unwrap_or_default()
        .to_string();

    let old = std::mem::take(&mut group.instances);
    let mut new = Vec::new();
    match provider
        .list_instance_pool_instances(&compartment, &pool_id)
        .await
    {
        Ok(members) => {
            for member in members {
                if !member.state.is_good() {
                    debug!(instance = %member.id, state = ?member.state, "skipping non-good pool member");
                    continue;
                }
                let mut instance = old
                    .iter()
                    .find(|i| i.id == member.id)
                    .cloned()
                    .unwrap_or_else(|| Instance {
                        id: member.id.clone(),
                        name: member.display_name.clone(),
                        region: member.region.clone(),
                        zone: member.availability_domain.clone(),
                        cloud_provider: PROVIDER_ID.to_string(),
                        health_state: None,
                        lifecycle_state: None,
                        private_ip: None,
                        launch_time: member.time_created,
                    });
                instance.lifecycle_state = Some(member.state);
                if instance.private_ip.is_none() {
                    match resolve_private_ip(provider, &compartment, &member.id).await {
                        Ok(ip) => instance.private_ip = ip,
                        Err(e) => {
                            group.instances = old;
                            return Err(e.into());
                        }
                    }
                }
                new.push(instance);
            }
        }
        Err(e) if e.is_not_found() => {
            debug!(pool = %pool_id, "pool listing answered 404, treating membership as empty");
        }
        Err(e) => {
            group.instances = old;
            return Err(e.into());
        }
    }

    if addresses_of(&new) == addresses_of(&old) {
        group.instances = new;
        return Ok(false);
    }
    group.instances = new;
    store.upsert_server_group(group)?;
    backend_sync::update_backend_set(provider, task, group, &old, &group.instances).await?;
    Ok(true)
}

/// First resolvable private IP of an instance, through its VNIC
/// attachments. `None` when the interface is not wired yet.
pub(crate) async fn resolve_private_ip(
    provider: &dyn CloudProvider,
    compartment_id: &str,
    instance_id: &str,
) -> Result<Option<String>, ProviderError> {
    for attachment in provider
        .list_vnic_attachments(compartment_id, instance_id)
        .await?
    {
        let vnic = provider.get_vnic(&attachment.vnic_id).await?;
        if vnic.private_ip.is_some() {
            return Ok(vnic.private_ip);
        }
    }
    Ok(None)
}

/// Resolve the private IP of every instance that lacks one.
pub(crate) async fn resolve_missing_ips(
    provider: &dyn CloudProvider,
    group: &mut ServerGroup,
) -> Result<(), ProviderError> {
    let compartment = group
        .launch_config_str("compartmentId")
        .unwrap_or_default()
        .to_string();
    for instance in &mut group.instances {
        if instance.private_ip.is_none() {
            instance.private_ip = resolve_private_ip(provider, &compartment, &instance.id).await?;
        }
    }
    Ok(())
}

/// Parse a duration string like "5s", "500ms", "10m".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
