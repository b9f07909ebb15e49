//! Scriptable in-memory provider for tests.
//!
//! `MockCloud` records every mutating call and lets tests inject
//! failures per call site: launch failures by call index, missing
//! resources answering 404, scripted pool membership across successive
//! listings, and scripted work-request status sequences.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ProviderError, ProviderResult};
use crate::types::*;
use crate::CloudProvider;

#[derive(Default)]
struct MockState {
    launch_count: usize,
    fail_launch_at: HashSet<usize>,
    launched: Vec<LaunchedInstance>,
    terminated: Vec<String>,
    missing_instances: HashSet<String>,
    fail_terminate: HashSet<String>,
    configurations: Vec<InstanceConfigurationDetails>,
    pools: HashMap<String, InstancePool>,
    missing_pools: HashSet<String>,
    terminated_pools: Vec<String>,
    pool_updates: Vec<(String, UpdatePoolDetails)>,
    /// Successive results of `list_instance_pool_instances`; the last
    /// entry repeats once the script is exhausted.
    pool_members: VecDeque<Vec<PoolInstance>>,
    /// Successive private-IP answers per instance id; the last entry
    /// repeats. An instance with no entry has no VNIC attachment.
    vnic_ips: HashMap<String, VecDeque<Option<String>>>,
    fail_vnics: HashSet<String>,
    load_balancers: HashMap<String, LoadBalancer>,
    backend_updates: Vec<(String, String, UpdateBackendSet)>,
    fail_backend_update: Option<ProviderError>,
    work_requests: VecDeque<WorkRequestStatus>,
}

/// In-memory [`CloudProvider`] with scriptable behavior.
#[derive(Default)]
pub struct MockCloud {
    state: Mutex<MockState>,
}

impl MockCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `index`-th launch (zero-based, counted across all
    /// launches) fail with a quota error.
    pub fn fail_launch_at(&self, index: usize) {
        self.lock().fail_launch_at.insert(index);
    }

    /// Make termination of `instance_id` answer 404.
    pub fn remove_instance(&self, instance_id: &str) {
        self.lock().missing_instances.insert(instance_id.to_string());
    }

    /// Make termination of `instance_id` fail with a server error.
    pub fn fail_terminate(&self, instance_id: &str) {
        self.lock().fail_terminate.insert(instance_id.to_string());
    }

    /// Seed an instance pool without going through creation.
    pub fn put_pool(&self, pool: InstancePool) {
        self.lock().pools.insert(pool.id.clone(), pool);
    }

    /// Make pool reads and listings for `pool_id` answer 404.
    pub fn remove_pool(&self, pool_id: &str) {
        self.lock().missing_pools.insert(pool_id.to_string());
    }

    /// Script the membership returned by successive pool listings. The
    /// last entry repeats once exhausted.
    pub fn script_pool_members(&self, listings: Vec<Vec<PoolInstance>>) {
        self.lock().pool_members = listings.into();
    }

    /// Give `instance_id` a VNIC resolving to a stable private IP.
    pub fn set_vnic_ip(&self, instance_id: &str, ip: &str) {
        self.script_vnic_ips(instance_id, vec![Some(ip.to_string())]);
    }

    /// Script successive private-IP resolutions for `instance_id`; the
    /// last entry repeats. `None` entries model a VNIC that is attached
    /// but not yet wired.
    pub fn script_vnic_ips(&self, instance_id: &str, ips: Vec<Option<String>>) {
        self.lock().vnic_ips.insert(instance_id.to_string(), ips.into());
    }

    /// Make VNIC reads for `instance_id` fail with a server error.
    pub fn fail_vnic(&self, instance_id: &str) {
        self.lock().fail_vnics.insert(instance_id.to_string());
    }

    /// Seed a load balancer for `get_load_balancer`.
    pub fn put_load_balancer(&self, lb: LoadBalancer) {
        self.lock().load_balancers.insert(lb.id.clone(), lb);
    }

    /// Make every `update_backend_set` call fail with `err`.
    pub fn fail_backend_update(&self, err: ProviderError) {
        self.lock().fail_backend_update = Some(err);
    }

    /// Script successive work-request statuses; the last entry repeats.
    /// An unscripted provider answers `Succeeded`.
    pub fn script_work_requests(&self, statuses: Vec<WorkRequestStatus>) {
        self.lock().work_requests = statuses.into();
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn launched(&self) -> Vec<LaunchedInstance> {
        self.lock().launched.clone()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.lock().terminated.clone()
    }

    pub fn configurations(&self) -> Vec<InstanceConfigurationDetails> {
        self.lock().configurations.clone()
    }

    pub fn pool_updates(&self) -> Vec<(String, UpdatePoolDetails)> {
        self.lock().pool_updates.clone()
    }

    pub fn terminated_pools(&self) -> Vec<String> {
        self.lock().terminated_pools.clone()
    }

    pub fn backend_updates(&self) -> Vec<(String, String, UpdateBackendSet)> {
        self.lock().backend_updates.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl MockState {
    fn next_pool_members(&mut self) -> Vec<PoolInstance> {
        if self.pool_members.len() > 1 {
            self.pool_members.pop_front().unwrap_or_default()
        } else {
            self.pool_members.front().cloned().unwrap_or_default()
        }
    }

    fn next_vnic_ip(&mut self, instance_id: &str) -> Option<Option<String>> {
        let script = self.vnic_ips.get_mut(instance_id)?;
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl CloudProvider for MockCloud {
    async fn launch_instance(&self, details: &LaunchDetails) -> ProviderResult<LaunchedInstance> {
        let mut state = self.lock();
        let index = state.launch_count;
        state.launch_count += 1;
        if state.fail_launch_at.contains(&index) {
            return Err(ProviderError::Api {
                status: 400,
                message: "LimitExceeded".to_string(),
            });
        }
        let instance = LaunchedInstance {
            id: format!("ocid.instance.{index}"),
            display_name: details.display_name.clone(),
            region: "mock-region".to_string(),
            availability_domain: details.availability_domain.clone(),
            time_created: 1_700_000_000_000 + index as u64,
        };
        state.launched.push(instance.clone());
        Ok(instance)
    }

    async fn terminate_instance(&self, instance_id: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        if state.missing_instances.contains(instance_id) {
            return Err(ProviderError::not_found("NotAuthorizedOrNotFound"));
        }
        if state.fail_terminate.contains(instance_id) {
            return Err(ProviderError::Api {
                status: 500,
                message: "InternalServerError".to_string(),
            });
        }
        state.terminated.push(instance_id.to_string());
        Ok(())
    }

    async fn create_instance_configuration(
        &self,
        details: &InstanceConfigurationDetails,
    ) -> ProviderResult<String> {
        let mut state = self.lock();
        state.configurations.push(details.clone());
        Ok(format!("ocid.instanceconfiguration.{}", state.configurations.len()))
    }

    async fn create_instance_pool(
        &self,
        details: &CreatePoolDetails,
    ) -> ProviderResult<InstancePool> {
        let mut state = self.lock();
        let pool = InstancePool {
            id: format!("ocid.instancepool.{}", state.pools.len() + 1),
            display_name: details.display_name.clone(),
            size: details.size,
            lifecycle_state: LifecycleState::Provisioning,
        };
        state.pools.insert(pool.id.clone(), pool.clone());
        Ok(pool)
    }

    async fn update_instance_pool(
        &self,
        pool_id: &str,
        details: &UpdatePoolDetails,
    ) -> ProviderResult<InstancePool> {
        let mut state = self.lock();
        if state.missing_pools.contains(pool_id) || !state.pools.contains_key(pool_id) {
            return Err(ProviderError::not_found("NotAuthorizedOrNotFound"));
        }
        state.pool_updates.push((pool_id.to_string(), details.clone()));
        let pool = state
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| ProviderError::not_found("NotAuthorizedOrNotFound"))?;
        pool.size = details.size;
        Ok(pool.clone())
    }

    async fn get_instance_pool(&self, pool_id: &str) -> ProviderResult<InstancePool> {
        let state = self.lock();
        if state.missing_pools.contains(pool_id) {
            return Err(ProviderError::not_found("NotAuthorizedOrNotFound"));
        }
        state
            .pools
            .get(pool_id)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("NotAuthorizedOrNotFound"))
    }

    async fn terminate_instance_pool(&self, pool_id: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        if state.missing_pools.contains(pool_id) || state.pools.remove(pool_id).is_none() {
            return Err(ProviderError::not_found("NotAuthorizedOrNotFound"));
        }
        state.terminated_pools.push(pool_id.to_string());
        Ok(())
    }

    async fn list_instance_pool_instances(
        &self,
        _compartment_id: &str,
        pool_id: &str,
    ) -> ProviderResult<Vec<PoolInstance>> {
        let mut state = self.lock();
        if state.missing_pools.contains(pool_id) {
            return Err(ProviderError::not_found("NotAuthorizedOrNotFound"));
        }
        Ok(state.next_pool_members())
    }

    async fn list_vnic_attachments(
        &self,
        _compartment_id: &str,
        instance_id: &str,
    ) -> ProviderResult<Vec<VnicAttachment>> {
        let state = self.lock();
        if !state.vnic_ips.contains_key(instance_id) && !state.fail_vnics.contains(instance_id) {
            return Ok(Vec::new());
        }
        Ok(vec![VnicAttachment {
            id: format!("attachment-{instance_id}"),
            instance_id: instance_id.to_string(),
            vnic_id: format!("vnic-{instance_id}"),
        }])
    }

    async fn get_vnic(&self, vnic_id: &str) -> ProviderResult<Vnic> {
        let mut state = self.lock();
        let instance_id = vnic_id
            .strip_prefix("vnic-")
            .ok_or_else(|| ProviderError::not_found("NotAuthorizedOrNotFound"))?;
        if state.fail_vnics.contains(instance_id) {
            return Err(ProviderError::Api {
                status: 500,
                message: "InternalServerError".to_string(),
            });
        }
        match state.next_vnic_ip(instance_id) {
            Some(private_ip) => Ok(Vnic {
                id: vnic_id.to_string(),
                private_ip,
            }),
            None => Err(ProviderError::not_found("NotAuthorizedOrNotFound")),
        }
    }

    async fn get_load_balancer(&self, load_balancer_id: &str) -> ProviderResult<LoadBalancer> {
        self.lock()
            .load_balancers
            .get(load_balancer_id)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("NotAuthorizedOrNotFound"))
    }

    async fn update_backend_set(
        &self,
        load_balancer_id: &str,
        backend_set_name: &str,
        details: &UpdateBackendSet,
    ) -> ProviderResult<String> {
        let mut state = self.lock();
        if let Some(err) = state.fail_backend_update.clone() {
            return Err(err);
        }
        state.backend_updates.push((
            load_balancer_id.to_string(),
            backend_set_name.to_string(),
            details.clone(),
        ));
        Ok(format!("ocid.workrequest.{}", state.backend_updates.len()))
    }

    async fn get_work_request(&self, work_request_id: &str) -> ProviderResult<WorkRequest> {
        let mut state = self.lock();
        let status = if state.work_requests.len() > 1 {
            state
                .work_requests
                .pop_front()
                .unwrap_or(WorkRequestStatus::Succeeded)
        } else {
            state
                .work_requests
                .front()
                .copied()
                .unwrap_or(WorkRequestStatus::Succeeded)
        };
        Ok(WorkRequest {
            id: work_request_id.to_string(),
            status,
        })
    }
}
