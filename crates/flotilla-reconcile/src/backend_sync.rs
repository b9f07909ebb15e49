//! Load-balancer backend-set synchronization.
//!
//! Keeps exactly one backend set aligned with fleet membership. Updates
//! are diff-driven (equal address sets produce no provider call, so the
//! operation is idempotent) and replacement lists preserve backends this
//! engine never placed.

use tracing::debug;

use flotilla_provider::types::{Backend, UpdateBackendSet};
use flotilla_provider::CloudProvider;
use flotilla_state::{addresses_of, Instance, ServerGroup};

use crate::error::ReconcileResult;
use crate::task::{phase, TaskSink};
use crate::work_request;

/// Replace the group's backend set so it reflects the transition from
/// `old` to `new` membership.
///
/// No-ops when the group has no backend set configured or the address
/// sets are equal. A 404 on the load balancer, a missing backend set,
/// or a 404 on the update itself are all benign: the resource was
/// removed out of band and there is nothing left to synchronize.
pub async fn update_backend_set(
    provider: &dyn CloudProvider,
    task: &dyn TaskSink,
    group: &ServerGroup,
    old: &[Instance],
    new: &[Instance],
) -> ReconcileResult<()> {
    let (Some(load_balancer_id), Some(backend_set_name)) = (
        group.load_balancer_id.as_deref(),
        group.backend_set_name.as_deref(),
    ) else {
        return Ok(());
    };

    let old_addresses = addresses_of(old);
    let new_addresses = addresses_of(new);
    if old_addresses == new_addresses {
        debug!(group = %group.name, "backend set already in sync");
        return Ok(());
    }

    let load_balancer = match provider.get_load_balancer(load_balancer_id).await {
        Ok(lb) => lb,
        Err(e) if e.is_not_found() => {
            task.update_status(
                phase::UPDATE_LB,
                &format!("Load balancer {load_balancer_id} did not exist...continuing"),
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let Some(backend_set) = load_balancer.backend_sets.get(backend_set_name) else {
        task.update_status(
            phase::UPDATE_LB,
            &format!("Backend set {backend_set_name} did not exist...continuing"),
        );
        return Ok(());
    };

    task.update_status(
        phase::UPDATE_LB,
        &format!(
            "Updating load balancer {} backend set {backend_set_name} from {:?} to {:?}",
            load_balancer.display_name, old_addresses, new_addresses
        ),
    );

    // Backends this engine never placed are carried over untouched.
    let mut backends: Vec<Backend> = backend_set
        .backends
        .iter()
        .filter(|b| !old_addresses.contains(&b.ip_address))
        .cloned()
        .collect();
    let port = backend_set.health_checker.port;
    backends.extend(new_addresses.iter().map(|ip| Backend {
        ip_address: ip.clone(),
        port,
        weight: None,
    }));

    let details = UpdateBackendSet {
        backends,
        policy: backend_set.policy.clone(),
        health_checker: backend_set.health_checker.clone(),
        ssl: backend_set.ssl.clone(),
        session_persistence: backend_set.session_persistence.clone(),
    };

    match provider
        .update_backend_set(load_balancer_id, backend_set_name, &details)
        .await
    {
        Ok(work_request_id) => {
            work_request::poll(provider, task, phase::UPDATE_LB, &work_request_id).await
        }
        Err(e) if e.is_not_found() => {
            task.update_status(
                phase::UPDATE_LB,
                &format!("Backend set {backend_set_name} did not exist...continuing"),
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
