//! flotilla-reconcile — the server-group reconciliation engine.
//!
//! Manages named fleets of cloud compute instances against a cloud
//! provider and keeps an attached load-balancer backend set in sync
//! with live fleet membership.
//!
//! # Architecture
//!
//! - [`Reconciler`] is the entry point: create / resize / disable /
//!   enable / destroy / converge operations over groups persisted in a
//!   [`flotilla_state::StateStore`].
//! - [`fleet::Fleet`] is the provisioning strategy, chosen once per
//!   group: `Discrete` launches instances one by one, `Pooled` delegates
//!   sizing to a provider-managed instance pool.
//! - [`PoolConvergence`] is the bounded polling loop that reconciles
//!   observed pool membership against the desired size, resolving
//!   private IPs and driving the backend synchronizer on changes.
//! - [`backend_sync`] diffs address sets and issues minimal, idempotent
//!   backend-set replacements.
//! - Every operation reports progress through an explicit
//!   [`TaskSink`]; production code wires [`TracingTask`].

pub mod backend_sync;
pub mod controller;
pub mod error;
pub mod fleet;
pub mod poller;
pub mod task;
pub mod work_request;

pub use controller::{Capacity, CreateServerGroup, Reconciler};
pub use error::{ReconcileError, ReconcileResult};
pub use poller::{PollConfig, PollState, PoolConvergence};
pub use task::{TaskSink, TracingTask};
