//! flotilla-state — embedded state store for the flotilla engine.
//!
//! Backed by [redb](https://docs.rs/redb), holds the durable record of
//! every server group the engine manages.
//!
//! # Architecture
//!
//! Server groups are JSON-serialized into redb's `&[u8]` value column
//! under composite `{account}/{name}` keys, so all groups of one account
//! sit in a contiguous key range and list operations are prefix scans.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
