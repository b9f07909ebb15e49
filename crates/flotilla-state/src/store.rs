//! StateStore — redb-backed persistence for server groups.
//!
//! Server groups are JSON-serialized into redb's `&[u8]` value column
//! under `{account}/{name}` keys. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::SERVER_GROUPS;
use crate::types::{table_key, ServerGroup};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SERVER_GROUPS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or update a server group record.
    pub fn upsert_server_group(&self, group: &ServerGroup) -> StateResult<()> {
        let key = group.table_key();
        let value = serde_json::to_vec(group).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SERVER_GROUPS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "server group stored");
        Ok(())
    }

    /// Get a server group by account and name.
    pub fn get_server_group(&self, account: &str, name: &str) -> StateResult<Option<ServerGroup>> {
        let key = table_key(account, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVER_GROUPS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let group: ServerGroup =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(group))
            }
            None => Ok(None),
        }
    }

    /// List all server groups of an account (key prefix scan).
    pub fn list_server_groups(&self, account: &str) -> StateResult<Vec<ServerGroup>> {
        let prefix = format!("{account}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVER_GROUPS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let group: ServerGroup =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(group);
            }
        }
        Ok(results)
    }

    /// List the group names of an account.
    pub fn list_server_group_names(&self, account: &str) -> StateResult<Vec<String>> {
        let prefix = format!("{account}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVER_GROUPS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            if let Some(name) = key.value().strip_prefix(&prefix) {
                results.push(name.to_string());
            }
        }
        Ok(results)
    }

    /// Delete a server group. Returns true if it existed.
    pub fn delete_server_group(&self, account: &str, name: &str) -> StateResult<bool> {
        let key = table_key(account, name);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(SERVER_GROUPS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "server group deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_group(account: &str, name: &str) -> ServerGroup {
        let mut launch_config = HashMap::new();
        launch_config.insert("imageId".to_string(), "ocid.image.1".into());
        launch_config.insert("shape".to_string(), "VM.Standard2.1".into());
        launch_config.insert("compartmentId".to_string(), "ocid.compartment.1".into());
        ServerGroup {
            name: name.to_string(),
            account: account.to_string(),
            region: "us-phoenix-1".to_string(),
            zone: "AD-1".to_string(),
            launch_config,
            target_size: 3,
            instances: Vec::new(),
            disabled: false,
            load_balancer_id: None,
            backend_set_name: None,
            instance_pool_id: None,
            instance_configuration_id: None,
            placements: Vec::new(),
        }
    }

    #[test]
    fn group_upsert_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let group = test_group("prod", "web-v001");

        store.upsert_server_group(&group).unwrap();
        let retrieved = store.get_server_group("prod", "web-v001").unwrap();

        assert_eq!(retrieved, Some(group));
    }

    #[test]
    fn group_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        let result = store.get_server_group("prod", "nothing").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn group_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let mut group = test_group("prod", "web-v001");
        store.upsert_server_group(&group).unwrap();

        group.target_size = 5;
        group.disabled = true;
        store.upsert_server_group(&group).unwrap();

        let retrieved = store.get_server_group("prod", "web-v001").unwrap().unwrap();
        assert_eq!(retrieved.target_size, 5);
        assert!(retrieved.disabled);
    }

    #[test]
    fn group_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.upsert_server_group(&test_group("prod", "web-v001")).unwrap();

        assert!(store.delete_server_group("prod", "web-v001").unwrap());
        assert!(!store.delete_server_group("prod", "web-v001").unwrap());
        assert!(store.get_server_group("prod", "web-v001").unwrap().is_none());
    }

    #[test]
    fn list_is_scoped_to_account() {
        let store = StateStore::open_in_memory().unwrap();
        store.upsert_server_group(&test_group("prod", "web-v001")).unwrap();
        store.upsert_server_group(&test_group("prod", "web-v002")).unwrap();
        store.upsert_server_group(&test_group("staging", "web-v001")).unwrap();

        let prod = store.list_server_groups("prod").unwrap();
        assert_eq!(prod.len(), 2);
        assert!(prod.iter().all(|g| g.account == "prod"));

        let names = store.list_server_group_names("prod").unwrap();
        assert_eq!(names, vec!["web-v001".to_string(), "web-v002".to_string()]);

        let staging = store.list_server_group_names("staging").unwrap();
        assert_eq!(staging, vec!["web-v001".to_string()]);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_server_groups("any").unwrap().is_empty());
        assert!(store.list_server_group_names("any").unwrap().is_empty());
        assert!(!store.delete_server_group("any", "nope").unwrap());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.upsert_server_group(&test_group("prod", "api-v003")).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let group = store.get_server_group("prod", "api-v003").unwrap();
        assert!(group.is_some());
        assert_eq!(group.unwrap().name, "api-v003");
    }
}
