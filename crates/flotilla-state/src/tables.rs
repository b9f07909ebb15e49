//! redb table definitions.

use redb::TableDefinition;

/// Server groups, keyed by `{account}/{name}`, JSON values.
pub const SERVER_GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("server_groups");
