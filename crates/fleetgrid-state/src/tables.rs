//! redb table definitions for the FleetGrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Application records keyed by `{tenant}/{application}`.
pub const APPLICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("applications");

/// Platform version status, a single record under [`VERSION_STATUS_KEY`].
pub const VERSION_STATUS: TableDefinition<&str, &[u8]> = TableDefinition::new("version_status");

/// Upgrade settings, one record per knob.
pub const SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

pub const VERSION_STATUS_KEY: &str = "current";

pub const UPGRADES_PER_MINUTE_KEY: &str = "upgrades_per_minute";
pub const TARGET_MAJOR_VERSION_KEY: &str = "target_major_version";
pub const CONFIDENCE_OVERRIDES_KEY: &str = "confidence_overrides";
