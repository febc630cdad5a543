pub mod loader;
pub mod types;

pub use loader::{apply_env_overrides, load_config, parse_config, parse_duration, ConfigError};
pub use types::{ContactFieldConfig, ContentRepoConfig, RapidProConfig, SyncConfig, WarehouseConfig};
