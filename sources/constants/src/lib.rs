/*!
  This crate contains constants shared across the configuration service crates
*/

// Shared API settings
pub const API_LISTEN_ADDR: &str = "127.0.0.1:9135";
pub const API_URL: &str = "http://127.0.0.1:9135";

/// Header carrying the caller identity established by the authenticating transport.
pub const IDENTITY_HEADER: &str = "X-Authenticated-Identity";

// Routes
pub const API_VERSION_URI: &str = "/version";
pub const API_DATA_URI: &str = "/data";
pub const API_DATA_IF_NEWER_URI: &str = "/data/if-newer";
pub const API_SLAVES_URI: &str = "/slaves";
pub const API_COMMIT_URI: &str = "/commit";
pub const API_WRITE_ENABLED_URI: &str = "/write-enabled";
pub const API_HISTORY_URI: &str = "/history";
pub const API_HISTORY_CONTENTS_URI: &str = "/history/contents";
pub const API_ROLLBACK_URI: &str = "/rollback";
pub const API_REFRESH_URI: &str = "/refresh";

// Shared file locations
pub const APISERVER_CONFIG_PATH: &str = "/etc/cfgservice/apiserver.toml";
pub const SYNCDOG_CONFIG_PATH: &str = "/etc/cfgservice/syncdog.toml";
pub const DATASTORE_PATH: &str = "/var/lib/cfgservice/datastore";

// Sync timing defaults, in seconds
pub const POLL_INTERVAL_SECS: u64 = 30;
pub const MIN_DELAY_SECS: u64 = 5;
pub const MAX_DELAY_SECS: u64 = 600;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
pub const PUBLISH_EVERY: u32 = 10;

/// Registry entries not heard from in this long are no longer listed.
pub const SLAVE_EXPIRY_SECS: u64 = 3600;
