use crate::config::Config;
use crate::constants::{
    ACCEPTED_CONTENT_TYPE, ARCHIVE_DATA_PREFIX, DEFAULT_DATABASE_MAX_CONNECTIONS,
    DEFAULT_DATABASE_URL, DEFAULT_DEDUPE_WINDOW_SECS, DEFAULT_LOG_LEVEL, DEFAULT_MAX_WORKERS,
};

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            database_max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            max_workers: DEFAULT_MAX_WORKERS,

            accepted_content_type: ACCEPTED_CONTENT_TYPE.to_string(),
            archive_data_prefix: ARCHIVE_DATA_PREFIX.to_string(),

            dedupe_window_secs: DEFAULT_DEDUPE_WINDOW_SECS,
            archive_dedupe_window_secs: DEFAULT_DEDUPE_WINDOW_SECS,
            serialize_by_linking_hash: true,

            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_dir: None,
        }
    }
}
