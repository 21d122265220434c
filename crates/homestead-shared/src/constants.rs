/// Application name
pub const APP_NAME: &str = "Homestead";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 4000;

/// Default SQLite database location, relative to the working directory
pub const DEFAULT_DATABASE_PATH: &str = "./data/homestead.db";

/// Maximum accepted JSON request body (1 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// How long a connection waits on SQLite's write lock before giving up
pub const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;
