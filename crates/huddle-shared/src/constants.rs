/// Application name
pub const APP_NAME: &str = "Huddle";

/// Content of the system note appended when a group finishes its last task
pub const TASK_ENDED_MESSAGE: &str = "Task is Ended!";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Default number of pooled SQLite connections
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Default depth of each realtime connection's outbound queue
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 256;

/// Seconds between heartbeat pings on a realtime connection
pub const DEFAULT_WS_PING_INTERVAL_SECS: u64 = 25;

/// Seconds of silence after which a realtime connection is dropped
pub const DEFAULT_WS_IDLE_TIMEOUT_SECS: u64 = 45;

/// Date format for task deadlines
pub const DEADLINE_FORMAT: &str = "%Y-%m-%d";
