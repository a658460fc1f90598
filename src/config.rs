/// Maximum accepted article title length, in characters
pub const MAX_TITLE_CHARS: usize = 200;

/// Default bound on the shared page queue (records, not bytes)
pub const DEFAULT_QUEUE_DEPTH: usize = 5000;

/// Default number of pages per store commit
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of concurrent extraction workers
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Progress update interval (tick every N pages)
pub const PROGRESS_INTERVAL: u64 = 1000;
