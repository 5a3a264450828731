// Worker constants (no magic values)
use std::time::Duration;

/// Sleep duration when no jobs are available (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after worker error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default maximum execution time per job (30s)
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default worker pool size
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Default interval between lease-recovery sweeps (30s)
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);
