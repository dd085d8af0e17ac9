//! Ambient runtime setup shared by the CLI binaries: rayon thread-pool
//! sizing and logger initialization.

use log::{info, warn};
use rayon::ThreadPoolBuilder;
use std::sync::Once;

struct ThreadConfig {
    count: usize,
    source: String,
}

fn parse_env_threads(keys: &[&str]) -> Option<ThreadConfig> {
    for &key in keys {
        if let Ok(v) = std::env::var(key) {
            if let Ok(val) = v.parse::<usize>() {
                if val > 0 {
                    return Some(ThreadConfig {
                        count: val,
                        source: key.to_string(),
                    });
                }
            }
        }
    }
    None
}

fn detect_thread_config() -> ThreadConfig {
    const ENV_HINTS: [&str; 6] = [
        "HACOO_THREADS",
        "RAYON_NUM_THREADS",
        "SLURM_CPUS_PER_TASK",
        "SLURM_CPUS_ON_NODE",
        "PBS_NP",
        "OMP_NUM_THREADS",
    ];

    if let Some(cfg) = parse_env_threads(&ENV_HINTS) {
        return cfg;
    }

    let fallback = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1);

    ThreadConfig {
        count: fallback,
        source: "available_parallelism".to_string(),
    }
}

/// Builds the global rayon pool once per process, sized from
/// `HACOO_THREADS`/`RAYON_NUM_THREADS` or a scheduler hint, falling back to
/// `available_parallelism`.
pub fn configure_thread_pool() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let cfg = detect_thread_config();
        match ThreadPoolBuilder::new()
            .num_threads(cfg.count)
            .thread_name(|i| format!("hacoo-worker-{i}"))
            .build_global()
        {
            Ok(_) => {
                info!("rayon pool = {} threads (hint: {})", cfg.count, cfg.source);
            }
            Err(err) => {
                warn!("failed to configure rayon pool ({err}); continuing with default");
            }
        }
    });
}

/// Initializes `env_logger` once per process. Binaries call this before
/// touching [`configure_thread_pool`] so pool setup itself gets logged.
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    });
}

/// Returns the thread count [`configure_thread_pool`] would pick, without
/// building a pool. Used by CLI binaries that report their configuration.
pub fn resolve_thread_count() -> usize {
    detect_thread_config().count
}
