//! Config hot-reload watcher.
//!
//! Watches a `triad.toml` file for modifications and invokes a callback with
//! the freshly parsed [`ReloadableConfig`] after a debounce window.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;

use triad_core::{PoolConfig, TriadError, TriadResult};

/// Subset of the full Triad configuration that supports hot-reload.
///
/// Only the pool's scaling and heartbeat knobs can change at runtime; the
/// bind address, recall path, and engine wiring require a restart. Sections
/// are optional so a partial file (containing only the knobs the operator
/// wants to tweak) is accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct ReloadableConfig {
    /// Replacement pool section, applied in full when present.
    #[serde(default)]
    pub pool: Option<PoolConfig>,
}

/// Watches a config file on disk and calls back on every (debounced) change.
///
/// The watcher is kept alive as long as this struct is alive; dropping it
/// stops the background thread and releases the file-system watch.
pub struct ConfigWatcher {
    /// Stored to prevent the watcher from being dropped (which would stop
    /// watching the file).
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `config_path` for modifications.
    ///
    /// * `debounce_ms` -- minimum milliseconds between two successive reload
    ///   callbacks.  Use `500` as a sensible default.
    /// * `on_reload` -- called on a background thread each time the config
    ///   file is modified and successfully parsed.  Parse errors are logged
    ///   via `tracing::warn` and do **not** invoke the callback.
    pub fn start<F>(config_path: PathBuf, debounce_ms: u64, on_reload: F) -> TriadResult<Self>
    where
        F: Fn(ReloadableConfig) + Send + Sync + 'static,
    {
        let (tx, rx) = std_mpsc::channel();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Modify(_)) {
                        let _ = tx.send(());
                    }
                }
            })
            .map_err(|e| TriadError::Config(format!("Failed to create file watcher: {e}")))?;

        watcher
            .watch(config_path.as_ref(), RecursiveMode::NonRecursive)
            .map_err(|e| TriadError::Config(format!("Failed to watch config file: {e}")))?;

        let path = config_path.clone();
        std::thread::spawn(move || {
            let mut last_reload = std::time::Instant::now();
            let debounce = std::time::Duration::from_millis(debounce_ms);

            while rx.recv().is_ok() {
                // Drain any additional events that arrived during the debounce
                // window so we only reload once per burst of writes.
                while rx.try_recv().is_ok() {}

                let now = std::time::Instant::now();
                if now.duration_since(last_reload) < debounce {
                    std::thread::sleep(debounce - now.duration_since(last_reload));
                }

                last_reload = std::time::Instant::now();

                match parse_config(&path) {
                    Ok(config) => on_reload(config),
                    Err(e) => tracing::warn!(error = %e, "Failed to reload config"),
                }
            }

            tracing::debug!("Config watcher thread exiting");
        });

        tracing::info!(path = %config_path.display(), "Config hot-reload watcher started");

        Ok(Self { _watcher: watcher })
    }
}

/// Read and parse a TOML config file into a [`ReloadableConfig`].
pub fn parse_config(path: &Path) -> TriadResult<ReloadableConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TriadError::Config(format!("Failed to read config '{}': {}", path.display(), e))
    })?;
    let config: ReloadableConfig = toml::from_str(&content).map_err(|e| {
        TriadError::Config(format!(
            "Failed to parse config '{}': {}",
            path.display(),
            e
        ))
    })?;

    if let Some(pool) = &config.pool {
        if pool.min_workers == 0 || pool.max_workers < pool.min_workers {
            return Err(TriadError::Config(format!(
                "Invalid pool bounds in '{}': min {} max {}",
                path.display(),
                pool.min_workers,
                pool.max_workers
            )));
        }
    }
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_pool_section() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp.as_file_mut(),
            r#"
[pool]
min_workers = 4
max_workers = 16
heartbeat_grace_ms = 1000
"#
        )
        .unwrap();

        let config = parse_config(tmp.path()).unwrap();
        let pool = config.pool.unwrap();
        assert_eq!(pool.min_workers, 4);
        assert_eq!(pool.max_workers, 16);
        assert_eq!(pool.heartbeat_grace_ms, 1_000);
        // Omitted knobs keep their defaults.
        assert_eq!(pool.max_retries, 3);
    }

    #[test]
    fn test_parse_empty_config_has_no_pool() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp.as_file_mut()).unwrap();
        let config = parse_config(tmp.path()).unwrap();
        assert!(config.pool.is_none());
    }

    #[test]
    fn test_invalid_pool_bounds_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp.as_file_mut(),
            r#"
[pool]
min_workers = 8
max_workers = 2
"#
        )
        .unwrap();
        let result = parse_config(tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_invalid_toml_returns_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp.as_file_mut(), "{{{{invalid toml!!!!").unwrap();
        let result = parse_config(tmp.path());
        assert!(result.is_err());
        let err_msg = format!("{}", result.unwrap_err());
        assert!(
            err_msg.contains("Failed to parse config"),
            "unexpected error: {err_msg}"
        );
    }

    #[test]
    fn test_parse_nonexistent_file_returns_error() {
        let result = parse_config(Path::new("/nonexistent/path/triad.toml"));
        assert!(result.is_err());
    }
}
