/// Dependency Ticker: a background thread that keeps the Python
/// dependency snapshot (the list served by `list_python_dependencies`)
/// fresh, both on a fixed interval and on demand via `refresh_now`.
///
/// Grounded on the teacher's old cleanup-thread pattern (a detached
/// `std::thread` looping on a sleep, coordinated with the rest of the
/// service through a shared `Mutex`) generalized from "sweep temp dirs"
/// to "reconcile installed packages against the configured requirement
/// list".
use crate::config::SandboxConfig;
use crate::types::{DependencyEntry, DependencySnapshot, Result, SandboxError};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Shared, published view of the last-known dependency state. Readers
/// never block on the installation work itself.
#[derive(Clone)]
pub struct DependencyTicker {
    config: Arc<SandboxConfig>,
    snapshot: Arc<Mutex<DependencySnapshot>>,
    stop: Arc<AtomicBool>,
}

impl DependencyTicker {
    pub fn new(config: Arc<SandboxConfig>) -> Self {
        Self {
            config,
            snapshot: Arc::new(Mutex::new(DependencySnapshot::default())),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the background loop. Returns immediately; the loop runs
    /// for the lifetime of the process unless `stop` is called.
    pub fn spawn(&self) {
        let ticker = self.clone();
        thread::spawn(move || {
            ticker.refresh_now();
            let interval = ticker.config.python.deps_update_interval;
            while !ticker.stop.load(Ordering::Relaxed) {
                thread::sleep(interval.min(Duration::from_secs(3600)));
                if ticker.stop.load(Ordering::Relaxed) {
                    break;
                }
                ticker.refresh_now();
            }
        });
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Reconciles installed packages against the configured requirement
    /// list right now, blocking the calling thread. Used both by the
    /// periodic loop and by the `refresh_python_dependencies` tool.
    pub fn refresh_now(&self) -> DependencySnapshot {
        let snapshot = query_installed(&self.config.python.path).unwrap_or_else(|e| {
            log::warn!("failed to refresh python dependency snapshot: {}", e);
            DependencySnapshot::default()
        });
        *self.snapshot.lock().unwrap() = snapshot.clone();
        snapshot
    }

    pub fn current(&self) -> DependencySnapshot {
        self.snapshot.lock().unwrap().clone()
    }

    /// Installs or upgrades every package named in `requirements` via
    /// pip, then refreshes the snapshot. Used by
    /// `update_python_dependencies`.
    pub fn update(&self, requirements: &[String]) -> Result<DependencySnapshot> {
        if requirements.is_empty() {
            return Ok(self.current());
        }
        let status = Command::new(&self.config.python.path)
            .args(["-m", "pip", "install", "--quiet", "--upgrade"])
            .args(requirements)
            .status()
            .map_err(|e| SandboxError::SpawnFailed(format!("pip install: {}", e)))?;
        if !status.success() {
            return Err(SandboxError::SpawnFailed(format!(
                "pip install exited with {:?}",
                status.code()
            )));
        }
        Ok(self.refresh_now())
    }
}

fn query_installed(python_path: &str) -> Result<DependencySnapshot> {
    let output = Command::new(python_path)
        .args(["-m", "pip", "list", "--format=freeze"])
        .output()
        .map_err(|e| SandboxError::SpawnFailed(format!("pip list: {}", e)))?;

    if !output.status.success() {
        return Err(SandboxError::SpawnFailed(format!(
            "pip list exited with {:?}",
            output.status.code()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let dependencies = text
        .lines()
        .filter_map(parse_freeze_line)
        .collect();

    Ok(DependencySnapshot { dependencies })
}

fn parse_freeze_line(line: &str) -> Option<DependencyEntry> {
    let (name, version) = line.split_once("==")?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some(DependencyEntry {
        name: name.to_string(),
        version: version.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pip_freeze_lines() {
        assert!(parse_freeze_line("numpy==1.26.0").is_some());
        let entry = parse_freeze_line("numpy==1.26.0").unwrap();
        assert_eq!(entry.name, "numpy");
        assert_eq!(entry.version, "1.26.0");
    }

    #[test]
    fn ignores_malformed_freeze_lines() {
        assert!(parse_freeze_line("# editable install").is_none());
        assert!(parse_freeze_line("").is_none());
    }

    #[test]
    fn update_with_no_requirements_is_a_no_op() {
        let config = Arc::new(SandboxConfig::default());
        let ticker = DependencyTicker::new(config);
        let snapshot = ticker.update(&[]).unwrap();
        assert!(snapshot.dependencies.is_empty());
    }
}
