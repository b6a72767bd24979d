use std::path::PathBuf;

use super::OrbitConfig;

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

impl OrbitConfig {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ORBIT_INTERPRETER") {
            if v.trim().is_empty() {
                tracing::warn!("ignoring empty ORBIT_INTERPRETER");
            } else {
                self.launcher.interpreter = v;
            }
        }
        if let Ok(v) = std::env::var("ORBIT_LAUNCHER_TIMEOUT") {
            if let Ok(secs) = v.parse::<u64>() {
                self.launcher.timeout = secs;
            } else {
                tracing::warn!("ignoring invalid ORBIT_LAUNCHER_TIMEOUT value: {v}");
            }
        }
        if let Ok(v) = std::env::var("ORBIT_LAUNCHER_RETRY") {
            if let Ok(enabled) = v.parse::<bool>() {
                self.launcher.retry_on_failure = enabled;
            } else {
                tracing::warn!("ignoring invalid ORBIT_LAUNCHER_RETRY value: {v}");
            }
        }
        if let Ok(v) = std::env::var("ORBIT_LAUNCHER_MAX_RETRIES") {
            if let Ok(n) = v.parse::<u32>() {
                self.launcher.max_retries = n;
            } else {
                tracing::warn!("ignoring invalid ORBIT_LAUNCHER_MAX_RETRIES value: {v}");
            }
        }
        if let Ok(v) = std::env::var("ORBIT_SHIELD_PROTECTED_PATHS") {
            self.shield.protected_paths = split_list(&v);
        }
        if let Ok(v) = std::env::var("ORBIT_CATALOG_PATHS") {
            self.catalog.paths = split_list(&v).into_iter().map(PathBuf::from).collect();
        }
    }
}
