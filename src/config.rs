//! Configuration surface for the symbol index (spec §6).
//!
//! A layered configuration system: defaults → TOML file → environment
//! variables. Environment variables are prefixed `SI_` and use a double
//! underscore to separate nested levels, e.g. `SI_WORKER_COUNT=8`,
//! `SI_TIMEOUTS__WORKER_TASK_SECS=30`.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Host-side racing mode; opaque to the core (spec §6).
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Standalone,
    #[default]
    Hybrid,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Root directory for the persisted index (spec §6, default `.smart-index`).
    #[serde(default = "default_cache_root")]
    pub cache_root: PathBuf,

    /// Version-control integration (branch-switch watcher), default on.
    #[serde(default = "default_true")]
    pub version_control: bool,

    /// Exclusion globs applied before any file is enqueued.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Files larger than this are skipped outright (bytes).
    #[serde(default = "default_max_indexed_file_size_bytes")]
    pub max_indexed_file_size_bytes: u64,

    /// Soft cap mirrored from the original JS host config (MB); informational.
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Maximum on-disk cache size before the store starts evicting (MB).
    #[serde(default = "default_max_cache_size_mb")]
    pub max_cache_size_mb: u64,

    /// Worker pool size; default `cpus - 1`, minimum 1.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Host-side full-text search toggle; opaque to the core, which never
    /// reads it (mirrors `mode`/`hybrid_timeout_ms` below).
    #[serde(default = "default_false")]
    pub text_indexing: bool,

    /// Optional path to a pre-built static index; off by default.
    #[serde(default)]
    pub static_index_path: Option<PathBuf>,

    /// Host-side racing mode; opaque to the core.
    #[serde(default)]
    pub mode: Mode,

    /// Hybrid timeout in ms; opaque to the core.
    #[serde(default = "default_hybrid_timeout_ms")]
    pub hybrid_timeout_ms: u64,

    /// Suspension-point timeouts/windows (spec §5).
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Timeouts {
    #[serde(default = "default_worker_task_secs")]
    pub worker_task_secs: u64,
    #[serde(default = "default_finalization_write_secs")]
    pub finalization_write_secs: u64,
    #[serde(default = "default_write_coalescing_ms")]
    pub write_coalescing_ms: u64,
    #[serde(default = "default_editor_debounce_ms")]
    pub editor_debounce_ms: u64,
    #[serde(default = "default_fs_debounce_ms")]
    pub fs_debounce_ms: u64,
    #[serde(default = "default_write_finish_stabilization_ms")]
    pub write_finish_stabilization_ms: u64,
    #[serde(default = "default_fs_poll_ms")]
    pub fs_poll_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            worker_task_secs: default_worker_task_secs(),
            finalization_write_secs: default_finalization_write_secs(),
            write_coalescing_ms: default_write_coalescing_ms(),
            editor_debounce_ms: default_editor_debounce_ms(),
            fs_debounce_ms: default_fs_debounce_ms(),
            write_finish_stabilization_ms: default_write_finish_stabilization_ms(),
            fs_poll_ms: default_fs_poll_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: std::collections::HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: std::collections::HashMap::new(),
        }
    }
}

fn default_cache_root() -> PathBuf {
    PathBuf::from(".smart-index")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_exclude() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/dist/**".to_string(),
        "**/build/**".to_string(),
        "**/.git/**".to_string(),
        "**/coverage/**".to_string(),
        "**/.next/**".to_string(),
        "**/.nuxt/**".to_string(),
    ]
}
fn default_max_indexed_file_size_bytes() -> u64 {
    1024 * 1024
}
fn default_max_file_size_mb() -> u64 {
    50
}
fn default_max_cache_size_mb() -> u64 {
    500
}
fn default_worker_count() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}
fn default_hybrid_timeout_ms() -> u64 {
    100
}
fn default_worker_task_secs() -> u64 {
    60
}
fn default_finalization_write_secs() -> u64 {
    5
}
fn default_write_coalescing_ms() -> u64 {
    100
}
fn default_editor_debounce_ms() -> u64 {
    500
}
fn default_fs_debounce_ms() -> u64 {
    600
}
fn default_write_finish_stabilization_ms() -> u64 {
    300
}
fn default_fs_poll_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            version_control: default_true(),
            exclude: default_exclude(),
            max_indexed_file_size_bytes: default_max_indexed_file_size_bytes(),
            max_file_size_mb: default_max_file_size_mb(),
            max_cache_size_mb: default_max_cache_size_mb(),
            worker_count: default_worker_count(),
            text_indexing: default_false(),
            static_index_path: None,
            mode: Mode::default(),
            hybrid_timeout_ms: default_hybrid_timeout_ms(),
            timeouts: Timeouts::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Default config file location under the current workspace.
    fn default_config_path() -> PathBuf {
        PathBuf::from(".smart-index/settings.toml")
    }

    /// Load layered configuration: defaults → TOML → `SI_`-prefixed env vars.
    pub fn load() -> Result<Self, figment::Error> {
        let config_path = Self::find_workspace_config().unwrap_or_else(Self::default_config_path);
        Self::load_from(config_path)
    }

    /// Load from a specific TOML file, still layering defaults and env vars.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SI_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }

    /// Walk up from the current directory looking for `.smart-index/`.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            let dir = ancestor.join(".smart-index");
            if dir.is_dir() {
                return Some(dir.join("settings.toml"));
            }
        }
        None
    }

    /// The workspace root (the directory containing `.smart-index/`), if any.
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        for ancestor in current.ancestors() {
            if ancestor.join(".smart-index").is_dir() {
                return Some(ancestor.to_path_buf());
            }
        }
        None
    }

    /// Persist this configuration to a TOML file, creating parent dirs.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Write a default config file at `.smart-index/settings.toml`.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = Self::default_config_path();
        if !force && config_path.exists() {
            return Err("configuration file already exists; use --force to overwrite".into());
        }
        Settings::default().save(&config_path)?;
        Ok(config_path)
    }

    /// Returns true if `relative_path` matches any configured exclusion glob.
    pub fn is_excluded(&self, relative_path: &std::path::Path) -> bool {
        let path_str = relative_path.to_string_lossy().replace('\\', "/");
        self.exclude.iter().any(|pattern| {
            glob::Pattern::new(pattern)
                .map(|p| p.matches(&path_str))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.cache_root, PathBuf::from(".smart-index"));
        assert!(settings.worker_count >= 1);
        assert_eq!(settings.timeouts.worker_task_secs, 60);
        assert_eq!(settings.timeouts.finalization_write_secs, 5);
        assert!(!settings.text_indexing);
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(
            &config_path,
            r#"
worker_count = 4
text_indexing = true

[timeouts]
worker_task_secs = 30
"#,
        )
        .unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.worker_count, 4);
        assert!(settings.text_indexing);
        assert_eq!(settings.timeouts.worker_task_secs, 30);
        // untouched defaults remain
        assert_eq!(settings.timeouts.finalization_write_secs, 5);
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let mut settings = Settings::default();
        settings.worker_count = 2;
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.worker_count, 2);
    }

    #[test]
    fn exclusion_globs_match_node_modules() {
        let settings = Settings::default();
        assert!(settings.is_excluded(std::path::Path::new("pkg/node_modules/foo/index.js")));
        assert!(!settings.is_excluded(std::path::Path::new("src/index.ts")));
    }
}
