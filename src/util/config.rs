//! Configuration file support for ref-fetch.
//!
//! ref-fetch reads two configuration files:
//! - Global: `<config dir>/ref-fetch/config.toml` - User-wide defaults
//! - Project: `<project>/.ref-fetch.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.
//!
//! ```toml
//! [cache]
//! root = "/var/cache/ref-fetch"
//! verify = true
//!
//! [net]
//! jobs = 8
//! timeout = 30
//!
//! [locator]
//! allow_default_branch = false
//! tag_patterns = ["v{version}", "{version}"]
//!
//! [locator.conventions]
//! pip = ["https://github.com/{name}/{name}"]
//!
//! [overrides.pip]
//! requests = "https://github.com/psf/requests"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the cache root.
pub const CACHE_ENV: &str = "REF_FETCH_CACHE";

/// Name of the project-level configuration file.
pub const PROJECT_CONFIG_FILE: &str = ".ref-fetch.toml";

/// Default PyPI base URL.
pub const DEFAULT_PYPI_URL: &str = "https://pypi.org";

/// Default npm registry base URL.
pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org";

/// Default per-request network timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default directory (relative to the project) that cached entries are exported into.
pub const DEFAULT_EXPORT_DIR: &str = "refs";

/// ref-fetch configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache settings
    pub cache: CacheConfig,

    /// Network settings
    pub net: NetConfig,

    /// Repository locator settings
    pub locator: LocatorConfig,

    /// Repository overrides, keyed by ecosystem then package name
    pub overrides: BTreeMap<String, BTreeMap<String, String>>,

    /// Export settings
    pub export: ExportConfig,

    /// Toolchain standard library settings
    pub toolchain: ToolchainConfig,
}

/// Cache-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory
    pub root: Option<PathBuf>,

    /// Re-hash cached content before trusting it
    pub verify: Option<bool>,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Offline mode (serve from the cache only)
    pub offline: bool,

    /// Per-request timeout in seconds
    pub timeout: Option<u64>,

    /// Whole-run timeout in seconds
    pub run_timeout: Option<u64>,

    /// Number of parallel fetch jobs (None = auto-detect)
    pub jobs: Option<usize>,

    /// User agent for registry requests
    pub user_agent: Option<String>,

    /// PyPI base URL
    pub pypi_url: Option<String>,

    /// npm registry base URL
    pub npm_registry: Option<String>,
}

/// Repository locator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Fall back to the default branch when no tag matches
    pub allow_default_branch: bool,

    /// Tag patterns tried before fuzzy matching (`{name}`, `{version}`)
    pub tag_patterns: Vec<String>,

    /// Convention URL templates per ecosystem (`{name}`, `{scope}`, `{bare}`)
    pub conventions: BTreeMap<String, Vec<String>>,
}

/// Export configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Copy cached entries into the project
    pub enabled: Option<bool>,

    /// Export directory, relative to the project root
    pub dir: Option<PathBuf>,
}

/// Toolchain standard library configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Fetch the toolchain's standard library alongside dependencies
    pub include: Option<bool>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration, treating a missing file as defaults.
    pub fn load_if_exists(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Cache settings
        if other.cache.root.is_some() {
            self.cache.root = other.cache.root;
        }
        if other.cache.verify.is_some() {
            self.cache.verify = other.cache.verify;
        }

        // Net settings
        if other.net.offline {
            self.net.offline = true;
        }
        if other.net.timeout.is_some() {
            self.net.timeout = other.net.timeout;
        }
        if other.net.run_timeout.is_some() {
            self.net.run_timeout = other.net.run_timeout;
        }
        if other.net.jobs.is_some() {
            self.net.jobs = other.net.jobs;
        }
        if other.net.user_agent.is_some() {
            self.net.user_agent = other.net.user_agent;
        }
        if other.net.pypi_url.is_some() {
            self.net.pypi_url = other.net.pypi_url;
        }
        if other.net.npm_registry.is_some() {
            self.net.npm_registry = other.net.npm_registry;
        }

        // Locator settings
        if other.locator.allow_default_branch {
            self.locator.allow_default_branch = true;
        }
        if !other.locator.tag_patterns.is_empty() {
            self.locator.tag_patterns = other.locator.tag_patterns;
        }
        for (ecosystem, templates) in other.locator.conventions {
            self.locator.conventions.insert(ecosystem, templates);
        }

        // Overrides merge per package
        for (ecosystem, packages) in other.overrides {
            self.overrides.entry(ecosystem).or_default().extend(packages);
        }

        // Export settings
        if other.export.enabled.is_some() {
            self.export.enabled = other.export.enabled;
        }
        if other.export.dir.is_some() {
            self.export.dir = other.export.dir;
        }

        // Toolchain settings
        if other.toolchain.include.is_some() {
            self.toolchain.include = other.toolchain.include;
        }
    }

    /// Repository override for a package, if configured.
    pub fn override_for(&self, ecosystem: &str, name: &str) -> Option<&str> {
        self.overrides
            .get(ecosystem)
            .and_then(|packages| packages.get(name))
            .map(String::as_str)
    }

    /// Whether cached content is re-hashed before being trusted.
    pub fn verify_cache(&self) -> bool {
        self.cache.verify.unwrap_or(true)
    }

    /// Per-request network timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.net.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Whole-run timeout, if configured.
    pub fn run_timeout(&self) -> Option<Duration> {
        self.net.run_timeout.map(Duration::from_secs)
    }

    /// PyPI base URL.
    pub fn pypi_url(&self) -> &str {
        self.net.pypi_url.as_deref().unwrap_or(DEFAULT_PYPI_URL)
    }

    /// npm registry base URL.
    pub fn npm_registry(&self) -> &str {
        self.net
            .npm_registry
            .as_deref()
            .unwrap_or(DEFAULT_NPM_REGISTRY)
    }

    /// User agent for HTTP requests.
    pub fn user_agent(&self) -> String {
        self.net
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("ref-fetch/{}", env!("CARGO_PKG_VERSION")))
    }

    /// Whether cached entries are exported into the project.
    pub fn export_enabled(&self) -> bool {
        self.export.enabled.unwrap_or(true)
    }

    /// Export directory, relative to the project root.
    pub fn export_dir(&self) -> PathBuf {
        self.export
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR))
    }

    /// Whether the toolchain standard library is fetched.
    pub fn include_toolchain(&self) -> bool {
        self.toolchain.include.unwrap_or(true)
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.ref-fetch.toml)
/// 2. Global config (<config dir>/ref-fetch/config.toml)
/// 3. Defaults
///
/// Missing files are skipped; unreadable or malformed files are errors.
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Result<Config> {
    let mut config = Config::default();

    // Load global config first
    if let Some(global_path) = global_path {
        config.merge(Config::load_if_exists(global_path)?);
    }

    // Project config overrides global
    config.merge(Config::load_if_exists(project_path)?);

    Ok(config)
}

/// Get the project config path (<project>/.ref-fetch.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.cache.root.is_none());
        assert!(config.verify_cache());
        assert!(config.export_enabled());
        assert!(config.include_toolchain());
        assert!(!config.net.offline);
        assert_eq!(config.pypi_url(), DEFAULT_PYPI_URL);
        assert_eq!(config.npm_registry(), DEFAULT_NPM_REGISTRY);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.export_dir(), PathBuf::from("refs"));
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[cache]
root = "/tmp/refs-cache"
verify = false

[net]
jobs = 8
timeout = 5

[locator]
allow_default_branch = true
tag_patterns = ["v{version}"]

[locator.conventions]
pip = ["https://github.com/{name}/{name}-py"]

[overrides.pip]
requests = "https://github.com/psf/requests"
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.cache.root, Some(PathBuf::from("/tmp/refs-cache")));
        assert!(!config.verify_cache());
        assert_eq!(config.net.jobs, Some(8));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(config.locator.allow_default_branch);
        assert_eq!(config.locator.tag_patterns, vec!["v{version}"]);
        assert_eq!(
            config.locator.conventions["pip"],
            vec!["https://github.com/{name}/{name}-py"]
        );
        assert_eq!(
            config.override_for("pip", "requests"),
            Some("https://github.com/psf/requests")
        );
        assert_eq!(config.override_for("npm", "requests"), None);
    }

    #[test]
    fn test_config_load_rejects_malformed() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[net\njobs = ").unwrap();

        assert!(Config::load(&config_path).is_err());
        assert!(load_config(None, &config_path).is_err());
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.net.jobs = Some(4);
        base.net.timeout = Some(10);
        base.overrides
            .entry("pip".to_string())
            .or_default()
            .insert("a".to_string(), "https://github.com/a/a".to_string());

        let mut override_cfg = Config::default();
        override_cfg.net.jobs = Some(2);
        override_cfg.export.enabled = Some(false);
        override_cfg
            .overrides
            .entry("pip".to_string())
            .or_default()
            .insert("b".to_string(), "https://github.com/b/b".to_string());

        base.merge(override_cfg);

        assert_eq!(base.net.jobs, Some(2));
        assert_eq!(base.net.timeout, Some(10)); // Not overridden
        assert!(!base.export_enabled());
        assert_eq!(base.override_for("pip", "a"), Some("https://github.com/a/a"));
        assert_eq!(base.override_for("pip", "b"), Some("https://github.com/b/b"));
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global_path = tmp.path().join("global.toml");
        let project_path = tmp.path().join(PROJECT_CONFIG_FILE);

        std::fs::write(
            &global_path,
            r#"
[net]
jobs = 2
timeout = 60

[export]
dir = "vendor-refs"
"#,
        )
        .unwrap();

        std::fs::write(
            &project_path,
            r#"
[net]
jobs = 16
"#,
        )
        .unwrap();

        let config = load_config(Some(&global_path), &project_path).unwrap();

        assert_eq!(config.net.jobs, Some(16));
        assert_eq!(config.net.timeout, Some(60));
        assert_eq!(config.export_dir(), PathBuf::from("vendor-refs"));
    }

    #[test]
    fn test_load_config_missing_files() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(
            Some(&tmp.path().join("missing.toml")),
            &project_config_path(tmp.path()),
        )
        .unwrap();
        assert_eq!(config, Config::default());
    }
}
