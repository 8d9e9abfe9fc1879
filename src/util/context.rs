//! Global context for ref-fetch operations.
//!
//! Provides centralized access to the working directory, configuration
//! locations and the cache root. Nothing below the CLI reads these from
//! ambient process state; they are resolved here once and passed down.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};

use crate::util::config::{self, load_config, Config, CACHE_ENV};

/// Project directories for ref-fetch
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("", "", "ref-fetch"));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Directory holding the global config file
    config_dir: Option<PathBuf>,

    /// Cache root used when nothing overrides it
    default_cache_dir: PathBuf,

    /// Cache root from the environment, if set
    env_cache_dir: Option<PathBuf>,
}

impl GlobalContext {
    /// Create a new GlobalContext from the process environment.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;

        let config_dir = PROJECT_DIRS
            .as_ref()
            .map(|dirs| dirs.config_dir().to_path_buf());

        let default_cache_dir = if let Some(dirs) = PROJECT_DIRS.as_ref() {
            dirs.cache_dir().to_path_buf()
        } else {
            // Fallback to ~/.cache/ref-fetch
            BaseDirs::new()
                .map(|b| b.home_dir().join(".cache").join("ref-fetch"))
                .unwrap_or_else(|| PathBuf::from(".ref-fetch-cache"))
        };

        let env_cache_dir = std::env::var_os(CACHE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(GlobalContext {
            cwd,
            config_dir,
            default_cache_dir,
            env_cache_dir,
        })
    }

    /// Create a GlobalContext with explicit paths and no environment input.
    pub fn with_paths(cwd: PathBuf, config_dir: Option<PathBuf>, cache_dir: PathBuf) -> Self {
        GlobalContext {
            cwd,
            config_dir,
            default_cache_dir: cache_dir,
            env_cache_dir: None,
        }
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config_dir.as_ref().map(|dir| dir.join("config.toml"))
    }

    /// Resolve a project root argument against the working directory.
    pub fn project_root(&self, path: Option<&Path>) -> PathBuf {
        let path = match path {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => self.cwd.join(p),
            None => self.cwd.clone(),
        };
        crate::util::fs::normalize_path(&path)
    }

    /// Load the merged global and project configuration.
    pub fn load_config(&self, project_root: &Path) -> Result<Config> {
        let global = self.config_path();
        load_config(
            global.as_deref(),
            &config::project_config_path(project_root),
        )
    }

    /// Resolve the cache root.
    ///
    /// Order of precedence: explicit flag, `REF_FETCH_CACHE`, `[cache] root`,
    /// then the platform cache directory.
    pub fn cache_root(&self, config: &Config, flag: Option<&Path>) -> PathBuf {
        if let Some(dir) = flag {
            return self.absolutize(dir);
        }
        if let Some(dir) = &self.env_cache_dir {
            return self.absolutize(dir);
        }
        if let Some(dir) = &config.cache.root {
            return self.absolutize(dir);
        }
        self.default_cache_dir.clone()
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}
