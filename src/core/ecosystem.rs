//! Supported package ecosystems.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::FetchError;

/// A package-management system whose dependencies can be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    /// Python packages from PyPI
    Pip,
    /// JavaScript packages from the npm registry
    Npm,
    /// Swift packages resolved by SwiftPM
    Swift,
}

impl Ecosystem {
    /// All supported ecosystems.
    pub const ALL: [Ecosystem; 3] = [Ecosystem::Pip, Ecosystem::Npm, Ecosystem::Swift];

    /// Identifier used on the command line and in cache paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Pip => "pip",
            Ecosystem::Npm => "npm",
            Ecosystem::Swift => "swift",
        }
    }

    /// Normalize a package name so that equivalent spellings deduplicate.
    ///
    /// pip names are case-insensitive and treat runs of `-`, `_` and `.` as
    /// equal. SwiftPM identities are case-insensitive. npm names are exact.
    pub fn normalize_name(&self, name: &str) -> String {
        let name = name.trim();
        match self {
            Ecosystem::Pip => {
                let mut out = String::with_capacity(name.len());
                let mut last_sep = false;
                for c in name.chars() {
                    if matches!(c, '-' | '_' | '.') {
                        if !last_sep {
                            out.push('-');
                        }
                        last_sep = true;
                    } else {
                        out.extend(c.to_lowercase());
                        last_sep = false;
                    }
                }
                out
            }
            Ecosystem::Npm => name.to_string(),
            Ecosystem::Swift => name.to_lowercase(),
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pip" | "python" | "pypi" => Ok(Ecosystem::Pip),
            "npm" | "node" => Ok(Ecosystem::Npm),
            "swift" | "spm" => Ok(Ecosystem::Swift),
            _ => Err(FetchError::UnsupportedEcosystem(s.to_string())),
        }
    }
}
