//! Rendering of fatal errors for the terminal.
//!
//! ```text
//! error[ref_fetch::discover::manifest_not_found]: no dependency manifest found for `pip`
//!   --> /work/app
//!    = looked for: requirements.txt, pyproject.toml
//! help: Run ref-fetch from the project root, or pass the project path explicitly
//! ```

use std::fmt::{self, Write as _};
use std::path::PathBuf;

/// Fix-it hints shared by several errors.
pub mod suggestions {
    pub const NO_MANIFEST: &str =
        "Run ref-fetch from the project root, or pass the project path explicitly";

    pub const UNSUPPORTED_ECOSYSTEM: &str = "Supported ecosystems are: pip, npm, swift";

    pub const NETWORK: &str = "Check your network connection and re-run; completed entries are kept";

    /// No repository could be located.
    pub const ADD_OVERRIDE: &str =
        "Add an entry under [overrides.<ecosystem>] in .ref-fetch.toml pointing at the repository";

    /// A repository exists but no tag matches.
    pub const TAG_PATTERNS: &str =
        "Add a matching pattern to [locator] tag_patterns, or set allow_default_branch = true";

    pub const CACHE_CLEAN: &str = "Run `ref-fetch cache clean` to remove the damaged entry";
}

/// An error headline with the path it concerns, supporting notes and hints.
#[derive(Debug, Clone, Default)]
pub struct Diagnostic {
    pub headline: String,
    pub code: Option<String>,
    pub location: Option<PathBuf>,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

impl Diagnostic {
    pub fn error(headline: impl Into<String>) -> Self {
        Diagnostic {
            headline: headline.into(),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// A `= note` line under the headline.
    pub fn with_context(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, hint: impl Into<String>) -> Self {
        self.help.push(hint.into());
        self
    }

    /// Render for stderr, with ANSI colors when `color` is set.
    pub fn render(&self, color: bool) -> String {
        let paint = |text: &str, ansi: &str| {
            if color {
                format!("{}{}\x1b[0m", ansi, text)
            } else {
                text.to_string()
            }
        };

        let mut out = String::new();
        let label = match &self.code {
            Some(code) => format!("error[{}]", code),
            None => "error".to_string(),
        };
        let _ = writeln!(out, "{}: {}", paint(&label, "\x1b[1;31m"), self.headline);

        if let Some(path) = &self.location {
            let _ = writeln!(out, "  {} {}", paint("-->", "\x1b[1;34m"), path.display());
        }
        for note in &self.notes {
            let _ = writeln!(out, "   = {}", note);
        }
        for hint in &self.help {
            let _ = writeln!(out, "{}: {}", paint("help", "\x1b[1;32m"), hint);
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.render(color));
}
