//! Project fixtures for adapter and fetch-run tests.

use std::path::PathBuf;

use tempfile::TempDir;

/// A project directory built from in-memory files.
#[derive(Debug, Clone, Default)]
pub struct ProjectFixture {
    /// Files (path relative to project root -> content).
    files: Vec<(PathBuf, String)>,
}

impl ProjectFixture {
    /// Create a new empty project fixture.
    pub fn new() -> Self {
        ProjectFixture::default()
    }

    /// Add a file; parent directories are created on build.
    pub fn file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }

    /// Write the project to a fresh temporary directory.
    pub fn build(&self) -> TempDir {
        let dir = TempDir::new().expect("failed to create temp dir");
        for (path, content) in &self.files {
            let full_path = dir.path().join(path);
            if let Some(parent) = full_path.parent() {
                std::fs::create_dir_all(parent).expect("failed to create parent dir");
            }
            std::fs::write(&full_path, content).expect("failed to write fixture file");
        }
        dir
    }
}

/// `requirements.txt` with one requirement per line.
pub fn requirements_txt(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// `package.json` declaring runtime dependencies.
pub fn package_json(name: &str, deps: &[(&str, &str)]) -> String {
    let deps: serde_json::Map<String, serde_json::Value> = deps
        .iter()
        .map(|(name, range)| (name.to_string(), serde_json::Value::from(*range)))
        .collect();
    let doc = serde_json::json!({
        "name": name,
        "version": "1.0.0",
        "dependencies": deps,
    });
    serde_json::to_string_pretty(&doc).expect("serializable package.json")
}

/// `.mise.toml` pinning one tool.
pub fn mise_toml(tool: &str, version: &str) -> String {
    format!("[tools]\n{} = \"{}\"\n", tool, version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_writes_nested_files() {
        let project = ProjectFixture::new()
            .file("requirements.txt", requirements_txt(&["requests>=2.0"]))
            .file("node_modules/left-pad/package.json", package_json("left-pad", &[]))
            .build();

        let reqs = std::fs::read_to_string(project.path().join("requirements.txt")).unwrap();
        assert_eq!(reqs, "requests>=2.0\n");
        assert!(project.path().join("node_modules/left-pad/package.json").is_file());
    }

    #[test]
    fn test_package_json_shape() {
        let doc: serde_json::Value =
            serde_json::from_str(&package_json("app", &[("chalk", "^5.0.0")])).unwrap();
        assert_eq!(doc["dependencies"]["chalk"], "^5.0.0");
    }
}
