//! Swift packages, from `Package.resolved`.

use std::path::Path;

use serde_json::Value;

use crate::core::{DependencyRequest, Ecosystem, FetchError, RequestOrigin};
use crate::ecosystems::{invalid, read_json, EcosystemAdapter};

const RESOLVED_FILE: &str = "Package.resolved";

pub struct SwiftAdapter;

impl EcosystemAdapter for SwiftAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Swift
    }

    fn manifest_files(&self) -> &'static [&'static str] {
        &[RESOLVED_FILE]
    }

    fn list_dependencies(&self, project_root: &Path) -> Result<Vec<DependencyRequest>, FetchError> {
        let path = project_root.join(RESOLVED_FILE);
        if !path.is_file() {
            return Err(self.not_found(project_root));
        }

        let doc = read_json(&path)?;
        let format = doc.get("version").and_then(Value::as_u64).unwrap_or(1);

        // v1 nests pins under `object` and uses different field names
        let (pins, name_field, url_field) = if format == 1 {
            (doc.get("object").and_then(|o| o.get("pins")), "package", "repositoryURL")
        } else {
            (doc.get("pins"), "identity", "location")
        };
        let pins = pins
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(&path, format!("no pins in Package.resolved version {}", format)))?;

        let mut requests = Vec::new();
        for pin in pins {
            let Some(name) = pin.get(name_field).and_then(Value::as_str) else {
                continue;
            };
            let state = pin.get("state");
            let version = state.and_then(|s| s.get("version")).and_then(Value::as_str);
            let revision = state.and_then(|s| s.get("revision")).and_then(Value::as_str);

            let constraint = match (version, revision) {
                (Some(v), _) => format!("={}", v),
                (None, Some(rev)) => format!("revision:{}", rev),
                (None, None) => {
                    tracing::debug!("skipping {} (no version or revision)", name);
                    continue;
                }
            };

            let mut request = DependencyRequest::new(name, constraint).with_origin(RequestOrigin::Lockfile);
            if let Some(url) = pin.get(url_field).and_then(Value::as_str) {
                request = request.with_repository(url);
            }
            requests.push(request);
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ProjectFixture;

    #[test]
    fn test_resolved_v2() {
        let project = ProjectFixture::new()
            .file(
                "Package.resolved",
                r#"{
                    "pins": [
                        {
                            "identity": "swift-argument-parser",
                            "kind": "remoteSourceControl",
                            "location": "https://github.com/apple/swift-argument-parser.git",
                            "state": { "revision": "c8ed701", "version": "1.3.0" }
                        },
                        {
                            "identity": "swift-nio",
                            "kind": "remoteSourceControl",
                            "location": "https://github.com/apple/swift-nio.git",
                            "state": { "branch": "main", "revision": "a1b2c3d" }
                        }
                    ],
                    "version": 2
                }"#,
            )
            .build();

        let deps = SwiftAdapter.list_dependencies(project.path()).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name(), "swift-argument-parser");
        assert_eq!(deps[0].constraint(), "=1.3.0");
        assert_eq!(
            deps[0].repository(),
            Some("https://github.com/apple/swift-argument-parser.git")
        );
        assert_eq!(deps[1].constraint(), "revision:a1b2c3d");
    }

    #[test]
    fn test_resolved_v1() {
        let project = ProjectFixture::new()
            .file(
                "Package.resolved",
                r#"{
                    "object": {
                        "pins": [
                            {
                                "package": "Alamofire",
                                "repositoryURL": "https://github.com/Alamofire/Alamofire.git",
                                "state": { "branch": null, "revision": "f82c23a", "version": "5.8.1" }
                            }
                        ]
                    },
                    "version": 1
                }"#,
            )
            .build();

        let deps = SwiftAdapter.list_dependencies(project.path()).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name(), "Alamofire");
        assert_eq!(deps[0].constraint(), "=5.8.1");
    }

    #[test]
    fn test_resolved_without_pins() {
        let project = ProjectFixture::new()
            .file("Package.resolved", r#"{ "version": 2 }"#)
            .build();
        let err = SwiftAdapter.list_dependencies(project.path()).unwrap_err();
        assert!(matches!(err, FetchError::ManifestInvalid { .. }));
    }
}
