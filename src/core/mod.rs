//! Core data structures for ref-fetch.
//!
//! This module contains the foundational types used throughout the crate:
//! - Ecosystems and dependency requests
//! - Resolved versions and source locations
//! - The fetch error taxonomy and the run manifest

pub mod dependency;
pub mod ecosystem;
pub mod errors;
pub mod fetch_manifest;
pub mod source_location;

pub use dependency::{DependencyRequest, PinnedVersion, RequestOrigin, ResolvedDependency};
pub use ecosystem::Ecosystem;
pub use errors::{FetchError, Stage};
pub use fetch_manifest::{FetchManifest, FetchOutcome, ManifestEntry};
pub use source_location::{GitReference, SourceLocation};
