//! ref-fetch - fetch the source code of a project's dependencies
//!
//! This crate provides the core library functionality for ref-fetch:
//! reading dependency manifests, resolving versions, locating upstream
//! repositories and keeping fetched sources in a content-addressed cache.

pub mod cache;
pub mod core;
pub mod ecosystems;
pub mod locator;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod util;

/// Test doubles for the network capabilities and project fixtures.
///
/// This module is only available when compiling with `--cfg test`.
#[cfg(test)]
pub mod test_support;

pub use cache::{CacheEntry, CacheKey, CacheStore};
pub use core::{
    DependencyRequest, Ecosystem, FetchError, FetchManifest, FetchOutcome, ResolvedDependency,
    SourceLocation,
};
pub use ops::{Capabilities, FetchOptions, FetchOrchestrator};
pub use util::context::GlobalContext;
