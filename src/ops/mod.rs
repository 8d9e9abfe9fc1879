//! High-level operations.
//!
//! This module contains the implementation of ref-fetch commands.

pub mod cache;
pub mod export;
pub mod fetch;

pub use cache::{cache_usage, format_size, list_entries, verify_entries, CacheUsage, VerifyReport};
pub use export::export_entries;
pub use fetch::{Capabilities, FetchOptions, FetchOrchestrator, FetchReporter, NoopReporter};
