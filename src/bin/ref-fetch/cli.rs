//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell as CompletionShell;

/// ref-fetch - fetch the exact upstream source of a project's dependencies
#[derive(Parser)]
#[command(name = "ref-fetch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, visible_alias = "debug")]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, value_enum, default_value_t = ColorArg::Auto)]
    pub color: ColorArg,

    /// Output format for messages
    #[arg(long, global = true, value_enum, default_value_t = MessageFormat::Human)]
    pub message_format: MessageFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorArg {
    Auto,
    Always,
    Never,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MessageFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the source of every dependency of a project
    Fetch(FetchArgs),

    /// Inspect and maintain the source cache
    Cache(CacheArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct FetchArgs {
    /// Ecosystem: pip, npm or swift
    pub ecosystem: String,

    /// Project directory (defaults to current directory)
    pub path: Option<PathBuf>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Cache directory (overrides REF_FETCH_CACHE and configuration)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Serve from the cache only; never touch the network
    #[arg(long)]
    pub offline: bool,

    /// Do not copy fetched sources into the project
    #[arg(long)]
    pub no_export: bool,

    /// Export directory, relative to the project
    #[arg(long, conflicts_with = "no_export")]
    pub export_dir: Option<PathBuf>,

    /// Skip the pinned toolchain's standard library
    #[arg(long)]
    pub no_stdlib: bool,

    /// Give up on unfinished dependencies after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Write the fetch manifest as JSON to this file
    #[arg(long)]
    pub manifest_out: Option<PathBuf>,

    /// Fall back to a repository's default branch when no tag matches
    #[arg(long)]
    pub allow_default_branch: bool,

    /// Re-fetch dependencies that are already cached
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct CacheArgs {
    /// Cache directory (overrides REF_FETCH_CACHE and configuration)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List cached entries
    List(CacheSelection),

    /// Show cache directory path
    Path,

    /// Show cache size
    Size(CacheSelection),

    /// Re-hash cached entries and report corruption
    Verify(CacheVerifyArgs),

    /// Remove cached entries
    Clean(CacheSelection),
}

/// Narrows a cache command to some entries.
#[derive(Args)]
pub struct CacheSelection {
    /// Only this ecosystem
    pub ecosystem: Option<String>,

    /// Only this package
    pub name: Option<String>,

    /// Only this version
    pub version: Option<String>,
}

#[derive(Args)]
pub struct CacheVerifyArgs {
    #[command(flatten)]
    pub selection: CacheSelection,

    /// Remove corrupted entries
    #[arg(long)]
    pub repair: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: CompletionShell,
}
