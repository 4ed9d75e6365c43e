// src/core/mod.rs

// The scan engine: job scheduling, the per-target pipeline and the
// adapters around the external recon tools.

/// Data structures shared across the engine and its callers.
pub mod models;

pub mod errors;

/// Resolves tool names to executable paths.
pub mod locator;

/// Runs one external tool with a timeout.
pub mod runner;

/// Owned temporary files passed between stages.
pub mod handoff;

/// Target address normalization.
pub mod targets;

/// Stage adapters around the external tools.
pub mod scanner;

/// Where stage results and target status end up.
pub mod store;

pub mod job;
pub mod pipeline;

/// Bounded job queue and admission loop.
pub mod scheduler;

#[cfg(all(test, unix))]
mod test_support;
