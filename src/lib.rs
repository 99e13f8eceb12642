//! Batch archive-extraction engine.
//!
//! Recursively discovers compressed archives (single files, multi-part
//! `.partNN.rar`, suffix-numbered `.7z.001`/`.zip.001`) under a working
//! directory, tries passwords from a user-supplied list, extracts through an
//! external 7-Zip compatible tool, and cascades into archives produced by
//! extraction. Worker parallelism adapts to measured disk throughput, and
//! free space is reclaimed under pressure by evicting the sources of
//! already-extracted archives, oldest first.
//!
//! The engine performs no terminal or window I/O of its own. Hosts hand it a
//! [`host::StartRequest`] and a [`host::LogSink`] and receive a
//! [`host::RunSummary`]:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use exhume::config::EngineConfig;
//! use exhume::engine::Engine;
//! use exhume::host::{NullSink, StartRequest};
//!
//! let engine = Engine::new(EngineConfig::default(), Arc::new(NullSink))?;
//! let summary = engine.run(StartRequest::new("/data/dump").with_passwords(["hunter2"]));
//! println!("{} extracted, {} failed", summary.succeeded, summary.failed);
//! # Ok::<(), exhume::extractor::error::ExtractorError>(())
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod extractor;
pub mod finalize;
pub mod fs_utils;
pub mod host;
pub mod limiter;
pub mod scanner;
pub mod space;
pub mod state;
