//! Integration test suite for yamlet
//!
//! End-to-end tests that exercise the full load pipeline against real files
//! on disk: directive extraction, tag binding, blueprint resolution,
//! imports with sandboxing and cycle detection, caching, and live
//! reloading.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **caching**: idempotence and cache coherence across loads
//! - **imports**: `$imp` resolution, parameter merging, sandbox and cycles
//! - **live**: live reloading and debounced update batches
//! - **resolution**: multi-feature documents resolved end to end

mod common;

mod caching;
mod imports;
mod live;
