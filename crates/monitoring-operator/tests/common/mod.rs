//! Shared utilities for monitoring-operator integration tests.
//!
//! This module provides:
//! - `TestHarness` for running reconcile iterations against an isolated
//!   in-memory platform
//! - `DownstreamOperators`, which turns delegated resources into the
//!   StatefulSets, pods and claims their operators would create
//! - Builders for configuration documents

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{DownstreamOperators, TestHarness, NAMESPACE, USER_WORKLOAD_NAMESPACE};
