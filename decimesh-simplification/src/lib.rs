//! Mesh decimation algorithms
//!
//! This crate provides the algorithmic core for reducing mesh complexity
//! while preserving geometric fidelity:
//! - Quadric error metrics shared by both decimators
//! - Priority-queue-driven edge-collapse decimation
//! - Spatial quadric-clustering decimation
//! - A driver that selects an algorithm, validates input and output, and
//!   reports statistics

pub mod clustering;
pub mod driver;
pub mod edge_collapse;
pub mod quadric;

pub use clustering::*;
pub use driver::*;
pub use edge_collapse::*;
pub use quadric::*;

use decimesh_core::{Result, TriangleMesh};

/// A mesh decimation strategy.
///
/// The set of strategies is closed and small: edge collapse and quadric
/// clustering. `target_reduction` is the fraction of faces to remove,
/// strictly between 0 and 1. Falling short of the target (no more legal
/// operations) is a normal outcome; the partial result is returned and the
/// shortfall is visible in the face counts.
pub trait Decimator {
    fn decimate(&self, mesh: &TriangleMesh, target_reduction: f64) -> Result<TriangleMesh>;
}
