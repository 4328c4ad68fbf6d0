//! Core data structures for decimesh
//!
//! This crate provides the mesh exchange types shared by the decimation
//! algorithms: triangle and polygonal surface meshes, unstructured volumetric
//! grids with boundary-surface extraction, and the common error type.

pub mod error;
pub mod grid;
pub mod mesh;

pub use error::*;
pub use grid::*;
pub use mesh::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};

/// Double-precision point, the vertex representation used throughout
pub type Point3d = Point3<f64>;
/// Double-precision vector
pub type Vector3d = Vector3<f64>;
