//! Error quadrics
//!
//! A quadric is a symmetric 4x4 matrix encoding the sum of squared
//! distances to a set of planes. Quadrics are additive: the quadric of a
//! merged vertex is the sum of the quadrics it subsumes, and the addition
//! is associative and commutative, which keeps parallel accumulation
//! deterministic.

use decimesh_core::{Point3d, TriangleMesh, Vector3d};
use nalgebra::{Matrix4, Vector4};
use rayon::prelude::*;
use std::ops::{Add, AddAssign};

/// Determinant threshold below which the 3x3 system is treated as singular
const SINGULAR_EPS: f64 = 1e-12;

/// Accumulated squared-plane-distance error for a vertex or cluster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric(Matrix4<f64>);

impl Quadric {
    /// The zero quadric (no accumulated error)
    pub fn zero() -> Self {
        Quadric(Matrix4::zeros())
    }

    /// Quadric of a single plane `n . p + d = 0` with unit normal `n`,
    /// as the outer product of the homogeneous plane vector with itself
    pub fn from_plane(normal: &Vector3d, d: f64) -> Self {
        let p = Vector4::new(normal.x, normal.y, normal.z, d);
        Quadric(p * p.transpose())
    }

    /// Quadric of the plane spanned by a triangle. Zero-area triangles
    /// contribute the zero quadric.
    pub fn from_triangle(a: &Point3d, b: &Point3d, c: &Point3d) -> Self {
        let n = (b - a).cross(&(c - a));
        let len = n.norm();
        if len <= f64::EPSILON {
            return Quadric::zero();
        }
        let n = n / len;
        Quadric::from_plane(&n, -n.dot(&a.coords))
    }

    /// Evaluate the quadratic form at a position, clamped at zero
    /// (the matrix is positive-semidefinite by construction, so negative
    /// values can only come from floating-point noise)
    pub fn error_at(&self, p: &Point3d) -> f64 {
        let v = Vector4::new(p.x, p.y, p.z, 1.0);
        (v.transpose() * self.0 * v)[0].max(0.0)
    }

    /// Position minimizing the quadratic form, with its error.
    ///
    /// Solves the 3x3 system formed by the upper-left block. When the
    /// system is singular (near-planar configuration) or the solution is
    /// not finite, falls back to whichever of `candidates` evaluates to the
    /// lowest error. Callers pass the merge endpoints, their midpoint, a
    /// cluster centroid, or similar as candidates.
    pub fn minimize(&self, candidates: &[Point3d]) -> (Point3d, f64) {
        let a = self.0.fixed_view::<3, 3>(0, 0).into_owned();
        if a.determinant().abs() > SINGULAR_EPS {
            if let Some(inv) = a.try_inverse() {
                let b = self.0.fixed_view::<3, 1>(0, 3).into_owned();
                let p = -inv * b;
                if p.iter().all(|x| x.is_finite()) {
                    let p = Point3d::new(p.x, p.y, p.z);
                    return (p, self.error_at(&p));
                }
            }
        }

        let mut best = (Point3d::origin(), f64::INFINITY);
        for c in candidates {
            let err = self.error_at(c);
            if err < best.1 {
                best = (*c, err);
            }
        }
        best
    }
}

impl Default for Quadric {
    fn default() -> Self {
        Quadric::zero()
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(self, other: Quadric) -> Quadric {
        Quadric(self.0 + other.0)
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, other: Quadric) {
        self.0 += other.0;
    }
}

/// Per-face plane quadrics, computed in parallel over disjoint face ranges
pub fn face_quadrics(mesh: &TriangleMesh) -> Vec<Quadric> {
    mesh.faces
        .par_iter()
        .map(|f| {
            Quadric::from_triangle(
                &mesh.vertices[f[0]],
                &mesh.vertices[f[1]],
                &mesh.vertices[f[2]],
            )
        })
        .collect()
}

/// Per-vertex quadrics: each vertex accumulates the plane quadrics of its
/// incident faces. The per-face quadrics are computed in parallel; the
/// scatter into vertices is sequential, so the result is deterministic.
pub fn vertex_quadrics(mesh: &TriangleMesh) -> Vec<Quadric> {
    let per_face = face_quadrics(mesh);
    let mut quadrics = vec![Quadric::zero(); mesh.vertices.len()];
    for (face, q) in mesh.faces.iter().zip(&per_face) {
        for &vi in face {
            quadrics[vi] += *q;
        }
    }
    quadrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_quadrics() -> Vec<Quadric> {
        // A varied set of planes, unit-normalized
        let planes = [
            (Vector3d::new(1.0, 0.0, 0.0), -0.5),
            (Vector3d::new(0.0, 1.0, 0.0), 2.0),
            (Vector3d::new(0.0, 0.0, 1.0), 0.25),
            (Vector3d::new(0.6, 0.8, 0.0), -1.5),
            (Vector3d::new(0.0, -0.8, 0.6), 3.0),
            (Vector3d::new(-0.48, 0.6, 0.64), 0.125),
        ];
        planes
            .iter()
            .map(|(n, d)| Quadric::from_plane(n, *d))
            .collect()
    }

    #[test]
    fn test_combine_associative_and_commutative() {
        let qs = sample_quadrics();
        let at = Point3d::new(0.3, -1.2, 2.7);
        for a in &qs {
            for b in &qs {
                for c in &qs {
                    let left = (*a + *b) + *c;
                    let right = *a + (*b + *c);
                    let swapped = *c + (*b + *a);
                    assert_relative_eq!(
                        left.error_at(&at),
                        right.error_at(&at),
                        max_relative = 1e-12
                    );
                    assert_relative_eq!(
                        left.error_at(&at),
                        swapped.error_at(&at),
                        max_relative = 1e-12
                    );
                }
            }
        }
    }

    #[test]
    fn test_plane_error_is_squared_distance() {
        let q = Quadric::from_plane(&Vector3d::new(0.0, 0.0, 1.0), -1.0);
        assert_relative_eq!(q.error_at(&Point3d::new(5.0, -3.0, 1.0)), 0.0);
        assert_relative_eq!(q.error_at(&Point3d::new(0.0, 0.0, 3.0)), 4.0);
    }

    #[test]
    fn test_triangle_quadric_vanishes_on_plane() {
        let a = Point3d::new(0.0, 0.0, 1.0);
        let b = Point3d::new(1.0, 0.0, 1.0);
        let c = Point3d::new(0.0, 1.0, 1.0);
        let q = Quadric::from_triangle(&a, &b, &c);
        assert_relative_eq!(q.error_at(&Point3d::new(7.0, -2.0, 1.0)), 0.0);
        assert!(q.error_at(&Point3d::new(0.0, 0.0, 2.0)) > 0.9);
    }

    #[test]
    fn test_degenerate_triangle_contributes_nothing() {
        let a = Point3d::new(0.0, 0.0, 0.0);
        let b = Point3d::new(1.0, 0.0, 0.0);
        let q = Quadric::from_triangle(&a, &b, &a);
        assert_eq!(q, Quadric::zero());
    }

    #[test]
    fn test_minimize_well_conditioned() {
        // Three orthogonal planes intersect at (1, 2, 3)
        let q = Quadric::from_plane(&Vector3d::new(1.0, 0.0, 0.0), -1.0)
            + Quadric::from_plane(&Vector3d::new(0.0, 1.0, 0.0), -2.0)
            + Quadric::from_plane(&Vector3d::new(0.0, 0.0, 1.0), -3.0);
        let (p, err) = q.minimize(&[Point3d::origin()]);
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-9);
        assert_relative_eq!(p.z, 3.0, epsilon = 1e-9);
        assert!(err < 1e-9);
    }

    #[test]
    fn test_minimize_singular_falls_back_to_best_candidate() {
        // A single plane: the system is singular, every on-plane point is
        // optimal, so the fallback must pick the candidate with lower error
        let q = Quadric::from_plane(&Vector3d::new(0.0, 0.0, 1.0), 0.0);
        let on_plane = Point3d::new(4.0, 4.0, 0.0);
        let off_plane = Point3d::new(0.0, 0.0, 2.0);
        let (p, err) = q.minimize(&[off_plane, on_plane]);
        assert_eq!(p, on_plane);
        assert_relative_eq!(err, 0.0);
    }

    #[test]
    fn test_vertex_quadrics_accumulate_incident_faces() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(0.0, 1.0, 0.0),
                Point3d::new(1.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [1, 3, 2]],
        );
        let qs = vertex_quadrics(&mesh);
        assert_eq!(qs.len(), 4);
        // All faces lie in z = 0: every vertex quadric vanishes on the plane
        for q in &qs {
            assert_relative_eq!(q.error_at(&Point3d::new(0.3, 0.9, 0.0)), 0.0);
        }
        // ... and penalizes leaving it
        assert!(qs[1].error_at(&Point3d::new(0.3, 0.9, 1.0)) > 1.0);
    }
}
