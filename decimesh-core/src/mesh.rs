//! Surface mesh data structures
//!
//! `TriangleMesh` is the exchange structure consumed and produced by the
//! decimators. `PolygonMesh` is the polygonal ingestion form that readers
//! build; it must be triangulated before decimation.

use crate::error::{Error, Result};
use crate::{Point3d, Vector3d};
use serde::{Deserialize, Serialize};

/// A triangle mesh with vertices, faces and optional per-vertex attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3d>,
    pub faces: Vec<[usize; 3]>,
    /// Optional per-vertex scalar field, interpolated by the decimators
    pub scalars: Option<Vec<f64>>,
    /// Optional per-vertex normals, interpolated by the decimators
    pub normals: Option<Vec<Vector3d>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            scalars: None,
            normals: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3d>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            scalars: None,
            normals: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Set the per-vertex scalar field; ignored if the length does not match
    pub fn set_scalars(&mut self, scalars: Vec<f64>) {
        if scalars.len() == self.vertices.len() {
            self.scalars = Some(scalars);
        }
    }

    /// Set vertex normals; ignored if the length does not match
    pub fn set_normals(&mut self, normals: Vec<Vector3d>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Unnormalized face normal (cross product of two edges); its magnitude
    /// is twice the face area.
    pub fn face_normal(&self, face: &[usize; 3]) -> Vector3d {
        let v0 = self.vertices[face[0]];
        let v1 = self.vertices[face[1]];
        let v2 = self.vertices[face[2]];
        (v1 - v0).cross(&(v2 - v0))
    }

    /// Total surface area of the mesh
    pub fn surface_area(&self) -> f64 {
        self.faces
            .iter()
            .map(|f| 0.5 * self.face_normal(f).norm())
            .sum()
    }

    /// Axis-aligned bounding box as (min, max)
    pub fn bounding_box(&self) -> (Point3d, Point3d) {
        let mut min = Point3d::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Point3d::new(f64::MIN, f64::MIN, f64::MIN);
        for v in &self.vertices {
            for i in 0..3 {
                min[i] = min[i].min(v[i]);
                max[i] = max[i].max(v[i]);
            }
        }
        (min, max)
    }

    /// Combinatorial validity: non-empty, every face index in range, no face
    /// with duplicate indices.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::UnsupportedInput("mesh is empty".to_string()));
        }
        let nv = self.vertices.len();
        for (fi, face) in self.faces.iter().enumerate() {
            if face.iter().any(|&vi| vi >= nv) {
                return Err(Error::MalformedGeometry(format!(
                    "face {} references vertex out of range (vertex count {})",
                    fi, nv
                )));
            }
            if face[0] == face[1] || face[1] == face[2] || face[2] == face[0] {
                return Err(Error::MalformedGeometry(format!(
                    "face {} has duplicate vertex indices",
                    fi
                )));
            }
        }
        Ok(())
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// A polygonal surface mesh: faces may be triangles, quads or arbitrary n-gons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonMesh {
    pub vertices: Vec<Point3d>,
    pub faces: Vec<Vec<usize>>,
    pub scalars: Option<Vec<f64>>,
}

impl PolygonMesh {
    /// Create a polygonal mesh from vertices and index lists
    pub fn from_vertices_and_faces(vertices: Vec<Point3d>, faces: Vec<Vec<usize>>) -> Self {
        Self {
            vertices,
            faces,
            scalars: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Set the per-vertex scalar field; ignored if the length does not match
    pub fn set_scalars(&mut self, scalars: Vec<f64>) {
        if scalars.len() == self.vertices.len() {
            self.scalars = Some(scalars);
        }
    }

    /// Convert polygonal faces into triangles by fan triangulation.
    ///
    /// The result is guaranteed to contain only triangles; if a face cannot
    /// be triangulated (fewer than 3 distinct vertices, out-of-range indices,
    /// or an entirely zero-area polygon) the whole operation fails with
    /// [`Error::MalformedGeometry`] rather than emitting a partial result.
    pub fn triangulate(&self) -> Result<TriangleMesh> {
        if self.is_empty() {
            return Err(Error::UnsupportedInput(
                "cannot triangulate an empty mesh".to_string(),
            ));
        }
        let nv = self.vertices.len();
        let mut triangles: Vec<[usize; 3]> = Vec::with_capacity(self.faces.len());

        for (fi, poly) in self.faces.iter().enumerate() {
            if poly.len() < 3 {
                return Err(Error::MalformedGeometry(format!(
                    "face {} has fewer than 3 vertices",
                    fi
                )));
            }
            if poly.iter().any(|&vi| vi >= nv) {
                return Err(Error::MalformedGeometry(format!(
                    "face {} references vertex out of range (vertex count {})",
                    fi, nv
                )));
            }

            let mut polygon_area = 0.0;
            let mut fan = Vec::with_capacity(poly.len() - 2);
            for i in 1..poly.len() - 1 {
                let tri = [poly[0], poly[i], poly[i + 1]];
                if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
                    return Err(Error::MalformedGeometry(format!(
                        "face {} repeats a vertex and cannot be triangulated",
                        fi
                    )));
                }
                let area = 0.5
                    * (self.vertices[tri[1]] - self.vertices[tri[0]])
                        .cross(&(self.vertices[tri[2]] - self.vertices[tri[0]]))
                        .norm();
                polygon_area += area;
                fan.push(tri);
            }
            if polygon_area <= f64::EPSILON {
                return Err(Error::MalformedGeometry(format!(
                    "face {} is a zero-area polygon",
                    fi
                )));
            }
            triangles.extend(fan);
        }

        let mut mesh = TriangleMesh::from_vertices_and_faces(self.vertices.clone(), triangles);
        if let Some(scalars) = &self.scalars {
            mesh.set_scalars(scalars.clone());
        }
        Ok(mesh)
    }
}

impl From<TriangleMesh> for PolygonMesh {
    fn from(mesh: TriangleMesh) -> Self {
        Self {
            vertices: mesh.vertices,
            faces: mesh.faces.iter().map(|f| f.to_vec()).collect(),
            scalars: mesh.scalars,
        }
    }
}
