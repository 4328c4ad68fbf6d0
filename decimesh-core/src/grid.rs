//! Unstructured volumetric grids and boundary-surface extraction
//!
//! A volumetric source supplies points plus cell-to-vertex connectivity;
//! [`UnstructuredGrid::extract_surface`] walks every cell and keeps only the
//! cell faces that are not shared by two cells, producing the polygonal
//! boundary surface that the decimators can consume after triangulation.

use crate::error::{Error, Result};
use crate::mesh::PolygonMesh;
use crate::Point3d;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A volumetric cell, identified by its vertex indices into the grid's
/// point table. Vertex orderings follow the usual unstructured-grid
/// conventions (tetrahedron; pyramid with quad base first; wedge with two
/// triangle caps; hexahedron with bottom quad then top quad).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    Tetrahedron([usize; 4]),
    Pyramid([usize; 5]),
    Wedge([usize; 6]),
    Hexahedron([usize; 8]),
}

impl Cell {
    /// The cell's vertex indices
    pub fn vertices(&self) -> &[usize] {
        match self {
            Cell::Tetrahedron(v) => v,
            Cell::Pyramid(v) => v,
            Cell::Wedge(v) => v,
            Cell::Hexahedron(v) => v,
        }
    }

    /// The cell's faces as lists of global vertex indices
    pub fn faces(&self) -> Vec<Vec<usize>> {
        const TETRA: [&[usize]; 4] = [&[0, 1, 3], &[1, 2, 3], &[2, 0, 3], &[0, 2, 1]];
        const PYRAMID: [&[usize]; 5] = [
            &[0, 3, 2, 1],
            &[0, 1, 4],
            &[1, 2, 4],
            &[2, 3, 4],
            &[3, 0, 4],
        ];
        const WEDGE: [&[usize]; 5] = [
            &[0, 1, 2],
            &[3, 5, 4],
            &[0, 3, 4, 1],
            &[1, 4, 5, 2],
            &[2, 5, 3, 0],
        ];
        const HEXA: [&[usize]; 6] = [
            &[0, 3, 2, 1],
            &[4, 5, 6, 7],
            &[0, 1, 5, 4],
            &[1, 2, 6, 5],
            &[2, 3, 7, 6],
            &[3, 0, 4, 7],
        ];
        let (verts, templates): (&[usize], &[&[usize]]) = match self {
            Cell::Tetrahedron(v) => (v, &TETRA),
            Cell::Pyramid(v) => (v, &PYRAMID),
            Cell::Wedge(v) => (v, &WEDGE),
            Cell::Hexahedron(v) => (v, &HEXA),
        };
        templates
            .iter()
            .map(|t| t.iter().map(|&i| verts[i]).collect())
            .collect()
    }
}

/// An unstructured volumetric mesh: points plus typed cells, with an
/// optional per-point scalar field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnstructuredGrid {
    pub points: Vec<Point3d>,
    pub cells: Vec<Cell>,
    pub scalars: Option<Vec<f64>>,
}

impl UnstructuredGrid {
    /// Create a grid from points and cells
    pub fn from_points_and_cells(points: Vec<Point3d>, cells: Vec<Cell>) -> Self {
        Self {
            points,
            cells,
            scalars: None,
        }
    }

    /// Get the number of points
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Get the number of cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Check if the grid is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() || self.cells.is_empty()
    }

    /// Set the per-point scalar field; ignored if the length does not match
    pub fn set_scalars(&mut self, scalars: Vec<f64>) {
        if scalars.len() == self.points.len() {
            self.scalars = Some(scalars);
        }
    }

    /// Extract the boundary surface of the grid.
    ///
    /// A cell face belongs to the boundary iff it is referenced by exactly
    /// one cell; interior faces (shared by two cells) are dropped. Faces are
    /// matched by their sorted vertex-index key and the orientation of the
    /// first occurrence is kept. The output vertex table is compacted to the
    /// points actually referenced by boundary faces, carrying the scalar
    /// field through.
    pub fn extract_surface(&self) -> Result<PolygonMesh> {
        if self.is_empty() {
            return Err(Error::UnsupportedInput(
                "cannot extract a surface from an empty grid".to_string(),
            ));
        }
        let np = self.points.len();
        for (ci, cell) in self.cells.iter().enumerate() {
            if cell.vertices().iter().any(|&vi| vi >= np) {
                return Err(Error::MalformedGeometry(format!(
                    "cell {} references point out of range (point count {})",
                    ci, np
                )));
            }
        }

        // First pass: count how many cells reference each face
        let mut counts: HashMap<Vec<usize>, usize> = HashMap::new();
        for cell in &self.cells {
            for face in cell.faces() {
                let mut key = face;
                key.sort_unstable();
                *counts.entry(key).or_insert(0) += 1;
            }
        }

        // Second pass: emit boundary faces in first-seen order, compacting
        // the vertex table as indices are encountered
        let mut old_to_new: HashMap<usize, usize> = HashMap::new();
        let mut vertices: Vec<Point3d> = Vec::new();
        let mut scalars: Option<Vec<f64>> = self.scalars.as_ref().map(|_| Vec::new());
        let mut faces: Vec<Vec<usize>> = Vec::new();

        for cell in &self.cells {
            for face in cell.faces() {
                let mut key = face.clone();
                key.sort_unstable();
                if counts[&key] != 1 {
                    continue;
                }
                let remapped = face
                    .iter()
                    .map(|&vi| {
                        *old_to_new.entry(vi).or_insert_with(|| {
                            vertices.push(self.points[vi]);
                            if let (Some(out), Some(src)) = (scalars.as_mut(), self.scalars.as_ref())
                            {
                                out.push(src[vi]);
                            }
                            vertices.len() - 1
                        })
                    })
                    .collect();
                faces.push(remapped);
            }
        }

        if faces.is_empty() {
            return Err(Error::MalformedGeometry(
                "grid has no boundary faces".to_string(),
            ));
        }

        let mut mesh = PolygonMesh::from_vertices_and_faces(vertices, faces);
        if let Some(scalars) = scalars {
            mesh.set_scalars(scalars);
        }
        Ok(mesh)
    }
}
