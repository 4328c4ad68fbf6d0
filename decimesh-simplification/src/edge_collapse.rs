//! Quadric-error edge-collapse decimation
//!
//! Greedy simplification driven by a min-priority queue of collapse
//! candidates. Vertices and faces live in an index arena with tombstone
//! flags so indices held by the queue stay stable; stale queue entries are
//! discarded on pop by comparing per-vertex version stamps (lazy deletion).

use crate::quadric::{vertex_quadrics, Quadric};
use crate::Decimator;
use decimesh_core::{Error, Point3d, Result, TriangleMesh, Vector3d};
use log::debug;
use priority_queue::PriorityQueue;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Edge-collapse mesh decimator ("DecimatePro"-style).
///
/// Collapse order is driven purely by quadric error cost, with ties broken
/// by the lowest vertex index pair, so runs are reproducible.
pub struct EdgeCollapseDecimator {
    /// Reject collapses that would locally change the mesh's connectivity
    /// (link condition violations, duplicate faces)
    pub preserve_topology: bool,
    /// Protect the mesh's open silhouette: boundary-boundary edges are
    /// never collapsed and a boundary vertex never leaves its position
    pub preserve_boundary: bool,
    /// Multiplier (>= 1) applied to the cost of collapses involving a
    /// boundary vertex when `preserve_boundary` is set
    pub boundary_weight: f64,
    /// Maximum allowed deviation (radians) of any adjacent face normal;
    /// collapses that rotate a face further are rejected
    pub max_normal_deviation: f64,
}

impl Default for EdgeCollapseDecimator {
    fn default() -> Self {
        Self {
            preserve_topology: true,
            preserve_boundary: true,
            boundary_weight: 100.0,
            max_normal_deviation: std::f64::consts::FRAC_PI_2,
        }
    }
}

impl EdgeCollapseDecimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan a collapse of the edge (u, v): placement and cost, or `None`
    /// if the edge is not collapsible under the configured policy.
    fn plan(&self, arena: &CollapseArena, u: usize, v: usize) -> Option<Candidate> {
        let (a, b) = if u < v { (u, v) } else { (v, u) };
        if !arena.valid[a] || !arena.valid[b] {
            return None;
        }
        if arena.protected_edges.contains(&(a, b)) {
            return None;
        }
        let on_boundary = (arena.boundary[a], arena.boundary[b]);
        if self.preserve_boundary && on_boundary.0 && on_boundary.1 {
            return None;
        }

        let combined = arena.quadrics[a] + arena.quadrics[b];
        let (position, error) = if self.preserve_boundary && (on_boundary.0 || on_boundary.1) {
            // Pin the merged vertex to the boundary endpoint so boundary
            // positions in the output are a subset of the input's
            let pin = if on_boundary.0 {
                arena.positions[a]
            } else {
                arena.positions[b]
            };
            (pin, combined.error_at(&pin))
        } else {
            let mid = Point3d::from((arena.positions[a].coords + arena.positions[b].coords) * 0.5);
            combined.minimize(&[mid, arena.positions[a], arena.positions[b]])
        };

        let mut cost = error;
        if self.preserve_boundary && (on_boundary.0 || on_boundary.1) {
            cost *= self.boundary_weight;
        }

        Some(Candidate {
            a,
            b,
            version_a: arena.version[a],
            version_b: arena.version[b],
            position,
            cost,
        })
    }
}

impl Decimator for EdgeCollapseDecimator {
    fn decimate(&self, mesh: &TriangleMesh, target_reduction: f64) -> Result<TriangleMesh> {
        if !(target_reduction > 0.0 && target_reduction < 1.0) {
            return Err(Error::InvalidParameter(format!(
                "target_reduction must be in (0, 1), got {}",
                target_reduction
            )));
        }
        if self.boundary_weight < 1.0 {
            return Err(Error::InvalidParameter(format!(
                "boundary_weight must be >= 1, got {}",
                self.boundary_weight
            )));
        }
        mesh.validate()?;

        let mut arena = CollapseArena::from_mesh(mesh);
        let original_faces = arena.alive_faces;
        let to_remove = (target_reduction * original_faces as f64).ceil() as usize;
        let target_alive = original_faces.saturating_sub(to_remove);
        let min_dot = self.max_normal_deviation.cos();

        let mut queue: PriorityQueue<usize, Candidate> = PriorityQueue::new();
        let mut next_entry = 0usize;
        for (a, b) in arena.edges() {
            if let Some(cand) = self.plan(&arena, a, b) {
                queue.push(next_entry, cand);
                next_entry += 1;
            }
        }

        while arena.alive_faces > target_alive {
            let Some((_, cand)) = queue.pop() else { break };
            let (a, b) = (cand.a, cand.b);

            // Lazy deletion: drop entries whose endpoints changed since queuing
            if !arena.valid[a] || !arena.valid[b] {
                continue;
            }
            if arena.version[a] != cand.version_a || arena.version[b] != cand.version_b {
                continue;
            }

            let shared = arena.shared_faces(a, b);
            // Edge no longer exists, or is (or became) non-manifold
            if shared.is_empty() || shared.len() > 2 {
                continue;
            }
            // Unconditional, unlike the link condition: no collapse may
            // push an edge past two incident faces
            if arena.creates_nonmanifold_edge(a, b) {
                continue;
            }
            if self.preserve_topology
                && (!arena.link_condition_ok(a, b, shared.len())
                    || arena.creates_duplicate_face(a, b))
            {
                continue;
            }
            if !arena.normals_stable(a, b, &cand.position, min_dot) {
                continue;
            }

            arena.collapse(a, b, cand.position);

            // Only the survivor's quadric changed: re-cost its incident edges
            for n in arena.neighbors_sorted(a) {
                if let Some(cand) = self.plan(&arena, a, n) {
                    queue.push(next_entry, cand);
                    next_entry += 1;
                }
            }
        }

        if arena.alive_faces > target_alive {
            debug!(
                "collapse queue exhausted with {} faces alive (target {})",
                arena.alive_faces, target_alive
            );
        }

        Ok(arena.into_mesh())
    }
}

// ============================================================
// Collapse candidate (priority queue entry)
// ============================================================

#[derive(Debug, Clone)]
struct Candidate {
    a: usize,
    b: usize,
    version_a: u32,
    version_b: u32,
    position: Point3d,
    cost: f64,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal
            && (self.a, self.b) == (other.a, other.b)
    }
}
impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-priority queue: cheapest collapse ranks highest, ties broken
        // by lowest vertex index pair for reproducibility
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| (other.a, other.b).cmp(&(self.a, self.b)))
    }
}

// ============================================================
// Index arena
// ============================================================

struct CollapseArena {
    positions: Vec<Point3d>,
    scalars: Option<Vec<f64>>,
    normals: Option<Vec<Vector3d>>,
    quadrics: Vec<Quadric>,
    /// Tombstone flags: false once a vertex has been merged away
    valid: Vec<bool>,
    /// Bumped whenever a vertex's quadric or neighborhood changes
    version: Vec<u32>,
    /// Fixed at load time from edge multiplicities
    boundary: Vec<bool>,
    faces: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    /// Vertex -> incident faces; may contain dead entries, filtered on read
    vertex_faces: Vec<Vec<usize>>,
    alive_faces: usize,
    /// Edges referenced by more than two faces in the input; never collapsed
    protected_edges: HashSet<(usize, usize)>,
}

fn edge_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

impl CollapseArena {
    fn from_mesh(mesh: &TriangleMesh) -> Self {
        let nv = mesh.vertices.len();
        let mut vertex_faces = vec![Vec::new(); nv];
        let mut edge_faces: HashMap<(usize, usize), usize> = HashMap::new();
        for (fi, face) in mesh.faces.iter().enumerate() {
            for &vi in face {
                vertex_faces[vi].push(fi);
            }
            for (u, v) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                *edge_faces.entry(edge_key(u, v)).or_insert(0) += 1;
            }
        }

        let mut boundary = vec![false; nv];
        let mut protected_edges = HashSet::new();
        for (&(u, v), &count) in &edge_faces {
            if count == 1 {
                boundary[u] = true;
                boundary[v] = true;
            } else if count > 2 {
                protected_edges.insert((u, v));
            }
        }

        CollapseArena {
            positions: mesh.vertices.clone(),
            scalars: mesh.scalars.clone(),
            normals: mesh.normals.clone(),
            quadrics: vertex_quadrics(mesh),
            valid: vec![true; nv],
            version: vec![0; nv],
            boundary,
            faces: mesh.faces.clone(),
            face_alive: vec![true; mesh.faces.len()],
            vertex_faces,
            alive_faces: mesh.faces.len(),
            protected_edges,
        }
    }

    /// All alive edges, each once, in ascending key order
    fn edges(&self) -> Vec<(usize, usize)> {
        let mut set = HashSet::new();
        for (fi, face) in self.faces.iter().enumerate() {
            if !self.face_alive[fi] {
                continue;
            }
            for (u, v) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                set.insert(edge_key(u, v));
            }
        }
        let mut edges: Vec<_> = set.into_iter().collect();
        edges.sort_unstable();
        edges
    }

    /// Alive faces referencing both endpoints
    fn shared_faces(&self, a: usize, b: usize) -> Vec<usize> {
        self.vertex_faces[a]
            .iter()
            .copied()
            .filter(|&f| self.face_alive[f] && self.faces[f].contains(&b))
            .collect()
    }

    fn neighbors(&self, v: usize) -> HashSet<usize> {
        let mut out = HashSet::new();
        for &f in &self.vertex_faces[v] {
            if !self.face_alive[f] {
                continue;
            }
            for &vi in &self.faces[f] {
                if vi != v {
                    out.insert(vi);
                }
            }
        }
        out
    }

    fn neighbors_sorted(&self, v: usize) -> Vec<usize> {
        let mut out: Vec<_> = self.neighbors(v).into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Link condition: the common neighbors of the endpoints must be
    /// exactly the face apices opposite the edge (2 interior, 1 boundary)
    fn link_condition_ok(&self, a: usize, b: usize, shared_count: usize) -> bool {
        let na = self.neighbors(a);
        let nb = self.neighbors(b);
        let common = na.intersection(&nb).filter(|&&v| v != a && v != b).count();
        common == shared_count
    }

    /// Would merging b into a push an edge past two incident faces? Edges
    /// (a, n) and (b, n) fuse on collapse; faces deleted by the collapse
    /// stop counting. An edge that was already non-manifold at either
    /// endpoint may move with the survivor unchanged; only an increase in
    /// multiplicity rejects the collapse.
    fn creates_nonmanifold_edge(&self, a: usize, b: usize) -> bool {
        let mut post: HashMap<usize, usize> = HashMap::new();
        let mut pre_a: HashMap<usize, usize> = HashMap::new();
        let mut pre_b: HashMap<usize, usize> = HashMap::new();
        for &(v, other) in &[(a, b), (b, a)] {
            for &f in &self.vertex_faces[v] {
                if !self.face_alive[f] {
                    continue;
                }
                let face = self.faces[f];
                let dies = face.contains(&other);
                for &n in &face {
                    if n == a || n == b {
                        continue;
                    }
                    let pre = if v == a { &mut pre_a } else { &mut pre_b };
                    *pre.entry(n).or_insert(0) += 1;
                    if !dies {
                        *post.entry(n).or_insert(0) += 1;
                    }
                }
            }
        }
        post.iter().any(|(n, &count)| {
            let was = pre_a
                .get(n)
                .copied()
                .unwrap_or(0)
                .max(pre_b.get(n).copied().unwrap_or(0));
            count > 2 && count > was
        })
    }

    /// Would merging b into a produce two alive faces over the same vertex
    /// set (a fold-over onto an existing face)?
    fn creates_duplicate_face(&self, a: usize, b: usize) -> bool {
        let mut existing: HashSet<[usize; 3]> = HashSet::new();
        for &f in &self.vertex_faces[a] {
            if !self.face_alive[f] || self.faces[f].contains(&b) {
                continue;
            }
            let mut key = self.faces[f];
            key.sort_unstable();
            existing.insert(key);
        }
        for &f in &self.vertex_faces[b] {
            if !self.face_alive[f] || self.faces[f].contains(&a) {
                continue;
            }
            let mut key = self.faces[f].map(|vi| if vi == b { a } else { vi });
            key.sort_unstable();
            if existing.contains(&key) {
                return true;
            }
        }
        false
    }

    /// Check that no surviving face adjacent to either endpoint rotates
    /// beyond the deviation threshold (or degenerates) when the endpoints
    /// move to `new_pos`
    fn normals_stable(&self, a: usize, b: usize, new_pos: &Point3d, min_dot: f64) -> bool {
        for &(v, other) in &[(a, b), (b, a)] {
            for &f in &self.vertex_faces[v] {
                if !self.face_alive[f] {
                    continue;
                }
                let face = self.faces[f];
                if face.contains(&other) {
                    // Deleted by the collapse itself
                    continue;
                }
                let moved =
                    |vi: usize| if vi == v { *new_pos } else { self.positions[vi] };
                let old_n = (self.positions[face[1]] - self.positions[face[0]])
                    .cross(&(self.positions[face[2]] - self.positions[face[0]]));
                let new_n =
                    (moved(face[1]) - moved(face[0])).cross(&(moved(face[2]) - moved(face[0])));
                let (ol, nl) = (old_n.norm(), new_n.norm());
                if nl <= f64::EPSILON {
                    return false;
                }
                if ol <= f64::EPSILON {
                    continue;
                }
                if old_n.dot(&new_n) / (ol * nl) < min_dot {
                    return false;
                }
            }
        }
        true
    }

    /// Merge b into a at `new_pos`. Callers have already vetted the collapse.
    fn collapse(&mut self, a: usize, b: usize, new_pos: Point3d) {
        for f in self.shared_faces(a, b) {
            self.face_alive[f] = false;
            self.alive_faces -= 1;
        }

        // Redirect b's surviving faces to a
        let b_faces = std::mem::take(&mut self.vertex_faces[b]);
        for &f in &b_faces {
            if !self.face_alive[f] {
                continue;
            }
            for slot in self.faces[f].iter_mut() {
                if *slot == b {
                    *slot = a;
                }
            }
            let face = self.faces[f];
            if face[0] == face[1] || face[1] == face[2] || face[2] == face[0] {
                self.face_alive[f] = false;
                self.alive_faces -= 1;
                continue;
            }
            self.vertex_faces[a].push(f);
        }

        // Prune dead entries from the survivor's incidence list
        let a_faces = std::mem::take(&mut self.vertex_faces[a]);
        self.vertex_faces[a] = a_faces
            .into_iter()
            .filter(|&f| self.face_alive[f])
            .collect();

        // Protected edges at b now run through a
        let inherited: Vec<(usize, usize)> = self
            .protected_edges
            .iter()
            .filter(|&&(u, v)| u == b || v == b)
            .copied()
            .collect();
        for (u, v) in inherited {
            self.protected_edges.remove(&(u, v));
            let n = if u == b { v } else { u };
            if n != a {
                self.protected_edges.insert(edge_key(a, n));
            }
        }

        self.positions[a] = new_pos;
        let qb = self.quadrics[b];
        self.quadrics[a] += qb;
        self.boundary[a] = self.boundary[a] || self.boundary[b];

        if let Some(scalars) = self.scalars.as_mut() {
            scalars[a] = 0.5 * (scalars[a] + scalars[b]);
        }
        if let Some(normals) = self.normals.as_mut() {
            let avg = normals[a] + normals[b];
            let len = avg.norm();
            if len > 1e-12 {
                normals[a] = avg / len;
            }
        }

        self.valid[b] = false;
        self.version[a] += 1;
        self.version[b] += 1;
    }

    /// Compact alive faces and referenced vertices into a fresh mesh
    fn into_mesh(self) -> TriangleMesh {
        let mut old_to_new = vec![usize::MAX; self.positions.len()];
        let mut vertices = Vec::new();
        let mut scalars: Option<Vec<f64>> = self.scalars.as_ref().map(|_| Vec::new());
        let mut normals: Option<Vec<Vector3d>> = self.normals.as_ref().map(|_| Vec::new());
        let mut faces = Vec::with_capacity(self.alive_faces);

        for (fi, face) in self.faces.iter().enumerate() {
            if !self.face_alive[fi] {
                continue;
            }
            let mut remapped = [0usize; 3];
            for (slot, &vi) in remapped.iter_mut().zip(face) {
                if old_to_new[vi] == usize::MAX {
                    old_to_new[vi] = vertices.len();
                    vertices.push(self.positions[vi]);
                    if let (Some(out), Some(src)) = (scalars.as_mut(), self.scalars.as_ref()) {
                        out.push(src[vi]);
                    }
                    if let (Some(out), Some(src)) = (normals.as_mut(), self.normals.as_ref()) {
                        out.push(src[vi]);
                    }
                }
                *slot = old_to_new[vi];
            }
            faces.push(remapped);
        }

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        if let Some(scalars) = scalars {
            mesh.set_scalars(scalars);
        }
        if let Some(normals) = normals {
            mesh.set_normals(normals);
        }
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn make_tetrahedron() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(0.5, 1.0, 0.0),
                Point3d::new(0.5, 0.5, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    fn make_plane_grid(size: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        for y in 0..size {
            for x in 0..size {
                vertices.push(Point3d::new(x as f64, y as f64, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..(size - 1) {
            for x in 0..(size - 1) {
                let tl = y * size + x;
                let tr = tl + 1;
                let bl = (y + 1) * size + x;
                let br = bl + 1;
                faces.push([tl, bl, tr]);
                faces.push([tr, bl, br]);
            }
        }
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    /// Unit icosphere: icosahedron subdivided once and projected onto the
    /// unit sphere (42 vertices, 80 triangles)
    fn make_icosphere() -> TriangleMesh {
        let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
        let mut vertices: Vec<Point3d> = [
            (-1.0, phi, 0.0),
            (1.0, phi, 0.0),
            (-1.0, -phi, 0.0),
            (1.0, -phi, 0.0),
            (0.0, -1.0, phi),
            (0.0, 1.0, phi),
            (0.0, -1.0, -phi),
            (0.0, 1.0, -phi),
            (phi, 0.0, -1.0),
            (phi, 0.0, 1.0),
            (-phi, 0.0, -1.0),
            (-phi, 0.0, 1.0),
        ]
        .iter()
        .map(|&(x, y, z)| {
            let v = Vector3d::new(x, y, z).normalize();
            Point3d::from(v)
        })
        .collect();

        let faces = [
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Point3d>| -> usize {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let m = (vertices[a].coords + vertices[b].coords).normalize();
                vertices.push(Point3d::from(m));
                vertices.len() - 1
            })
        };

        let mut subdivided = Vec::with_capacity(80);
        for [a, b, c] in faces {
            let ab = midpoint(a, b, &mut vertices);
            let bc = midpoint(b, c, &mut vertices);
            let ca = midpoint(c, a, &mut vertices);
            subdivided.push([a, ab, ca]);
            subdivided.push([b, bc, ab]);
            subdivided.push([c, ca, bc]);
            subdivided.push([ab, bc, ca]);
        }

        TriangleMesh::from_vertices_and_faces(vertices, subdivided)
    }

    /// Hemisphere with a single boundary loop of `segments` vertices at z = 0
    fn make_hemisphere(segments: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        let rings = [0.0_f64, std::f64::consts::FRAC_PI_6, std::f64::consts::FRAC_PI_3];
        for &phi in &rings {
            for i in 0..segments {
                let theta = i as f64 / segments as f64 * std::f64::consts::TAU;
                vertices.push(Point3d::new(
                    phi.cos() * theta.cos(),
                    phi.cos() * theta.sin(),
                    phi.sin(),
                ));
            }
        }
        let apex = vertices.len();
        vertices.push(Point3d::new(0.0, 0.0, 1.0));

        let mut faces = Vec::new();
        for r in 0..rings.len() - 1 {
            for i in 0..segments {
                let j = (i + 1) % segments;
                let (a, b) = (r * segments + i, r * segments + j);
                let (c, d) = ((r + 1) * segments + i, (r + 1) * segments + j);
                faces.push([a, b, d]);
                faces.push([a, d, c]);
            }
        }
        let top = (rings.len() - 1) * segments;
        for i in 0..segments {
            let j = (i + 1) % segments;
            faces.push([top + i, top + j, apex]);
        }
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    fn boundary_positions(mesh: &TriangleMesh) -> Vec<Point3d> {
        let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
        for face in &mesh.faces {
            for (u, v) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                *edge_count.entry(edge_key(u, v)).or_insert(0) += 1;
            }
        }
        let mut verts = HashSet::new();
        for (&(u, v), &count) in &edge_count {
            if count == 1 {
                verts.insert(u);
                verts.insert(v);
            }
        }
        verts.into_iter().map(|v| mesh.vertices[v]).collect()
    }

    fn position_key(p: &Point3d) -> (i64, i64, i64) {
        (
            (p.x * 1e9).round() as i64,
            (p.y * 1e9).round() as i64,
            (p.z * 1e9).round() as i64,
        )
    }

    #[test]
    fn test_invalid_target_reduction() {
        let d = EdgeCollapseDecimator::new();
        let mesh = make_tetrahedron();
        assert!(matches!(
            d.decimate(&mesh, 0.0),
            Err(Error::InvalidParameter(_))
        ));
        assert!(d.decimate(&mesh, 1.0).is_err());
        assert!(d.decimate(&mesh, -0.2).is_err());
        assert!(d.decimate(&mesh, 1.5).is_err());
    }

    #[test]
    fn test_invalid_boundary_weight() {
        let d = EdgeCollapseDecimator {
            boundary_weight: 0.5,
            ..Default::default()
        };
        assert!(matches!(
            d.decimate(&make_tetrahedron(), 0.5),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_empty_mesh() {
        let d = EdgeCollapseDecimator::new();
        let mesh = TriangleMesh::new();
        assert!(matches!(
            d.decimate(&mesh, 0.5),
            Err(Error::UnsupportedInput(_))
        ));
    }

    #[test]
    fn test_tetrahedron_is_already_minimal() {
        // Every collapse on a closed tetrahedron would fold two faces onto
        // each other; with topology preservation the queue is exhausted and
        // the mesh comes back unchanged
        let d = EdgeCollapseDecimator::new();
        let mesh = make_tetrahedron();
        for target in [0.1, 0.5, 0.9] {
            let result = d.decimate(&mesh, target).unwrap();
            assert_eq!(result.face_count(), 4);
            assert_eq!(result.vertex_count(), 4);
        }
    }

    #[test]
    fn test_face_count_never_increases() {
        let d = EdgeCollapseDecimator::new();
        for mesh in [make_tetrahedron(), make_plane_grid(6), make_icosphere()] {
            let result = d.decimate(&mesh, 0.5).unwrap();
            assert!(result.face_count() <= mesh.face_count());
            result.validate().unwrap();
        }
    }

    #[test]
    fn test_plane_grid_reduction() {
        let d = EdgeCollapseDecimator::new();
        let mesh = make_plane_grid(8);
        let result = d.decimate(&mesh, 0.5).unwrap();
        assert!(result.face_count() <= mesh.face_count() / 2);
        assert!(result.face_count() > 0);
        result.validate().unwrap();
        // Coplanar input stays coplanar
        for v in &result.vertices {
            assert_relative_eq!(v.z, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_icosphere_scenario() {
        // 42 vertices / 80 triangles halved: <= 40 non-degenerate triangles
        // with surface area within 5% of the original
        let mesh = make_icosphere();
        assert_eq!(mesh.vertex_count(), 42);
        assert_eq!(mesh.face_count(), 80);

        let d = EdgeCollapseDecimator::new();
        let result = d.decimate(&mesh, 0.5).unwrap();
        assert!(result.face_count() <= 40);
        assert!(result.face_count() > 0);
        result.validate().unwrap();
        for face in &result.faces {
            assert!(result.face_normal(face).norm() > 1e-12, "degenerate face");
        }
        let ratio = result.surface_area() / mesh.surface_area();
        assert!(
            (ratio - 1.0).abs() < 0.05,
            "area changed by more than 5%: ratio {}",
            ratio
        );
    }

    #[test]
    fn test_deterministic() {
        let mesh = make_icosphere();
        let d = EdgeCollapseDecimator::new();
        let r1 = d.decimate(&mesh, 0.5).unwrap();
        let r2 = d.decimate(&mesh, 0.5).unwrap();
        assert_eq!(r1, r2);
    }

    #[test]
    fn test_boundary_positions_are_subset_of_input() {
        let mesh = make_hemisphere(20);
        let input_boundary: HashSet<_> =
            boundary_positions(&mesh).iter().map(position_key).collect();
        assert_eq!(input_boundary.len(), 20);

        let d = EdgeCollapseDecimator {
            preserve_boundary: true,
            boundary_weight: 1000.0,
            ..Default::default()
        };
        let result = d.decimate(&mesh, 0.3).unwrap();
        result.validate().unwrap();
        assert!(result.face_count() < mesh.face_count());

        for p in boundary_positions(&result) {
            assert!(
                input_boundary.contains(&position_key(&p)),
                "boundary vertex {:?} is not an input boundary position",
                p
            );
        }
    }

    #[test]
    fn test_non_manifold_edge_is_protected() {
        // Three faces sharing edge (0, 1): collapsing the shared edge would
        // degenerate all three faces at once. One spoke collapse removes
        // exactly one face, so a 2-face result proves the protected edge
        // survived.
        let fan = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(0.5, 1.0, 0.0),
                Point3d::new(0.5, -0.5, 1.0),
                Point3d::new(0.5, -0.5, -1.0),
            ],
            vec![[0, 1, 2], [0, 1, 3], [0, 1, 4]],
        );
        let d = EdgeCollapseDecimator {
            preserve_boundary: false,
            ..Default::default()
        };
        let result = d.decimate(&fan, 0.3).unwrap();
        assert_eq!(result.face_count(), 2);
        result.validate().unwrap();
    }

    #[test]
    fn test_collapse_cannot_create_nonmanifold_edge() {
        // Edge (0,3) starts with two faces and (1,3) with one; merging 1
        // into 0 would put three faces on (0,3). Rejected even with
        // topology preservation off.
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(2.0, 0.0, 0.0),
                Point3d::new(-2.0, 0.0, 0.0),
                Point3d::new(0.0, -2.0, 0.0),
                Point3d::new(-1.0, -3.0, 0.0),
                Point3d::new(1.0, 1.0, 0.0),
                Point3d::new(2.0, -2.0, 0.0),
            ],
            vec![[0, 3, 2], [3, 0, 4], [1, 6, 3], [0, 1, 5]],
        );
        let d = EdgeCollapseDecimator {
            preserve_topology: false,
            preserve_boundary: false,
            ..Default::default()
        };
        let result = d.decimate(&mesh, 0.25).unwrap();
        result.validate().unwrap();
        assert_eq!(result.face_count(), 3);

        let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
        for face in &result.faces {
            for (u, v) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                *edge_count.entry(edge_key(u, v)).or_insert(0) += 1;
            }
        }
        assert!(
            edge_count.values().all(|&c| c <= 2),
            "collapse created a non-manifold edge"
        );
    }

    #[test]
    fn test_protected_edge_follows_merged_vertex() {
        // Non-manifold edge (1,2) with a three-face fan; merging 1 into 0
        // renames it to (0,2), which must stay uncollapsible. With two
        // faces to remove, the run takes the (0,1) merge and one spoke,
        // leaving the fan edge shared by the two survivors.
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3d::new(-1.0, 0.0, 0.0),
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(0.5, 1.0, 0.0),
                Point3d::new(0.5, -0.5, 1.0),
                Point3d::new(0.5, -0.5, -1.0),
                Point3d::new(-1.0, 1.0, 0.0),
            ],
            vec![[1, 2, 3], [1, 2, 4], [1, 2, 5], [0, 1, 6]],
        );
        let d = EdgeCollapseDecimator {
            preserve_topology: false,
            preserve_boundary: false,
            ..Default::default()
        };
        let result = d.decimate(&mesh, 0.45).unwrap();
        result.validate().unwrap();
        assert_eq!(result.face_count(), 2);
        let common = result.faces[0]
            .iter()
            .filter(|v| result.faces[1].contains(v))
            .count();
        assert_eq!(common, 2, "fan edge was collapsed away");
    }

    #[test]
    fn test_non_manifold_fan_with_boundary_protection_is_untouched() {
        // Every edge of the fan is either non-manifold or a boundary edge
        // between two boundary vertices, so nothing is collapsible
        let fan = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3d::new(0.0, 0.0, 0.0),
                Point3d::new(1.0, 0.0, 0.0),
                Point3d::new(0.5, 1.0, 0.0),
                Point3d::new(0.5, -0.5, 1.0),
                Point3d::new(0.5, -0.5, -1.0),
            ],
            vec![[0, 1, 2], [0, 1, 3], [0, 1, 4]],
        );
        let d = EdgeCollapseDecimator::new();
        let result = d.decimate(&fan, 0.9).unwrap();
        assert_eq!(result.face_count(), 3);
    }

    #[test]
    fn test_scalars_interpolated() {
        let mut mesh = make_plane_grid(6);
        mesh.set_scalars((0..mesh.vertex_count()).map(|i| i as f64).collect());
        let d = EdgeCollapseDecimator::new();
        let result = d.decimate(&mesh, 0.4).unwrap();
        let scalars = result.scalars.as_ref().expect("scalars preserved");
        assert_eq!(scalars.len(), result.vertex_count());
        let max_in = (mesh.vertex_count() - 1) as f64;
        assert!(scalars.iter().all(|&s| (0.0..=max_in).contains(&s)));
    }

    #[test]
    fn test_normals_interpolated() {
        let mut mesh = make_plane_grid(6);
        mesh.set_normals(vec![Vector3d::new(0.0, 0.0, 1.0); mesh.vertex_count()]);
        let d = EdgeCollapseDecimator::new();
        let result = d.decimate(&mesh, 0.4).unwrap();
        let normals = result.normals.as_ref().expect("normals preserved");
        assert_eq!(normals.len(), result.vertex_count());
        for n in normals {
            assert_relative_eq!(n.z, 1.0, epsilon = 1e-9);
        }
    }
}
