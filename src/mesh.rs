use ahash::AHashSet;
use anyhow::{ensure, Result};
use itertools::Itertools;
use nalgebra::{Point3, Vector3};

use crate::quadric::Quadric;

/// A mesh vertex and its incidence sets.
///
/// Incidence is stored as indices into the owning arrays of [`MeshGraph`].
/// A removed vertex keeps its identifier but advertises empty sets.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub id: usize,
    pub position: Point3<f64>,
    pub quadric: Quadric,
    pub removed: bool,

    /// Faces this vertex participates in.
    pub faces: AHashSet<usize>,
    /// Edges where this vertex is the first endpoint.
    pub outgoing: AHashSet<usize>,
    /// Edges where this vertex is the second endpoint.
    pub incoming: AHashSet<usize>,
    /// Endpoints of incident edges other than this vertex.
    pub neighbors: AHashSet<usize>,
}

impl Vertex {
    fn new(id: usize, position: Point3<f64>) -> Self {
        Vertex {
            id,
            position,
            quadric: Quadric::default(),
            removed: false,
            faces: AHashSet::new(),
            outgoing: AHashSet::new(),
            incoming: AHashSet::new(),
            neighbors: AHashSet::new(),
        }
    }

    pub fn has_faces(&self) -> bool {
        !self.faces.is_empty()
    }
}

/// The proposed contraction target of an edge: a synthetic vertex carrying
/// the midpoint position and the summed endpoint quadrics.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub position: Point3<f64>,
    pub quadric: Quadric,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: usize,
    /// First endpoint, the smaller vertex id at construction time. Rewiring
    /// during a collapse may break that ordering; the pair stays directional.
    pub v1: usize,
    /// Second endpoint. A collapse contracts v1 into v2.
    pub v2: usize,
    pub cost: f64,
    pub placement: Placement,
    /// Incident faces, two for interior edges and one on a boundary.
    pub faces: AHashSet<usize>,
    pub removed: bool,
}

#[derive(Debug, Clone)]
pub struct Face {
    pub id: usize,
    /// Ordered corner list, arity 3.
    pub vertices: Vec<usize>,
    pub edges: AHashSet<usize>,
    pub removed: bool,
}

/// Axis-aligned bounding box accumulated while vertices load.
#[derive(Debug, Clone, Copy)]
pub struct Volume {
    pub lower: Point3<f64>,
    pub upper: Point3<f64>,
}

impl Default for Volume {
    fn default() -> Self {
        Volume {
            lower: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            upper: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }
}

impl Volume {
    pub fn update(&mut self, p: &Point3<f64>) {
        // componentwise min/max
        self.lower = self.lower.inf(p);
        self.upper = self.upper.sup(p);
    }

    /// Extent along each axis, zero when no vertex was ever added.
    pub fn dimensions(&self) -> Vector3<f64> {
        if self.lower.x > self.upper.x {
            return Vector3::zeros();
        }
        self.upper - self.lower
    }
}

/// A triangle mesh as a mutable incidence graph.
///
/// Vertices, edges and faces live in owning arrays and reference each other
/// by index, so the cyclic vertex/edge/face structure needs no shared
/// pointers. Entities are never deallocated during a simplification pass,
/// only marked removed; compaction happens at write-out.
#[derive(Debug, Clone, Default)]
pub struct MeshGraph {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
    pub faces: Vec<Face>,
    pub volume: Volume,
}

impl MeshGraph {
    /// Build the incidence graph from vertex positions and triangle index
    /// triples.
    pub fn from_triples(
        positions: &[Point3<f64>],
        triangles: &[(usize, usize, usize)],
    ) -> Result<Self> {
        let mut volume = Volume::default();
        let vertices = positions
            .iter()
            .enumerate()
            .map(|(id, p)| {
                volume.update(p);
                Vertex::new(id, *p)
            })
            .collect();
        let mut mesh = MeshGraph {
            vertices,
            volume,
            ..MeshGraph::default()
        };

        for (fid, &(a, b, c)) in triangles.iter().enumerate() {
            let n = mesh.vertices.len();
            ensure!(
                a < n && b < n && c < n,
                "face {} references a vertex out of range",
                fid
            );
            ensure!(
                a != b && b != c && a != c,
                "face {} repeats a vertex",
                fid
            );

            mesh.faces.push(Face {
                id: fid,
                vertices: vec![a, b, c],
                edges: AHashSet::new(),
                removed: false,
            });
            for v in [a, b, c] {
                mesh.vertices[v].faces.insert(fid);
            }

            // canonicalize every pair, smaller id first
            let mut corners = [a, b, c];
            corners.sort_unstable();
            for (x, y) in corners.iter().copied().tuple_combinations() {
                mesh.attach_face_edge(fid, x, y);
            }
        }

        Ok(mesh)
    }

    /// Attach `face` to the edge connecting `x` and `y` (with x.id < y.id),
    /// creating the edge if the pair is not yet connected.
    fn attach_face_edge(&mut self, face: usize, x: usize, y: usize) {
        // O(deg) scan of the smaller endpoint's outgoing edges
        let existing = self.vertices[x]
            .outgoing
            .iter()
            .copied()
            .find(|&e| self.edges[e].v2 == y);

        let eid = match existing {
            Some(e) => e,
            None => {
                let eid = self.edges.len();
                let a = self.vertices[x].position;
                let b = self.vertices[y].position;
                self.edges.push(Edge {
                    id: eid,
                    v1: x,
                    v2: y,
                    cost: 0.0,
                    placement: Placement {
                        position: Point3::from((a.coords + b.coords) / 2.0),
                        quadric: Quadric::default(),
                    },
                    faces: AHashSet::new(),
                    removed: false,
                });
                self.vertices[x].outgoing.insert(eid);
                self.vertices[x].neighbors.insert(y);
                self.vertices[y].incoming.insert(eid);
                self.vertices[y].neighbors.insert(x);
                eid
            }
        };

        self.edges[eid].faces.insert(face);
        self.faces[face].edges.insert(eid);
    }

    /// Mark `edge` removed and detach it from its endpoints and faces.
    /// Idempotent.
    pub fn remove_edge(&mut self, edge: usize) {
        if self.edges[edge].removed {
            return;
        }
        let (v1, v2) = (self.edges[edge].v1, self.edges[edge].v2);
        self.vertices[v1].outgoing.remove(&edge);
        self.vertices[v1].neighbors.remove(&v2);
        self.vertices[v2].incoming.remove(&edge);
        self.vertices[v2].neighbors.remove(&v1);

        let faces: Vec<usize> = self.edges[edge].faces.drain().collect();
        for f in faces {
            self.faces[f].edges.remove(&edge);
        }
        self.edges[edge].removed = true;
    }

    /// Mark `face` removed and detach it from its vertices and edges.
    /// Idempotent.
    pub fn remove_face(&mut self, face: usize) {
        if self.faces[face].removed {
            return;
        }
        let corners = std::mem::take(&mut self.faces[face].vertices);
        for v in corners {
            self.vertices[v].faces.remove(&face);
        }
        let edges: Vec<usize> = self.faces[face].edges.drain().collect();
        for e in edges {
            self.edges[e].faces.remove(&face);
        }
        self.faces[face].removed = true;
    }

    /// Mark `vertex` removed and empty its incidence sets. Peers are not
    /// touched; callers must already have rerouted or removed everything
    /// incident. Idempotent.
    pub fn remove_vertex(&mut self, vertex: usize) {
        let v = &mut self.vertices[vertex];
        if v.removed {
            return;
        }
        v.faces.clear();
        v.outgoing.clear();
        v.incoming.clear();
        v.neighbors.clear();
        v.removed = true;
    }

    /// The cheapest live edge incident to `vertex`, if any.
    ///
    /// NaN costs sort to the back, so a degenerate edge is only picked when
    /// nothing else is left.
    pub fn min_cost_edge(&self, vertex: usize) -> Option<usize> {
        let v = &self.vertices[vertex];
        v.outgoing
            .iter()
            .chain(v.incoming.iter())
            .copied()
            .filter(|&e| !self.edges[e].removed)
            .min_by(|&a, &b| self.edges[a].cost.total_cmp(&self.edges[b].cost))
    }

    pub fn live_vertices(&self) -> usize {
        self.vertices.iter().filter(|v| !v.removed).count()
    }

    pub fn live_edges(&self) -> usize {
        self.edges.iter().filter(|e| !e.removed).count()
    }

    pub fn live_faces(&self) -> usize {
        self.faces.iter().filter(|f| !f.removed).count()
    }

    /// Drop removed entities, reassign contiguous vertex identifiers, and
    /// return positions plus triangle triples ready for write-out. Faces
    /// without three distinct surviving corners are skipped.
    pub fn compact(&self) -> (Vec<Point3<f64>>, Vec<(usize, usize, usize)>) {
        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut positions = Vec::new();
        for (index, v) in self.vertices.iter().enumerate() {
            if v.removed {
                continue;
            }
            remap[index] = positions.len();
            positions.push(v.position);
        }

        let mut triangles = Vec::new();
        for f in self.faces.iter().filter(|f| !f.removed) {
            if f.vertices.len() != 3 {
                continue;
            }
            let (a, b, c) = (f.vertices[0], f.vertices[1], f.vertices[2]);
            if a == b || b == c || a == c {
                continue;
            }
            if self.vertices[a].removed || self.vertices[b].removed || self.vertices[c].removed {
                continue;
            }
            triangles.push((remap[a], remap[b], remap[c]));
        }

        (positions, triangles)
    }

    /// Check the structural invariants over all live entities.
    pub fn validate(&self) -> Result<()> {
        let mut pairs = AHashSet::new();
        for e in self.edges.iter().filter(|e| !e.removed) {
            let (v1, v2) = (&self.vertices[e.v1], &self.vertices[e.v2]);
            ensure!(
                !v1.removed && !v2.removed,
                "edge {} touches a removed vertex",
                e.id
            );
            ensure!(
                v1.outgoing.contains(&e.id) && v2.incoming.contains(&e.id),
                "edge {} is missing from an endpoint set",
                e.id
            );
            ensure!(
                v1.neighbors.contains(&e.v2) && v2.neighbors.contains(&e.v1),
                "edge {} endpoints are not mutual neighbors",
                e.id
            );
            ensure!(
                pairs.insert((e.v1.min(e.v2), e.v1.max(e.v2))),
                "more than one edge connects {} and {}",
                e.v1,
                e.v2
            );
            for &f in &e.faces {
                ensure!(
                    !self.faces[f].removed && self.faces[f].edges.contains(&e.id),
                    "edge {} lists a face that does not list it back",
                    e.id
                );
            }
        }

        for f in self.faces.iter().filter(|f| !f.removed) {
            ensure!(f.vertices.len() == 3, "face {} lost its arity", f.id);
            for &v in &f.vertices {
                ensure!(
                    !self.vertices[v].removed,
                    "face {} references a removed vertex",
                    f.id
                );
                ensure!(
                    self.vertices[v].faces.contains(&f.id),
                    "face {} is missing from vertex {}",
                    f.id,
                    v
                );
            }
            for &e in &f.edges {
                ensure!(
                    !self.edges[e].removed,
                    "face {} references a removed edge",
                    f.id
                );
                let edge = &self.edges[e];
                ensure!(
                    f.vertices.contains(&edge.v1) && f.vertices.contains(&edge.v2),
                    "face {} lists an edge that does not connect its corners",
                    f.id
                );
            }
        }

        for v in self.vertices.iter().filter(|v| !v.removed) {
            for &e in v.outgoing.iter().chain(v.incoming.iter()) {
                ensure!(
                    !self.edges[e].removed,
                    "vertex {} references a removed edge",
                    v.id
                );
            }
            for &f in &v.faces {
                ensure!(
                    !self.faces[f].removed,
                    "vertex {} references a removed face",
                    v.id
                );
            }
            let expected: AHashSet<usize> = v
                .outgoing
                .iter()
                .map(|&e| self.edges[e].v2)
                .chain(v.incoming.iter().map(|&e| self.edges[e].v1))
                .collect();
            ensure!(
                v.neighbors == expected,
                "stale neighbor cache on vertex {}",
                v.id
            );
        }

        Ok(())
    }
}
