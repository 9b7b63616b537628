use nalgebra::Point3;
use rayon::prelude::*;
use std::ops::{Add, AddAssign};

use crate::mesh::{Edge, MeshGraph, Placement, Vertex};

/// A 4x4 symmetric quadric stored as its upper triangle.
///
/// Index layout:
/// ```text
/// 0 1 2 3
/// 1 4 5 6
/// 2 5 7 8
/// 3 6 8 9
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quadric {
    m: [f64; 10],
}

impl Quadric {
    /// The fundamental quadric of the plane ax + by + cz + d = 0: the outer
    /// product of (a, b, c, d) with itself.
    pub fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        Quadric {
            m: [
                a * a,
                a * b,
                a * c,
                a * d,
                b * b,
                b * c,
                b * d,
                c * c,
                c * d,
                d * d,
            ],
        }
    }

    /// Evaluate v'Qv for the homogeneous point (x, y, z, 1).
    pub fn error(&self, p: &Point3<f64>) -> f64 {
        let (x, y, z) = (p.x, p.y, p.z);
        self.m[0] * x * x
            + 2.0 * self.m[1] * x * y
            + 2.0 * self.m[2] * x * z
            + 2.0 * self.m[3] * x
            + self.m[4] * y * y
            + 2.0 * self.m[5] * y * z
            + 2.0 * self.m[6] * y
            + self.m[7] * z * z
            + 2.0 * self.m[8] * z
            + self.m[9]
    }
}

impl Add for Quadric {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        let mut m = self.m;
        for (a, b) in m.iter_mut().zip(rhs.m.iter()) {
            *a += b;
        }
        Quadric { m }
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.m.iter_mut().zip(rhs.m.iter()) {
            *a += b;
        }
    }
}

/// The plane quadric of a triangle, or `None` when the corners are
/// collinear and no plane normal exists.
pub fn face_quadric(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> Option<Quadric> {
    let normal = (p1 - p0).cross(&(p2 - p0)).try_normalize(0.0)?;
    let d = -normal.dot(&p0.coords);
    Some(Quadric::from_plane(normal.x, normal.y, normal.z, d))
}

impl Edge {
    /// Recompute this edge's contraction cost and placement.
    ///
    /// The placement sits at the midpoint of the endpoints and carries their
    /// summed quadrics; the cost is the quadric form evaluated at the
    /// placement.
    pub(crate) fn refresh(&mut self, vertices: &[Vertex]) {
        let a = &vertices[self.v1];
        let b = &vertices[self.v2];
        let quadric = a.quadric + b.quadric;
        let position = Point3::from((a.position.coords + b.position.coords) / 2.0);
        self.cost = quadric.error(&position);
        self.placement = Placement { position, quadric };
    }
}

impl MeshGraph {
    /// Accumulate the quadric of every vertex as the sum of the plane
    /// quadrics of its incident faces, starting from zero.
    ///
    /// Degenerate faces contribute nothing.
    pub fn compute_quadrics(&mut self) {
        let face_quadrics: Vec<Quadric> = self
            .faces
            .par_iter()
            .map(|f| {
                if f.removed || f.vertices.len() != 3 {
                    return Quadric::default();
                }
                let p0 = &self.vertices[f.vertices[0]].position;
                let p1 = &self.vertices[f.vertices[1]].position;
                let p2 = &self.vertices[f.vertices[2]].position;
                face_quadric(p0, p1, p2).unwrap_or_default()
            })
            .collect();

        self.vertices.par_iter_mut().for_each(|v| {
            v.quadric = v
                .faces
                .iter()
                .map(|&f| face_quadrics[f])
                .fold(Quadric::default(), |acc, q| acc + q);
        });
    }

    /// Refresh the cost and placement of every live edge.
    pub fn compute_edge_costs(&mut self) {
        let Self {
            vertices, edges, ..
        } = self;
        let vertices: &[Vertex] = vertices;
        edges
            .par_iter_mut()
            .filter(|e| !e.removed)
            .for_each(|e| e.refresh(vertices));
    }

    pub(crate) fn refresh_edge_cost(&mut self, edge: usize) {
        let Self {
            vertices, edges, ..
        } = self;
        edges[edge].refresh(vertices);
    }
}
