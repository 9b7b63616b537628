use ahash::AHashMap;

use crate::mesh::MeshGraph;

impl MeshGraph {
    /// Contract `edge` into its second endpoint; the first endpoint dies.
    ///
    /// Best-effort: returns `false` without mutating the graph when the edge
    /// is already removed or either endpoint has no faces left. On success
    /// the survivor takes the edge's placement position and quadric, and the
    /// costs of every edge in its star are recomputed.
    pub fn collapse_edge(&mut self, edge: usize) -> bool {
        if self.edges[edge].removed {
            return false;
        }
        let (v1, v2) = (self.edges[edge].v1, self.edges[edge].v2);
        debug_assert!(!self.vertices[v1].removed && !self.vertices[v2].removed);
        if !self.vertices[v1].has_faces() || !self.vertices[v2].has_faces() {
            return false;
        }

        // the triangles sharing the edge disappear with it
        let doomed: Vec<usize> = self.edges[edge].faces.iter().copied().collect();
        for f in doomed {
            self.remove_face(f);
        }

        let placement = self.edges[edge].placement;
        self.remove_edge(edge);

        self.vertices[v2].position = placement.position;
        self.vertices[v2].quadric = placement.quadric;

        // map the survivor's current neighbors to the edges reaching them;
        // a rewired edge of v1 landing on one of these is a duplicate
        let mut reach: AHashMap<usize, usize> = AHashMap::new();
        for &e in &self.vertices[v2].incoming {
            reach.insert(self.edges[e].v1, e);
        }
        for &e in &self.vertices[v2].outgoing {
            reach.insert(self.edges[e].v2, e);
        }

        let incoming: Vec<usize> = self.vertices[v1].incoming.iter().copied().collect();
        for e in incoming {
            if self.edges[e].removed {
                continue;
            }
            let far = self.edges[e].v1;
            if reach.contains_key(&far) {
                self.remove_edge(e);
            } else {
                self.edges[e].v2 = v2;
                self.vertices[far].neighbors.remove(&v1);
                self.vertices[far].neighbors.insert(v2);
                self.vertices[v2].incoming.insert(e);
                self.vertices[v2].neighbors.insert(far);
            }
        }

        let outgoing: Vec<usize> = self.vertices[v1].outgoing.iter().copied().collect();
        for e in outgoing {
            if self.edges[e].removed {
                continue;
            }
            let far = self.edges[e].v2;
            if reach.contains_key(&far) {
                self.remove_edge(e);
            } else {
                self.edges[e].v1 = v2;
                self.vertices[far].neighbors.remove(&v1);
                self.vertices[far].neighbors.insert(v2);
                self.vertices[v2].outgoing.insert(e);
                self.vertices[v2].neighbors.insert(far);
            }
        }

        // retarget the surviving faces of the dying vertex
        let faces: Vec<usize> = self.vertices[v1].faces.iter().copied().collect();
        for f in faces {
            if self.faces[f].removed {
                continue;
            }
            // a face that lost a side to duplicate removal picks up the
            // surviving counterpart edge
            if self.faces[f].edges.len() == 2 {
                let corners = self.faces[f].vertices.clone();
                for v in corners {
                    if let Some(&e) = reach.get(&v) {
                        if !self.edges[e].removed && self.faces[f].edges.insert(e) {
                            self.edges[e].faces.insert(f);
                        }
                    }
                }
            }
            for corner in self.faces[f].vertices.iter_mut() {
                if *corner == v1 {
                    *corner = v2;
                }
            }
            self.vertices[v2].faces.insert(f);
        }

        self.remove_vertex(v1);

        // refresh costs across the survivor's star
        let star: Vec<usize> = self.vertices[v2]
            .incoming
            .iter()
            .chain(self.vertices[v2].outgoing.iter())
            .copied()
            .collect();
        for e in star {
            if !self.edges[e].removed {
                self.refresh_edge_cost(e);
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use crate::mesh::shapes;
    use approx::relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_collapse_triangle() {
        let mut mesh = shapes::triangle();
        mesh.compute_quadrics();
        mesh.compute_edge_costs();

        assert!(mesh.collapse_edge(0));
        assert_eq!(mesh.live_vertices(), 2);
        assert_eq!(mesh.live_faces(), 0);
        assert_eq!(mesh.live_edges(), 1);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_collapse_moves_survivor() {
        let mut mesh = shapes::triangle();
        mesh.compute_quadrics();
        mesh.compute_edge_costs();

        let e = &mesh.edges[0];
        let (v1, v2) = (e.v1, e.v2);
        let a = mesh.vertices[v1].position;
        let b = mesh.vertices[v2].position;
        let q_sum = mesh.vertices[v1].quadric + mesh.vertices[v2].quadric;

        assert!(mesh.collapse_edge(0));
        assert!(mesh.vertices[v1].removed);
        let survivor = &mesh.vertices[v2];
        assert_eq!(
            survivor.position,
            Point3::from((a.coords + b.coords) / 2.0)
        );
        assert_eq!(survivor.quadric, q_sum);
    }

    #[test]
    fn test_collapse_tetrahedron() {
        let mut mesh = shapes::tetrahedron();
        mesh.compute_quadrics();
        mesh.compute_edge_costs();

        assert!(mesh.collapse_edge(0));
        assert_eq!(mesh.live_vertices(), 3);
        assert_eq!(mesh.live_faces(), 2);
        assert_eq!(mesh.live_edges(), 3);
        mesh.validate().unwrap();

        // every surviving corner reference resolves to a live vertex
        for f in mesh.faces.iter().filter(|f| !f.removed) {
            for &v in &f.vertices {
                assert!(!mesh.vertices[v].removed);
            }
        }
    }

    #[test]
    fn test_collapse_declines_faceless() {
        let mut mesh = shapes::triangle();
        mesh.compute_quadrics();
        mesh.compute_edge_costs();
        mesh.remove_face(0);

        // endpoints still connected, but nothing to contract over
        assert!(!mesh.collapse_edge(0));
        assert_eq!(mesh.live_vertices(), 3);
        assert_eq!(mesh.live_edges(), 3);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_collapse_removed_edge() {
        let mut mesh = shapes::triangle();
        mesh.compute_quadrics();
        mesh.compute_edge_costs();
        mesh.remove_edge(0);
        assert!(!mesh.collapse_edge(0));
    }

    #[test]
    fn test_collapse_chain() {
        // run a tetrahedron down to the ground, one collapse at a time
        let mut mesh = shapes::tetrahedron();
        mesh.compute_quadrics();
        mesh.compute_edge_costs();

        let mut collapsed = 0;
        loop {
            let candidate = (0..mesh.vertices.len())
                .filter(|&v| !mesh.vertices[v].removed && mesh.vertices[v].has_faces())
                .find_map(|v| mesh.min_cost_edge(v));
            let Some(edge) = candidate else { break };
            if !mesh.collapse_edge(edge) {
                break;
            }
            collapsed += 1;
            mesh.validate().unwrap();
        }

        assert!(collapsed >= 2);
        assert_eq!(mesh.live_vertices(), 4 - collapsed);
    }

    #[test]
    fn test_collapse_refreshes_star() {
        let mut mesh = shapes::tetrahedron();
        mesh.compute_quadrics();
        mesh.compute_edge_costs();

        let v2 = mesh.edges[0].v2;
        assert!(mesh.collapse_edge(0));

        for &e in mesh.vertices[v2]
            .incoming
            .iter()
            .chain(mesh.vertices[v2].outgoing.iter())
        {
            let edge = &mesh.edges[e];
            let a = mesh.vertices[edge.v1].position;
            let b = mesh.vertices[edge.v2].position;
            let mid = Point3::from((a.coords + b.coords) / 2.0);
            assert_eq!(edge.placement.position, mid);
            let q = mesh.vertices[edge.v1].quadric + mesh.vertices[edge.v2].quadric;
            assert!(relative_eq!(
                edge.cost,
                q.error(&mid),
                epsilon = 1e-12
            ));
        }
    }

    #[test]
    fn test_collapse_declines_detached_endpoint() {
        // faces removed around one endpoint only: every collapse over it
        // declines and the graph is untouched
        let mut mesh = shapes::tetrahedron();
        mesh.compute_quadrics();
        mesh.compute_edge_costs();

        let faces: Vec<usize> = mesh.vertices[3].faces.iter().copied().collect();
        for f in faces {
            mesh.remove_face(f);
        }
        let before = mesh.live_edges();
        let incident: Vec<usize> = mesh.vertices[3]
            .outgoing
            .iter()
            .chain(mesh.vertices[3].incoming.iter())
            .copied()
            .collect();
        for e in incident {
            assert!(!mesh.collapse_edge(e));
        }
        assert_eq!(mesh.live_edges(), before);
        mesh.validate().unwrap();
    }
}
