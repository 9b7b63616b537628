use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use ahash::AHashSet;
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::mesh::MeshGraph;

/// Outcome of a simplification pass.
#[derive(Debug, Clone, Copy)]
pub struct SimplifyReport {
    /// Requested number of collapses.
    pub target: usize,
    /// Successful collapses across all workers. May overshoot the target by
    /// up to one per extra worker, since the exit check is not serialized
    /// against the progress increments.
    pub collapsed: usize,
    /// Attempts that found a removed, faceless or contended candidate.
    pub failures: usize,
}

/// Shared handle to the graph for the duration of the parallel pass.
///
/// The graph carries no lock of its own. A worker may only dereference this
/// handle while every vertex its collapse will touch is registered, by that
/// worker, in the active-neighborhood work set. Claims of different workers
/// are disjoint, so no two workers ever read or mutate the same entity
/// concurrently, and the work-set mutex orders a release with the next
/// claim of the same vertices.
struct GraphPtr(*mut MeshGraph);

unsafe impl Send for GraphPtr {}
unsafe impl Sync for GraphPtr {}

impl GraphPtr {
    /// Callers must hold a claim covering every entity they touch.
    #[allow(clippy::mut_from_ref)]
    unsafe fn get(&self) -> &mut MeshGraph {
        unsafe { &mut *self.0 }
    }
}

/// Reduce the vertex count of `mesh` by `fraction` using `threads` parallel
/// workers.
///
/// The target is `floor(fraction * vertex count)` successful edge collapses;
/// a fraction of zero (or an empty mesh) leaves the graph untouched.
pub fn simplify(mesh: &mut MeshGraph, fraction: f64, threads: usize) -> SimplifyReport {
    let total = mesh.vertices.len();
    let target = (fraction.max(0.0) * total as f64) as usize;

    info!("calculating quadrics...");
    mesh.compute_quadrics();
    info!("calculating edge costs...");
    mesh.compute_edge_costs();

    let threads = threads.max(1);
    info!(
        "simplifying [target = {} collapse(s), {} worker(s)]...",
        target, threads
    );
    let report = decimate(mesh, target, threads);
    info!(
        "simplified: {} collapse(s), {} failure(s)",
        report.collapsed, report.failures
    );
    report
}

fn decimate(mesh: &mut MeshGraph, target: usize, threads: usize) -> SimplifyReport {
    let total = mesh.vertices.len();
    let block = total / threads;

    let progress = AtomicUsize::new(0);
    let failures = AtomicUsize::new(0);
    // vertices currently owned by some in-flight collapse
    let work_set: Mutex<AHashSet<usize>> = Mutex::new(AHashSet::new());

    let graph = GraphPtr(mesh as *mut MeshGraph);

    thread::scope(|scope| {
        for worker in 0..threads {
            let start = worker * block;
            let len = if worker == threads - 1 {
                block + total % threads
            } else {
                block
            };
            let (graph, progress, failures, work_set) = (&graph, &progress, &failures, &work_set);
            scope.spawn(move || worker_loop(graph, start, len, target, progress, failures, work_set));
        }
    });

    SimplifyReport {
        target,
        collapsed: progress.into_inner(),
        failures: failures.into_inner(),
    }
}

fn worker_loop(
    graph: &GraphPtr,
    start: usize,
    len: usize,
    target: usize,
    progress: &AtomicUsize,
    failures: &AtomicUsize,
    work_set: &Mutex<AHashSet<usize>>,
) {
    if len == 0 {
        // degenerate block when workers outnumber vertices
        return;
    }

    let mut rng = SmallRng::from_entropy();
    // bounds livelock when the target is unreachable and every draw fails
    let budget = 64 * len + 1024;
    let mut spent = 0usize;

    // the claim taken on the previous iteration, released lazily on entry
    // to the next critical section
    let mut claim: Vec<usize> = Vec::new();

    while progress.load(Ordering::Relaxed) < target {
        if spent > budget {
            debug!("worker at block {} exhausted its failure budget", start);
            break;
        }

        let candidate = start + rng.gen_range(0..len);

        let chosen = {
            let mut work = work_set.lock().unwrap();
            for v in claim.drain(..) {
                work.remove(&v);
            }
            claim_candidate(graph, candidate, &mut work, &mut claim)
        };

        match chosen {
            Some(edge) => {
                // SAFETY: every vertex this collapse touches is in `claim`
                // and registered in the work set, and other workers' claims
                // are disjoint from it.
                let collapsed = unsafe { graph.get() }.collapse_edge(edge);
                if collapsed {
                    progress.fetch_add(1, Ordering::Relaxed);
                } else {
                    failures.fetch_add(1, Ordering::Relaxed);
                    spent += 1;
                }
            }
            None => {
                failures.fetch_add(1, Ordering::Relaxed);
                spent += 1;
            }
        }
    }

    // do not strand claimed vertices on exit, nobody could ever claim them
    // again
    if !claim.is_empty() {
        let mut work = work_set.lock().unwrap();
        for v in claim.drain(..) {
            work.remove(&v);
        }
    }
}

/// Try to claim the neighborhood a collapse at `candidate` would touch, and
/// pick the candidate's cheapest incident edge.
///
/// Runs under the work-set lock. On success the claimed vertices are pushed
/// onto `claim` and registered in `work`; on a conflict (or a removed or
/// faceless candidate) nothing is claimed and `None` is returned.
fn claim_candidate(
    graph: &GraphPtr,
    candidate: usize,
    work: &mut AHashSet<usize>,
    claim: &mut Vec<usize>,
) -> Option<usize> {
    // a vertex inside the work set may be mutated by an in-flight collapse
    // at any moment; nothing of it can be read until it is released
    if work.contains(&candidate) {
        return None;
    }

    // SAFETY: `candidate` is unclaimed and in-flight collapses only touch
    // claimed vertices, so reading it here, under the lock, cannot race.
    let mesh = unsafe { graph.get() };
    let vertex = &mesh.vertices[candidate];
    if vertex.removed || !vertex.has_faces() {
        return None;
    }
    if vertex.neighbors.iter().any(|v| work.contains(v)) {
        return None;
    }

    // the candidate's ring is free, so its incident edges are stable and
    // their costs can be read
    let edge = mesh.min_cost_edge(candidate)?;
    let e = &mesh.edges[edge];
    let far = if e.v1 == candidate { e.v2 } else { e.v1 };

    // the collapse also reroutes edges around the far endpoint and refreshes
    // costs across the survivor's star, so both rings get claimed
    let far_ring = &mesh.vertices[far].neighbors;
    if far_ring.iter().any(|v| work.contains(v)) {
        return None;
    }

    claim.push(candidate);
    claim.extend(vertex.neighbors.iter().copied());
    claim.extend(
        far_ring
            .iter()
            .filter(|v| **v != candidate && !vertex.neighbors.contains(v))
            .copied(),
    );
    for &v in claim.iter() {
        work.insert(v);
    }
    Some(edge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::shapes;
    use nalgebra::Point3;

    /// Count connected components among live vertices, joined by live edges.
    fn components(mesh: &MeshGraph) -> usize {
        let mut parent: Vec<usize> = (0..mesh.vertices.len()).collect();
        fn find(parent: &mut Vec<usize>, v: usize) -> usize {
            let up = parent[v];
            if up != v {
                let root = find(parent, up);
                parent[v] = root;
            }
            parent[v]
        }
        for e in mesh.edges.iter().filter(|e| !e.removed) {
            let (a, b) = (find(&mut parent, e.v1), find(&mut parent, e.v2));
            parent[a] = b;
        }
        mesh.vertices
            .iter()
            .filter(|v| !v.removed)
            .map(|v| find(&mut parent, v.id))
            .collect::<ahash::AHashSet<usize>>()
            .len()
    }

    #[test]
    fn test_noop_fraction() {
        let mut mesh = shapes::icosahedron();
        let report = simplify(&mut mesh, 0.0, 2);
        assert_eq!(report.target, 0);
        assert_eq!(report.collapsed, 0);
        assert_eq!(mesh.live_vertices(), 12);
        assert_eq!(mesh.live_faces(), 20);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_single_triangle() {
        let mut mesh = shapes::triangle();
        let report = simplify(&mut mesh, 0.34, 1);
        assert_eq!(report.target, 1);
        assert_eq!(report.collapsed, 1);
        assert_eq!(mesh.live_vertices(), 2);
        assert_eq!(mesh.live_faces(), 0);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_tetrahedron_single_worker() {
        let mut mesh = shapes::tetrahedron();
        let report = simplify(&mut mesh, 0.25, 1);
        assert_eq!(report.target, 1);
        assert_eq!(report.collapsed, 1);
        assert_eq!(mesh.live_vertices(), 3);
        assert_eq!(mesh.live_faces(), 2);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_icosahedron_single_worker() {
        let mut mesh = shapes::icosahedron();
        let report = simplify(&mut mesh, 0.5, 1);
        // a single worker never overshoots
        assert_eq!(report.collapsed, 6);
        assert_eq!(mesh.live_vertices(), 6);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_icosahedron_parallel() {
        let mut mesh = shapes::icosahedron();
        let report = simplify(&mut mesh, 0.5, 4);
        assert!(report.collapsed >= report.target);
        assert!(report.collapsed <= report.target + 3);
        assert_eq!(mesh.live_vertices(), 12 - report.collapsed);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_disjoint_components() {
        let mut mesh = shapes::two_tetrahedra();
        assert_eq!(components(&mesh), 2);

        let report = simplify(&mut mesh, 0.5, 2);
        assert!(report.collapsed >= report.target);
        assert_eq!(mesh.live_vertices(), 8 - report.collapsed);
        // collapses never merge or annihilate a component
        assert_eq!(components(&mesh), 2);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_isolated_vertices_only_fail() {
        // no faces anywhere: every draw is a failure and the budget ends it
        let positions = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let mut mesh = MeshGraph::from_triples(&positions, &[]).unwrap();
        let report = simplify(&mut mesh, 0.5, 2);
        assert_eq!(report.collapsed, 0);
        assert!(report.failures > 0);
        assert_eq!(mesh.live_vertices(), 4);
    }

    #[test]
    fn test_isolated_vertex_in_mesh() {
        // a cube plus one vertex no face references; landing on it counts a
        // failure and never crashes
        let mut positions = vec![
            Point3::new(-0.5, -0.5, -0.5),
            Point3::new(0.5, -0.5, -0.5),
            Point3::new(0.5, 0.5, -0.5),
            Point3::new(-0.5, 0.5, -0.5),
            Point3::new(-0.5, -0.5, 0.5),
            Point3::new(0.5, -0.5, 0.5),
            Point3::new(0.5, 0.5, 0.5),
            Point3::new(-0.5, 0.5, 0.5),
        ];
        positions.push(Point3::new(5.0, 5.0, 5.0));
        let triangles = [
            (0, 1, 2),
            (0, 2, 3),
            (4, 5, 6),
            (4, 6, 7),
            (0, 1, 5),
            (0, 5, 4),
            (1, 2, 6),
            (1, 6, 5),
            (2, 3, 7),
            (2, 7, 6),
            (3, 0, 4),
            (3, 4, 7),
        ];
        let mut mesh = MeshGraph::from_triples(&positions, &triangles).unwrap();
        let report = simplify(&mut mesh, 0.4, 1);
        assert!(report.collapsed >= report.target || report.failures > 0);
        assert!(!mesh.vertices[8].removed);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_fraction_near_one_terminates() {
        let mut mesh = shapes::icosahedron();
        let report = simplify(&mut mesh, 0.99, 2);
        assert!(mesh.live_vertices() >= 1);
        assert_eq!(mesh.live_vertices(), 12 - report.collapsed);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_more_workers_than_vertices() {
        let mut mesh = shapes::triangle();
        let report = simplify(&mut mesh, 0.34, 64);
        assert!(report.collapsed >= 1);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_parallel_stress() {
        for threads in [1, 2, 4, 8] {
            let mut mesh = shapes::grid(12);
            let total = mesh.vertices.len();
            let report = simplify(&mut mesh, 0.5, threads);
            assert!(report.collapsed >= report.target, "threads = {}", threads);
            assert!(
                report.collapsed < report.target + threads,
                "threads = {}",
                threads
            );
            assert_eq!(mesh.live_vertices(), total - report.collapsed);
            mesh.validate().unwrap();
        }
    }
}
