//! Parallel triangle-mesh simplification with quadric error metrics.
//!
//! An input mesh is loaded into a mutable incidence graph and reduced by
//! iteratively contracting the edges with the lowest accumulated quadric
//! error, with worker threads claiming disjoint neighborhoods so collapses
//! can run concurrently without locking the graph.

pub mod collapse;
pub mod exchange;
pub mod mesh;
pub mod quadric;
pub mod simplify;
