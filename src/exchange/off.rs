/// off.rs
/// -----------
/// Read and write ASCII OFF (Object File Format) meshes. The reader parses
/// into a plain document of positions and triangle index triples which is
/// then turned into an incidence graph; the writer compacts removed
/// entities and reassigns contiguous vertex identifiers.
use std::fs;
use std::io;
use std::path::Path;

use nalgebra::Point3;
use thiserror::Error;

use crate::mesh::MeshGraph;

/// Everything that can go wrong at the OFF boundary. Each variant carries
/// the stable exit code the command line reports for it.
#[derive(Debug, Error)]
pub enum OffError {
    #[error("unable to read input file: {0}")]
    Unreadable(io::Error),
    #[error("missing OFF header; only OFF (Object File Format) files are accepted")]
    BadMagic,
    #[error("malformed counts line; expected `<vertices> <faces> <edges>`")]
    BadCounts,
    #[error("malformed vertex record {0}")]
    BadVertex(usize),
    #[error("malformed face record {0}")]
    BadFace(usize),
    #[error("unable to create output file: {0}")]
    Unwritable(io::Error),
}

impl OffError {
    pub fn exit_code(&self) -> i32 {
        match self {
            OffError::Unreadable(_) => 11,
            OffError::BadMagic => 12,
            OffError::BadCounts => 13,
            OffError::BadVertex(_) => 14,
            OffError::BadFace(_) => 15,
            OffError::Unwritable(_) => 16,
        }
    }
}

/// The raw contents of an ASCII OFF file before graph construction.
#[derive(Debug)]
pub struct OffDocument {
    pub positions: Vec<Point3<f64>>,
    pub triangles: Vec<(usize, usize, usize)>,
}

impl OffDocument {
    /// Parse OFF text. Blank lines and `#` comment lines are tolerated
    /// anywhere; the header line must be exactly `OFF`.
    pub fn parse(data: &str) -> Result<Self, OffError> {
        let mut lines = data.lines().filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        });

        let magic = lines.next().ok_or(OffError::BadMagic)?;
        if magic.trim() != "OFF" {
            return Err(OffError::BadMagic);
        }

        let counts = lines.next().ok_or(OffError::BadCounts)?;
        let counts: Vec<usize> = counts
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| OffError::BadCounts)?;
        let &[n_vertices, n_faces, _n_edges] = counts.as_slice() else {
            return Err(OffError::BadCounts);
        };

        let mut positions = Vec::with_capacity(n_vertices);
        for record in 0..n_vertices {
            let line = lines.next().ok_or(OffError::BadVertex(record))?;
            let fields: Vec<f64> = line
                .split_whitespace()
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|_| OffError::BadVertex(record))?;
            let &[x, y, z] = fields.as_slice() else {
                return Err(OffError::BadVertex(record));
            };
            positions.push(Point3::new(x, y, z));
        }

        let mut triangles = Vec::with_capacity(n_faces);
        for record in 0..n_faces {
            let line = lines.next().ok_or(OffError::BadFace(record))?;
            let fields: Vec<usize> = line
                .split_whitespace()
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|_| OffError::BadFace(record))?;
            // only triangles are supported
            let &[3, a, b, c] = fields.as_slice() else {
                return Err(OffError::BadFace(record));
            };
            if a >= n_vertices || b >= n_vertices || c >= n_vertices {
                return Err(OffError::BadFace(record));
            }
            if a == b || b == c || a == c {
                return Err(OffError::BadFace(record));
            }
            triangles.push((a, b, c));
        }

        Ok(OffDocument {
            positions,
            triangles,
        })
    }

    pub fn to_graph(&self) -> MeshGraph {
        // the parser already range-checked every face record
        MeshGraph::from_triples(&self.positions, &self.triangles)
            .expect("parser validated all face records")
    }
}

/// Read, parse and build the incidence graph of an OFF file.
pub fn load_mesh_file(path: &Path) -> Result<MeshGraph, OffError> {
    let data = fs::read_to_string(path).map_err(OffError::Unreadable)?;
    Ok(OffDocument::parse(&data)?.to_graph())
}

/// Serialize the surviving mesh as ASCII OFF, with the edge count written
/// as zero.
pub fn to_off_string(mesh: &MeshGraph) -> String {
    let (positions, triangles) = mesh.compact();
    let mut out = String::new();
    out.push_str("OFF\n");
    out.push_str(&format!("{} {} 0\n", positions.len(), triangles.len()));
    for p in &positions {
        out.push_str(&format!("{} {} {}\n", p.x, p.y, p.z));
    }
    for (a, b, c) in &triangles {
        out.push_str(&format!("3 {} {} {}\n", a, b, c));
    }
    out
}

pub fn save_mesh_file(mesh: &MeshGraph, path: &Path) -> Result<(), OffError> {
    fs::write(path, to_off_string(mesh)).map_err(OffError::Unwritable)
}
