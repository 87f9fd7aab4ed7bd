//! STL mesh loading.

use std::fs::OpenOptions;
use std::path::Path;

use nalgebra::Point3;

use crate::error::VoxelError;

/// An indexed triangle mesh in f64 coordinates.
#[derive(Debug, Clone)]
pub struct TriMesh {
    pub vertices: Vec<Point3<f64>>,
    pub faces: Vec<[usize; 3]>,
}

impl TriMesh {
    pub fn new(vertices: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Axis-aligned bounding box over all vertices.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.vertices.first()?;
        let mut min = *first;
        let mut max = *first;
        for v in &self.vertices[1..] {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        Some((min, max))
    }

    /// The three corner points of face `i`.
    pub fn triangle(&self, i: usize) -> [Point3<f64>; 3] {
        let [a, b, c] = self.faces[i];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }
}

/// Load an STL file (binary or ASCII) as an indexed mesh.
pub fn load_stl(path: &Path) -> Result<TriMesh, VoxelError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if extension != "stl" {
        return Err(VoxelError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension,
        });
    }

    let mut file = OpenOptions::new().read(true).open(path)?;
    let indexed = stl_io::read_stl(&mut file)?;

    if indexed.faces.is_empty() {
        return Err(VoxelError::EmptyMesh(path.to_path_buf()));
    }

    let vertices = indexed
        .vertices
        .iter()
        .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect();

    let faces = indexed
        .faces
        .iter()
        .map(|f| [f.vertices[0], f.vertices[1], f.vertices[2]])
        .collect();

    Ok(TriMesh { vertices, faces })
}

// ============================================================================
// TESTS
// ============================================================================
