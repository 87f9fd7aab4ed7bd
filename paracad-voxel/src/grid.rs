//! Voxel occupancy grids: surface voxelization, solid fill, fixed-size fit.

use std::collections::VecDeque;
use std::path::Path;

use nalgebra::{Isometry3, Point3, Vector3};
use ndarray::Array3;
use parry3d_f64::query::intersection_test;
use parry3d_f64::shape::{Cuboid, Triangle};
use serde::{Deserialize, Serialize};

use crate::error::VoxelError;
use crate::mesh::TriMesh;

/// Padding added to the cell box half-extents so triangles lying exactly on a
/// cell face still register in that cell.
const CONTACT_EPSILON: f64 = 1e-9;

/// A uniform boolean occupancy grid.
///
/// `occupancy` is indexed `[x][y][z]`; a cell spans
/// `origin + index * pitch .. origin + (index + 1) * pitch` on each axis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoxelGrid {
    pub pitch: f64,
    pub origin: [f64; 3],
    pub occupancy: Array3<bool>,
}

impl VoxelGrid {
    pub fn dims(&self) -> [usize; 3] {
        let (x, y, z) = self.occupancy.dim();
        [x, y, z]
    }

    pub fn occupied_count(&self) -> usize {
        self.occupancy.iter().filter(|&&o| o).count()
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, VoxelError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VoxelError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Write the grid to a file.
    pub fn save(&self, path: &Path) -> Result<(), VoxelError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Read a grid from a file.
    pub fn load(path: &Path) -> Result<Self, VoxelError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

/// Surface-voxelize a mesh.
///
/// The grid covers the mesh bounding box; the cell pitch is chosen so the
/// longest axis spans `resolution` cells, which keeps cells cubic and the
/// output no larger than `resolution` on any axis. A cell is occupied when
/// any triangle intersects its box (parry's intersection test, touching
/// counts).
pub fn voxelize_surface(mesh: &TriMesh, resolution: usize) -> Result<VoxelGrid, VoxelError> {
    if resolution < 2 {
        return Err(VoxelError::ResolutionTooSmall(resolution));
    }

    let (min, max) = mesh.bounding_box().ok_or(VoxelError::DegenerateMesh)?;
    let extent = max - min;
    let longest = extent.x.max(extent.y).max(extent.z);
    if longest <= 0.0 {
        return Err(VoxelError::DegenerateMesh);
    }

    let pitch = longest / resolution as f64;
    let dims = [
        cells_along(extent.x, pitch),
        cells_along(extent.y, pitch),
        cells_along(extent.z, pitch),
    ];

    let mut occupancy = Array3::from_elem((dims[0], dims[1], dims[2]), false);

    let half = Vector3::repeat(pitch / 2.0 + CONTACT_EPSILON);
    let cell_box = Cuboid::new(half);
    let identity = Isometry3::identity();

    for face in 0..mesh.faces.len() {
        let [a, b, c] = mesh.triangle(face);
        let triangle = Triangle::new(a, b, c);

        // Only cells under the triangle's own bounding box are candidates.
        let (lo, hi) = triangle_cell_range(&[a, b, c], &min, pitch, &dims);

        for ix in lo[0]..=hi[0] {
            for iy in lo[1]..=hi[1] {
                for iz in lo[2]..=hi[2] {
                    if occupancy[[ix, iy, iz]] {
                        continue;
                    }
                    let center = Isometry3::translation(
                        min.x + (ix as f64 + 0.5) * pitch,
                        min.y + (iy as f64 + 0.5) * pitch,
                        min.z + (iz as f64 + 0.5) * pitch,
                    );
                    let hit = intersection_test(&identity, &triangle, &center, &cell_box)
                        .unwrap_or(false);
                    if hit {
                        occupancy[[ix, iy, iz]] = true;
                    }
                }
            }
        }
    }

    Ok(VoxelGrid {
        pitch,
        origin: [min.x, min.y, min.z],
        occupancy,
    })
}

fn cells_along(extent: f64, pitch: f64) -> usize {
    ((extent / pitch).ceil() as usize).max(1)
}

/// Inclusive cell index range covered by a triangle's bounding box.
fn triangle_cell_range(
    corners: &[Point3<f64>; 3],
    origin: &Point3<f64>,
    pitch: f64,
    dims: &[usize; 3],
) -> ([usize; 3], [usize; 3]) {
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];

    for axis in 0..3 {
        let t_min = corners.iter().map(|p| p[axis]).fold(f64::INFINITY, f64::min);
        let t_max = corners.iter().map(|p| p[axis]).fold(f64::NEG_INFINITY, f64::max);

        let last = dims[axis] - 1;
        let lo_idx = ((t_min - origin[axis]) / pitch).floor() as i64 - 1;
        let hi_idx = ((t_max - origin[axis]) / pitch).floor() as i64 + 1;

        lo[axis] = lo_idx.clamp(0, last as i64) as usize;
        hi[axis] = hi_idx.clamp(0, last as i64) as usize;
    }

    (lo, hi)
}

/// Solid fill: mark everything the outside air cannot reach.
///
/// Flood-fills the unoccupied exterior from the grid boundary
/// (6-connectivity); every cell the flood never reaches is interior and gets
/// marked occupied. A watertight surface grid becomes a solid; an open mesh
/// stays hollow because the flood leaks inside.
pub fn fill_interior(grid: &mut VoxelGrid) {
    let [nx, ny, nz] = grid.dims();
    let mut exterior = Array3::from_elem((nx, ny, nz), false);
    let mut queue: VecDeque<[usize; 3]> = VecDeque::new();

    let seed = |idx: [usize; 3],
                exterior: &mut Array3<bool>,
                queue: &mut VecDeque<[usize; 3]>| {
        if !grid.occupancy[idx] && !exterior[idx] {
            exterior[idx] = true;
            queue.push_back(idx);
        }
    };

    for x in 0..nx {
        for y in 0..ny {
            for z in 0..nz {
                if x == 0 || y == 0 || z == 0 || x == nx - 1 || y == ny - 1 || z == nz - 1 {
                    seed([x, y, z], &mut exterior, &mut queue);
                }
            }
        }
    }

    while let Some([x, y, z]) = queue.pop_front() {
        let neighbors = [
            (x.wrapping_sub(1), y, z),
            (x + 1, y, z),
            (x, y.wrapping_sub(1), z),
            (x, y + 1, z),
            (x, y, z.wrapping_sub(1)),
            (x, y, z + 1),
        ];
        for (ax, ay, az) in neighbors {
            if ax < nx && ay < ny && az < nz {
                let idx = [ax, ay, az];
                if !grid.occupancy[idx] && !exterior[idx] {
                    exterior[idx] = true;
                    queue.push_back(idx);
                }
            }
        }
    }

    for x in 0..nx {
        for y in 0..ny {
            for z in 0..nz {
                if !exterior[[x, y, z]] {
                    grid.occupancy[[x, y, z]] = true;
                }
            }
        }
    }
}

/// Pad or crop the grid to `target`³ cells, centered.
///
/// Padding adds empty cells symmetrically; cropping keeps the centered
/// window. The pitch is unchanged — this fixes the array shape, not the
/// physical scale — and the origin shifts to keep surviving cells at their
/// original world positions.
pub fn fit_to_resolution(grid: &VoxelGrid, target: usize) -> Result<VoxelGrid, VoxelError> {
    if target < 2 {
        return Err(VoxelError::ResolutionTooSmall(target));
    }

    let dims = grid.dims();
    let mut occupancy = Array3::from_elem((target, target, target), false);
    let mut origin = grid.origin;

    // Per-axis offset of the source array inside the target array (may be
    // negative when cropping).
    let mut offsets = [0i64; 3];
    for axis in 0..3 {
        offsets[axis] = (target as i64 - dims[axis] as i64) / 2;
        origin[axis] -= offsets[axis] as f64 * grid.pitch;
    }

    for x in 0..dims[0] {
        for y in 0..dims[1] {
            for z in 0..dims[2] {
                if !grid.occupancy[[x, y, z]] {
                    continue;
                }
                let tx = x as i64 + offsets[0];
                let ty = y as i64 + offsets[1];
                let tz = z as i64 + offsets[2];
                if (0..target as i64).contains(&tx)
                    && (0..target as i64).contains(&ty)
                    && (0..target as i64).contains(&tz)
                {
                    occupancy[[tx as usize, ty as usize, tz as usize]] = true;
                }
            }
        }
    }

    Ok(VoxelGrid {
        pitch: grid.pitch,
        origin,
        occupancy,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Closed unit cube [0,1]^3 as 12 triangles.
    fn unit_cube() -> TriMesh {
        let v = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
        let vertices = vec![
            v(0.0, 0.0, 0.0),
            v(1.0, 0.0, 0.0),
            v(1.0, 1.0, 0.0),
            v(0.0, 1.0, 0.0),
            v(0.0, 0.0, 1.0),
            v(1.0, 0.0, 1.0),
            v(1.0, 1.0, 1.0),
            v(0.0, 1.0, 1.0),
        ];
        let faces = vec![
            // bottom (z = 0)
            [0, 2, 1],
            [0, 3, 2],
            // top (z = 1)
            [4, 5, 6],
            [4, 6, 7],
            // front (y = 0)
            [0, 1, 5],
            [0, 5, 4],
            // back (y = 1)
            [2, 3, 7],
            [2, 7, 6],
            // left (x = 0)
            [0, 4, 7],
            [0, 7, 3],
            // right (x = 1)
            [1, 2, 6],
            [1, 6, 5],
        ];
        TriMesh::new(vertices, faces)
    }

    #[test]
    fn test_surface_voxelization_dims_match_resolution() {
        let grid = voxelize_surface(&unit_cube(), 8).unwrap();
        assert_eq!(grid.dims(), [8, 8, 8]);
        assert!((grid.pitch - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_surface_voxelization_marks_shell_not_center() {
        let grid = voxelize_surface(&unit_cube(), 8).unwrap();
        assert!(grid.occupancy[[0, 0, 0]], "corner cell must touch the surface");
        assert!(grid.occupancy[[0, 4, 4]], "face cell must touch the surface");
        assert!(
            !grid.occupancy[[4, 4, 4]],
            "center cell must stay empty in surface mode"
        );
        assert!(grid.occupied_count() > 0);
    }

    #[test]
    fn test_fill_interior_makes_cube_solid() {
        let mut grid = voxelize_surface(&unit_cube(), 8).unwrap();
        fill_interior(&mut grid);
        assert_eq!(
            grid.occupied_count(),
            8 * 8 * 8,
            "watertight cube must fill completely"
        );
    }

    #[test]
    fn test_fill_interior_leaves_open_mesh_hollow() {
        // Single square panel: no enclosed volume, nothing should fill.
        let panel = TriMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                // nudge to give the box a nonzero z extent
                Point3::new(0.5, 0.5, 0.2),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        let mut grid = voxelize_surface(&panel, 8).unwrap();
        let before = grid.occupied_count();
        fill_interior(&mut grid);
        assert_eq!(grid.occupied_count(), before, "open mesh must not fill");
    }

    #[test]
    fn test_fit_pads_grid_centered() {
        let grid = voxelize_surface(&unit_cube(), 8).unwrap();
        let occupied_before = grid.occupied_count();

        let fitted = fit_to_resolution(&grid, 16).unwrap();
        assert_eq!(fitted.dims(), [16, 16, 16]);
        assert_eq!(fitted.occupied_count(), occupied_before);
        // 8 cells in a 16 grid: 4 cells of padding on each side
        assert!(fitted.occupancy[[4, 4, 4]], "old corner should land at offset 4");
        assert!(!fitted.occupancy[[0, 0, 0]], "padding must be empty");
        // origin shifts back by the padding so cells keep world positions
        assert!((fitted.origin[0] - (-0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_fit_crops_grid_centered() {
        let grid = voxelize_surface(&unit_cube(), 8).unwrap();
        let cropped = fit_to_resolution(&grid, 4).unwrap();
        assert_eq!(cropped.dims(), [4, 4, 4]);
        // the centered 4-window of a hollow 8-cube contains no shell cells
        assert_eq!(cropped.occupied_count(), 0);
    }

    #[test]
    fn test_fit_identity_when_already_sized() {
        let grid = voxelize_surface(&unit_cube(), 8).unwrap();
        let fitted = fit_to_resolution(&grid, 8).unwrap();
        assert_eq!(fitted.dims(), grid.dims());
        assert_eq!(fitted.occupied_count(), grid.occupied_count());
        assert_eq!(fitted.origin, grid.origin);
    }

    #[test]
    fn test_grid_file_roundtrip() {
        let grid = voxelize_surface(&unit_cube(), 4).unwrap();
        let path = std::env::temp_dir().join("paracad-voxel-test-grid.vxg");
        grid.save(&path).unwrap();
        let loaded = VoxelGrid::load(&path).unwrap();
        assert_eq!(loaded.dims(), grid.dims());
        assert_eq!(loaded.occupied_count(), grid.occupied_count());
        assert_eq!(loaded.origin, grid.origin);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_degenerate_mesh_rejected() {
        let flat = TriMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.0, 0.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        assert!(matches!(
            voxelize_surface(&flat, 8),
            Err(VoxelError::DegenerateMesh)
        ));
    }

    #[test]
    fn test_tiny_resolution_rejected() {
        assert!(matches!(
            voxelize_surface(&unit_cube(), 1),
            Err(VoxelError::ResolutionTooSmall(1))
        ));
    }
}
