//! paracad-voxel — batch conversion of surface meshes to fixed-size voxel grids
//!
//! Companion utility to the paracad pipeline: takes STL meshes exported from
//! the CAD host and produces cubic boolean occupancy grids suitable for
//! downstream ML experiments. Triangle/box intersection is delegated to
//! parry; this crate only walks the grid.

pub mod error;
pub mod grid;
pub mod mesh;

pub use error::VoxelError;
pub use grid::VoxelGrid;
pub use mesh::TriMesh;
