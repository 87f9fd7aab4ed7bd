use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file type '{extension}' for {path} — only .stl is supported")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("Mesh has no triangles: {0}")]
    EmptyMesh(PathBuf),

    #[error("Mesh is degenerate (zero extent) and cannot be voxelized")]
    DegenerateMesh,

    #[error("Resolution must be at least 2, got {0}")]
    ResolutionTooSmall(usize),

    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
