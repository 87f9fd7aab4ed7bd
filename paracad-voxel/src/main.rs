//! paracad-voxel — batch STL to fixed-size voxel grid conversion
//!
//! Walks the input (one file or a directory of `.stl` files), voxelizes each
//! mesh, optionally solid-fills it, pads/crops to the fixed cubic resolution,
//! and writes one MessagePack `.vxg` grid per mesh into the output directory.
//! Individual failures are logged and skipped; the batch keeps going.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use paracad_voxel::{grid, mesh};

#[derive(Parser, Debug)]
#[command(
    name = "paracad-voxel",
    version,
    about = "Batch-convert STL meshes into fixed-size voxel occupancy grids"
)]
struct Args {
    /// An .stl file, or a directory scanned for .stl files
    input: PathBuf,

    /// Output directory for .vxg grid files
    #[arg(short, long, default_value = "./voxels")]
    out_dir: PathBuf,

    /// Cubic resolution of the output grids
    #[arg(short, long, default_value_t = 64)]
    resolution: usize,

    /// Solid-fill enclosed interiors instead of keeping only the shell
    #[arg(long)]
    fill: bool,
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let inputs = collect_inputs(&args.input)?;
    if inputs.is_empty() {
        bail!("No .stl files found under {}", args.input.display());
    }

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;

    let mut converted = 0usize;
    let mut failed = 0usize;

    for path in &inputs {
        match convert_one(path, &args.out_dir, args.resolution, args.fill) {
            Ok(out_path) => {
                converted += 1;
                tracing::info!(
                    input = %path.display(),
                    output = %out_path.display(),
                    "Converted mesh"
                );
            }
            Err(e) => {
                failed += 1;
                tracing::error!(input = %path.display(), error = %e, "Conversion failed");
            }
        }
    }

    println!(
        "{} converted, {} failed, resolution {}^3, output {}",
        converted,
        failed,
        args.resolution,
        args.out_dir.display()
    );

    if converted == 0 {
        bail!("Every conversion failed");
    }
    Ok(())
}

/// Expand the input argument into the list of STL files to process.
fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("{} is neither a file nor a directory", input.display());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(input)
        .with_context(|| format!("Failed to read {}", input.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("stl"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Load, voxelize, fit, and persist one mesh.
fn convert_one(path: &Path, out_dir: &Path, resolution: usize, fill: bool) -> Result<PathBuf> {
    let tri_mesh = mesh::load_stl(path)?;

    let mut voxels = grid::voxelize_surface(&tri_mesh, resolution)?;
    if fill {
        grid::fill_interior(&mut voxels);
    }
    let fitted = grid::fit_to_resolution(&voxels, resolution)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("mesh");
    let out_path = out_dir.join(format!("{stem}.vxg"));
    fitted.save(&out_path)?;

    tracing::debug!(
        occupied = fitted.occupied_count(),
        pitch = fitted.pitch,
        "Grid written"
    );

    Ok(out_path)
}
