//! Sparse voxel octree inspector
//!
//! Builds a demo volume (a sphere resting above a thin floor slab), then
//! prints per-level paging statistics, an ASCII slice through one level and
//! an ASCII depth view produced by the hierarchical ray marcher.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p sparsevox-inspect -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod scene;

use std::path::PathBuf;

use anyhow::Context;
use sparsevox_core::{Axis, OctreeConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::scene::{DepthView, SceneParams};

/// Command line options.
#[derive(Debug, Clone)]
struct InspectArgs {
    config: Option<PathBuf>,
    voxel_size: Option<f32>,
    page_bytes: Option<usize>,
    radius: f32,
    axis: Axis,
    level: u8,
    width: u32,
    height: u32,
}

impl Default for InspectArgs {
    fn default() -> Self {
        Self {
            config: None,
            voxel_size: None,
            page_bytes: None,
            radius: 3.0,
            axis: Axis::Y,
            level: 4,
            width: 72,
            height: 32,
        }
    }
}

impl InspectArgs {
    /// Parse options from the process arguments; unknown flags are ignored.
    fn from_args() -> Self {
        let mut args = Self::default();
        let argv: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < argv.len() {
            let value = argv.get(i + 1);
            let consumed = match (argv[i].as_str(), value) {
                ("-c" | "--config", Some(v)) => {
                    args.config = Some(PathBuf::from(v));
                    true
                }
                ("--voxel-size", Some(v)) => {
                    args.voxel_size = v.parse().ok();
                    true
                }
                ("--page-bytes", Some(v)) => {
                    args.page_bytes = v.parse().ok();
                    true
                }
                ("-r" | "--radius", Some(v)) => {
                    if let Ok(r) = v.parse() {
                        args.radius = r;
                    }
                    true
                }
                ("-a" | "--axis", Some(v)) => {
                    if let Some(axis) = parse_axis(v) {
                        args.axis = axis;
                    }
                    true
                }
                ("-l" | "--level", Some(v)) => {
                    if let Ok(level) = v.parse() {
                        args.level = level;
                    }
                    true
                }
                ("--width", Some(v)) => {
                    if let Ok(w) = v.parse() {
                        args.width = w;
                    }
                    true
                }
                ("--height", Some(v)) => {
                    if let Ok(h) = v.parse() {
                        args.height = h;
                    }
                    true
                }
                _ => false,
            };
            i += if consumed { 2 } else { 1 };
        }

        args
    }

    /// Octree config from the file (if any) with command line overrides applied.
    fn octree_config(&self) -> anyhow::Result<OctreeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => scene::default_config(),
        };
        if let Some(voxel_size) = self.voxel_size {
            config.voxel_size = voxel_size;
        }
        if let Some(page_bytes) = self.page_bytes {
            config.desired_page_bytes = page_bytes;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_axis(value: &str) -> Option<Axis> {
    match value.to_ascii_lowercase().as_str() {
        "x" => Some(Axis::X),
        "y" => Some(Axis::Y),
        "z" => Some(Axis::Z),
        _ => None,
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = InspectArgs::from_args();
    let config = args.octree_config()?;
    info!(?config, "building demo volume");

    let octree = scene::build(
        &config,
        &SceneParams {
            sphere_radius: args.radius,
        },
    )?;

    println!("{}", scene::level_table(&octree));

    match scene::render_slice(&octree, args.axis, args.level) {
        Some(slice) => println!("{slice}"),
        None => println!("level {} does not exist", args.level),
    }

    let view = DepthView {
        width: args.width,
        height: args.height,
        ..DepthView::looking_at_origin(&config)
    };
    println!("{}", scene::render_depth(&octree, &view));
    Ok(())
}

fn print_help() {
    eprintln!(
        "Sparse voxel octree inspector

USAGE:
    cargo run -p sparsevox-inspect -- [OPTIONS]

VOLUME OPTIONS:
    -c, --config <PATH>     JSON octree config (center, extent, voxel_size,
                            desired_page_bytes, direct_paging_threshold)
    --voxel-size <F>        Override the voxel edge length
    --page-bytes <N>        Override the page budget (0 = 64 KiB)
    -r, --radius <F>        Demo sphere radius in world units (default: 3)

OUTPUT OPTIONS:
    -a, --axis <x|y|z>      Slice axis (default: y)
    -l, --level <N>         Slice level, 0 = finest (default: 4)
    --width <N>             Depth view columns (default: 72)
    --height <N>            Depth view rows (default: 32)

OTHER:
    -h, --help              Print this help message

EXAMPLES:
    # Default volume: 2048^3 voxels of 0.1 units
    cargo run -p sparsevox-inspect

    # Coarser voxels and a finer slice
    cargo run -p sparsevox-inspect -- --voxel-size 0.25 --level 2 --axis z

ENVIRONMENT:
    RUST_LOG                Log filter (e.g. debug, sparsevox_octree=trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_names_parse() {
        assert_eq!(parse_axis("X"), Some(Axis::X));
        assert_eq!(parse_axis("z"), Some(Axis::Z));
        assert_eq!(parse_axis("w"), None);
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let args = InspectArgs {
            voxel_size: Some(0.5),
            page_bytes: Some(4096),
            ..Default::default()
        };
        let config = args.octree_config().unwrap();
        assert_eq!(config.voxel_size, 0.5);
        assert_eq!(config.desired_page_bytes, 4096);
    }
}
