use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use clap::Parser;
use common::config::{Axis, ToolpathConfig, ZPolicy};
use nalgebra::{ArrayStorage, Const, Matrix, Scalar, Vector3, U1};
use num_traits::Zero;
use tracing::level_filters::LevelFilter;

#[derive(Debug, Parser)]
/// Slices meshes into layers and orders them into a motion stream.
pub struct Args {
    /// Path to one or more .stl files.
    #[arg(required = true)]
    pub mesh: Vec<PathBuf>,

    #[arg(long)]
    /// TOML file with a full toolpath config. Flags below override it.
    pub config: Option<PathBuf>,

    #[arg(long)]
    /// Uniform layer height in mm.
    pub layer_height: Option<f64>,
    #[arg(long)]
    /// Slice exactly at these heights, comma separated.
    pub heights: Option<String>,
    #[arg(long, value_enum)]
    /// Rotate the mesh so this axis points up.
    pub swap_axis: Option<AxisArg>,
    #[arg(long)]
    /// Diameter of the tool in mm.
    pub tool_diameter: Option<f64>,
    #[arg(long)]
    /// Relative tolerance for fitting arcs. Zero keeps every move linear.
    pub arc_tolerance: Option<f64>,

    #[arg(long, default_value = "0, 0, 0", value_parser = vector_value_parser::<f64, 3>)]
    /// Where the tool starts, in mm.
    pub start: Vector3<f64>,

    #[arg(long)]
    /// Also render the slices to this SVG file.
    pub svg: Option<PathBuf>,
    #[arg(long, default_value = "motion.json")]
    /// File to write the motion stream to, as JSON.
    pub output: PathBuf,

    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum AxisArg {
    X,
    Y,
}

impl Args {
    pub fn toolpath_config(&self) -> Result<ToolpathConfig> {
        let mut config = match &self.config {
            Some(path) => ToolpathConfig::load(path)?,
            None => ToolpathConfig::default(),
        };

        if let Some(height) = self.layer_height {
            config.slice.policy = ZPolicy::Fixed {
                height,
                first_height: None,
            };
        }

        if let Some(heights) = &self.heights {
            let heights = heights
                .split(',')
                .map(|h| h.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid slice height")?;
            config.slice.policy = ZPolicy::Explicit { heights };
        }

        if let Some(axis) = self.swap_axis {
            config.slice.swap_axis = Some(match axis {
                AxisArg::X => Axis::X,
                AxisArg::Y => Axis::Y,
            });
        }

        if let Some(diameter) = self.tool_diameter {
            config.tool_diameter = diameter;
        }

        if let Some(tolerance) = self.arc_tolerance {
            config.emit.arc_tolerance = tolerance;
        }

        Ok(config)
    }

    /// Output file for mesh `index`. With several meshes the index is
    /// added to the file stem.
    pub fn numbered(&self, path: &Path, index: usize) -> PathBuf {
        if self.mesh.len() < 2 {
            return path.to_path_buf();
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut out = path.with_file_name(format!("{stem}-{index}"));
        if let Some(ext) = path.extension() {
            out.set_extension(ext);
        }
        out
    }
}

fn vector_value_parser<T, const N: usize>(
    raw: &str,
) -> Result<Matrix<T, Const<N>, U1, ArrayStorage<T, N, 1>>>
where
    T: FromStr + Scalar + Zero,
    T::Err: Send + Sync + std::error::Error + 'static,
{
    let mut vec = Matrix::<T, Const<N>, U1, ArrayStorage<T, N, 1>>::zeros();

    let mut parts = raw.splitn(N, ',');
    for i in 0..N {
        let element = parts.next().context("Missing vector element")?.trim();
        vec[i] = element
            .parse()
            .context("Can't convert element from string")?;
    }

    Ok(vec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config() {
        let args = Args::parse_from([
            "slicer",
            "part.stl",
            "--heights",
            "0.5, 1.5",
            "--tool-diameter",
            "3",
            "--swap-axis",
            "y",
        ]);
        let config = args.toolpath_config().unwrap();

        assert_eq!(
            config.slice.policy,
            ZPolicy::Explicit {
                heights: vec![0.5, 1.5]
            }
        );
        assert_eq!(config.tool_diameter, 3.0);
        assert_eq!(config.slice.swap_axis, Some(Axis::Y));
        assert_eq!(args.numbered(&args.output, 0), PathBuf::from("motion.json"));
    }

    #[test]
    fn several_meshes_number_their_outputs() {
        let args = Args::parse_from(["slicer", "a.stl", "b.stl", "--svg", "out/slices.svg"]);
        let svg = args.svg.clone().unwrap();

        assert_eq!(args.numbered(&svg, 1), PathBuf::from("out/slices-1.svg"));
        assert_eq!(args.numbered(&args.output, 0), PathBuf::from("motion-0.json"));
    }

    #[test]
    fn vectors_parse() {
        let v = vector_value_parser::<f64, 3>("1, 2.5,3").unwrap();
        assert_eq!(v, Vector3::new(1.0, 2.5, 3.0));
        assert!(vector_value_parser::<f64, 3>("1, 2").is_err());
    }
}
