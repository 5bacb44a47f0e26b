use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Everything needed to turn a mesh into a motion stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolpathConfig {
    /// Diameter of the active tool (nozzle, flute or kerf) in mm.
    pub tool_diameter: f64,
    /// Travel moves longer than this flag a retract before they start.
    pub retract_over: f64,
    /// Height kept above the terrain when a travel move has to rise over
    /// material.
    pub travel_clearance: f64,
    pub slice: SliceOptions,
    pub emit: EmitParams,
}

/// Options for a single slicing job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceOptions {
    /// Lowest Z to consider, defaults to the mesh bottom.
    pub zmin: Option<f64>,
    /// Highest Z to consider, defaults to the mesh top.
    pub zmax: Option<f64>,
    /// Rotate the mesh so this axis points up before slicing.
    pub swap_axis: Option<Axis>,
    /// Keep the raw line set of each slice next to its polygons.
    pub topo: bool,
    /// Minimum area of a horizontal face for it to count as a flat.
    pub cam_flat_detect: Option<f64>,
    /// Squared distance under which open path ends are bridged. Zero
    /// disables bridging.
    pub bridge_gap: f64,
    /// Ceiling on candidate paths explored while reconstructing a slice.
    pub path_cap: usize,
    /// Distance a plane is moved up when it lands exactly on a flat.
    pub flat_nudge: f64,
    pub policy: ZPolicy,
}

/// How Z heights for the slicing planes are chosen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ZPolicy {
    /// Uniform layers with an optional distinct first layer.
    Fixed { height: f64, first_height: Option<f64> },
    /// Uniform layers that shrink down to `min_height` to land between
    /// closely spaced mesh features.
    Adaptive {
        height: f64,
        min_height: f64,
        first_height: Option<f64>,
    },
    /// One plane between each pair of distinct vertex heights. Gaps
    /// smaller than `min_height` are merged.
    Auto { min_height: f64 },
    /// Stepped down from the top with extra planes just under each flat.
    CamFlats {
        step: f64,
        offset: f64,
        down: bool,
        fit: bool,
    },
    /// Caller supplied heights.
    Explicit { heights: Vec<f64> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
}

/// Feed, retraction and arc fitting parameters of the motion emitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitParams {
    /// Cutting / extruding feed rate in mm/min.
    pub feed_rate: f64,
    /// Feed rate for moves that cut downward in Z.
    pub plunge_rate: f64,
    /// Rapid travel rate.
    pub seek_rate: f64,
    pub retract_distance: f64,
    pub retract_speed: f64,
    pub z_hop: f64,
    /// Allowed relative drift of the fitted circle. Zero disables arcs.
    pub arc_tolerance: f64,
    /// Maximum number of steps per full circle an arc may be made of.
    pub arc_resolution: f64,
    pub arc_max_radius: f64,
    /// Allowed relative deviation of local radii along an arc.
    pub arc_deviation: f64,
    pub firmware_retract: bool,
    pub retract_dwell_ms: u32,
    /// Material emitted per mm of travel at an emit factor of one.
    pub emit_per_mm: f64,
}

impl Default for ToolpathConfig {
    fn default() -> Self {
        Self {
            slice: SliceOptions::default(),
            emit: EmitParams::default(),
            tool_diameter: 0.4,
            retract_over: 2.0,
            travel_clearance: 1.0,
        }
    }
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            zmin: None,
            zmax: None,
            swap_axis: None,
            topo: false,
            cam_flat_detect: None,
            bridge_gap: 0.0001,
            path_cap: 10_000,
            flat_nudge: 0.001,
            policy: ZPolicy::Fixed {
                height: 0.2,
                first_height: None,
            },
        }
    }
}

impl Default for EmitParams {
    fn default() -> Self {
        Self {
            feed_rate: 1200.0,
            plunge_rate: 250.0,
            seek_rate: 6000.0,
            retract_distance: 1.0,
            retract_speed: 2400.0,
            z_hop: 0.0,
            arc_tolerance: 0.0,
            arc_resolution: 20.0,
            arc_max_radius: 40.0,
            arc_deviation: 0.5,
            firmware_retract: false,
            retract_dwell_ms: 0,
            emit_per_mm: 1.0,
        }
    }
}

impl ZPolicy {
    /// The nominal layer step, if the policy has one.
    pub fn step(&self) -> Option<f64> {
        match self {
            ZPolicy::Fixed { height, .. } | ZPolicy::Adaptive { height, .. } => Some(*height),
            ZPolicy::CamFlats { step, .. } => Some(*step),
            ZPolicy::Auto { .. } | ZPolicy::Explicit { .. } => None,
        }
    }

    /// Flat aware policies place planes near flats themselves, so they are
    /// never nudged off of them.
    pub fn is_flat_aware(&self) -> bool {
        matches!(self, ZPolicy::CamFlats { .. })
    }
}

impl ToolpathConfig {
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!("Failed to load config, using defaults: {:#}", err);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(if path.exists() {
            let file = fs::read(path)?;
            let string = String::from_utf8_lossy(&file);
            let config = toml::from_str(&string)
                .with_context(|| format!("Invalid config `{}`", path.display()))?;
            info!("Successfully loaded config file");
            config
        } else {
            info!("No config file found, using defaults");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let string = toml::to_string(self)?;
        fs::write(path, string)?;
        Ok(())
    }
}
