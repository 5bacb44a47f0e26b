//! Picks the Z heights of the slicing planes.

use std::collections::{BTreeMap, BTreeSet};

use common::{
    config::{SliceOptions, ZPolicy},
    misc::round_to,
};
use tracing::debug;

use crate::{geometry::precision::KEY_DECIMALS, mesh::Mesh};

/// A plane to slice at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub z: f64,
    pub thickness: Option<f64>,
}

impl Plane {
    fn at(z: f64) -> Self {
        Self { z, thickness: None }
    }
}

fn z_key(z: f64) -> i64 {
    (z * 10f64.powi(KEY_DECIMALS)).round() as i64
}

fn key_z(key: i64) -> f64 {
    key as f64 / 10f64.powi(KEY_DECIMALS)
}

/// Vertex height statistics of a mesh.
#[derive(Debug, Default)]
pub struct ZStats {
    /// Every distinct vertex height.
    heights: BTreeSet<i64>,
    /// Summed area of horizontal faces at each height.
    flats: BTreeMap<i64, f64>,
    /// Number of horizontal edges of sloped faces at each height.
    lines: BTreeMap<i64, usize>,
}

impl ZStats {
    pub fn from_mesh(mesh: &Mesh) -> Self {
        let floor = z_key(mesh.bounds().0.z);
        let mut stats = Self::default();

        for [a, b, c] in mesh.faces() {
            let keys = [z_key(a.z), z_key(b.z), z_key(c.z)];
            stats.heights.extend(keys);

            if keys[0] == keys[1] && keys[1] == keys[2] {
                if keys[0] > floor {
                    let area = (b - a).xy().perp(&(c - a).xy()).abs() / 2.0;
                    *stats.flats.entry(keys[0]).or_default() += area;
                }
                continue;
            }

            for (i, j) in [(0, 1), (1, 2), (2, 0)] {
                if keys[i] == keys[j] && keys[i] > floor {
                    *stats.lines.entry(keys[i]).or_default() += 1;
                }
            }
        }

        stats
    }

    /// Distinct vertex heights, lowest first.
    pub fn heights(&self) -> impl Iterator<Item = f64> + '_ {
        self.heights.iter().map(|&k| key_z(k))
    }

    /// Heights of horizontal faces with at least `min_area` area.
    pub fn flats(&self, min_area: f64) -> impl Iterator<Item = f64> + '_ {
        self.flats
            .iter()
            .filter(move |(_, &area)| area >= min_area)
            .map(|(&k, _)| key_z(k))
    }

    pub fn flat_area(&self, z: f64) -> f64 {
        self.flats.get(&z_key(z)).copied().unwrap_or_default()
    }

    /// True if `z` lands on a horizontal face or edge.
    pub fn on_flat(&self, z: f64) -> bool {
        let key = z_key(z);
        self.flats.contains_key(&key) || self.lines.contains_key(&key)
    }
}

/// Selects slicing planes between `zmin` and `zmax` following the policy in
/// `options`. Planes that would cut exactly through a horizontal face are
/// nudged up unless the policy already accounts for flats.
pub fn select_planes(options: &SliceOptions, stats: &ZStats, zmin: f64, zmax: f64) -> Vec<Plane> {
    let mut planes = match &options.policy {
        ZPolicy::Fixed {
            height,
            first_height,
        } => fixed(*height, *first_height, zmin, zmax),
        ZPolicy::Adaptive {
            height,
            min_height,
            first_height,
        } => adaptive(stats, *height, *min_height, *first_height, zmin, zmax),
        ZPolicy::Auto { min_height } => auto(stats, *min_height, zmin, zmax),
        ZPolicy::CamFlats {
            step,
            offset,
            down,
            fit,
        } => {
            let flat_offset = match *offset > 0.0 {
                true => *offset,
                false => options.flat_nudge,
            };
            let flats = options
                .cam_flat_detect
                .map(|min_area| stats.flats(min_area).collect::<Vec<_>>())
                .unwrap_or_default();
            cam_interval(*step, *offset, *down, *fit, &flats, flat_offset, zmin, zmax)
                .into_iter()
                .map(Plane::at)
                .collect()
        }
        ZPolicy::Explicit { heights } => heights.iter().copied().map(Plane::at).collect(),
    };

    if !options.policy.is_flat_aware() {
        for plane in planes.iter_mut().filter(|p| stats.on_flat(p.z)) {
            debug!("Nudging plane at z={} off a flat", plane.z);
            plane.z += options.flat_nudge;
        }
    }

    planes
}

fn fixed(height: f64, first_height: Option<f64>, zmin: f64, zmax: f64) -> Vec<Plane> {
    let mut planes = Vec::new();
    let mut start = zmin;

    if let Some(first) = first_height {
        planes.push(Plane::at(zmin + first / 2.0));
        start = zmin + first;
    }

    for i in 0.. {
        let z = start + height / 2.0 + i as f64 * height;
        if z >= zmax {
            break;
        }
        planes.push(Plane::at(z));
    }

    planes
}

/// Fixed layers that shrink to land evenly between mesh features. Every gap
/// between distinct vertex heights is split into the fewest layers no
/// taller than `height`, as long as they stay above `min_height`.
fn adaptive(
    stats: &ZStats,
    height: f64,
    min_height: f64,
    first_height: Option<f64>,
    zmin: f64,
    zmax: f64,
) -> Vec<Plane> {
    let first = first_height.unwrap_or(height);
    let mut planes = vec![Plane::at(zmin + first / 2.0)];
    let mut z_pos = zmin + first;

    for next in stats.heights() {
        if z_pos >= zmax {
            break;
        }

        if z_pos >= next {
            continue;
        }

        let delta = next - z_pos;
        if delta < min_height {
            continue;
        }

        let div_min = (delta / min_height).floor();
        let mut div_max = (delta / height).floor();
        let steps = match div_max > 0.0 && div_max <= div_min {
            true => {
                if delta % height > 0.01 {
                    div_max += 1.0;
                }
                div_max as usize
            }
            false => 1,
        };

        let step = delta / steps as f64;
        for i in 0..steps {
            planes.push(Plane::at(z_pos + step * (i as f64 + 0.5)));
        }
        z_pos = next;
    }

    planes
}

/// One plane halfway between each pair of distinct vertex heights. Heights
/// closer than `min_height` to the last kept one are merged into it.
fn auto(stats: &ZStats, min_height: f64, zmin: f64, zmax: f64) -> Vec<Plane> {
    let mut heights: Vec<f64> = Vec::new();
    for z in stats.heights().filter(|&z| z >= zmin && z <= zmax) {
        match heights.last() {
            Some(&last) if min_height > 0.0 && z - last < min_height => {}
            _ => heights.push(z),
        }
    }

    heights
        .windows(2)
        .map(|pair| Plane {
            z: (pair[0] + pair[1]) / 2.0,
            thickness: Some(pair[1] - pair[0]),
        })
        .collect()
}

/// Steps through `zmin..zmax` inset by `offset`. With `fit` the step is
/// shrunk so the last plane lands on the far bound. Planes just above and
/// below every flat are added. Heights are rounded and deduplicated.
#[allow(clippy::too_many_arguments)]
pub fn cam_interval(
    step: f64,
    offset: f64,
    down: bool,
    fit: bool,
    flats: &[f64],
    flat_offset: f64,
    zmin: f64,
    zmax: f64,
) -> Vec<f64> {
    let (low, high) = (zmin + offset, zmax - offset);
    let mut step = step;

    let steps = (high - low) / step;
    let mut count = steps.floor() as usize + usize::from(steps.fract() == 0.0);
    if fit {
        count += 1;
        step = (high - low) / count as f64;
    }

    let mut out = (0..count)
        .map(|i| match down {
            true => high - step * i as f64,
            false => low + step * i as f64,
        })
        .collect::<Vec<_>>();

    if fit {
        out.push(if down { low } else { high });
    }

    for &flat in flats {
        out.push(flat + flat_offset);
        if flat > low {
            out.push(flat - flat_offset);
        }
    }

    out.sort_by(|a, b| match down {
        true => b.total_cmp(a),
        false => a.total_cmp(b),
    });

    let mut out = out
        .into_iter()
        .map(|z| round_to(z, KEY_DECIMALS))
        .collect::<Vec<_>>();
    out.dedup();
    out
}
