use std::time::Instant;

use common::{
    config::{Axis, SliceOptions, ZPolicy},
    misc::human_duration,
    progress::Progress,
};
use tracing::{debug, info};

use crate::{
    geometry::{nest, Polygon},
    mesh::{unswap, Mesh},
    slice::{Slice, SliceStack},
    Pos, SliceError,
};

mod buckets;
mod connect;
mod dedup;
mod intersect;
mod zindex;

pub use buckets::Buckets;
pub use connect::Connector;
pub use dedup::remove_duplicate_lines;
pub use intersect::{intersect_plane, intersect_triangle, Line, PointArena};
pub use zindex::{cam_interval, select_planes, Plane, ZStats};

/// Cuts a mesh into a stack of slices.
pub struct Slicer {
    options: SliceOptions,
    /// The mesh in the slicing frame, with the swapped axis already up.
    mesh: Mesh,
    zmin: f64,
    zmax: f64,
    progress: Progress,
}

impl Slicer {
    /// Checks the options against the mesh. Every fatal problem is reported
    /// here, before any slicing work is done.
    pub fn new(mesh: Mesh, options: SliceOptions) -> Result<Self, SliceError> {
        validate_policy(&options.policy)?;

        let mesh = match options.swap_axis {
            Some(axis) => mesh.swap_axis(axis),
            None => mesh,
        };

        let (min, max) = mesh.bounds();
        let zmin = options.zmin.unwrap_or(min.z).max(min.z);
        let zmax = options.zmax.unwrap_or(max.z).min(max.z);
        if !(zmin < zmax) {
            return Err(SliceError::EmptyRange {
                min: zmin,
                max: zmax,
            });
        }

        Ok(Self {
            options,
            mesh,
            zmin,
            zmax,
            progress: Progress::new(),
        })
    }

    /// Gets a handle to the slicing [`Progress`], counted in planes.
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    pub fn options(&self) -> &SliceOptions {
        &self.options
    }

    /// The planes [`Slicer::slice`] will cut at, in selection order.
    pub fn planes(&self) -> Vec<Plane> {
        let stats = ZStats::from_mesh(&self.mesh);
        select_planes(&self.options, &stats, self.zmin, self.zmax)
    }

    /// Slices every selected plane. `on_update` is called with the
    /// completed fraction after each plane.
    pub fn slice(&self, mut on_update: impl FnMut(f32)) -> SliceStack {
        let start = Instant::now();

        let planes = self.planes();
        let buckets = Buckets::from_mesh(&self.mesh);
        debug!(
            "Slicing {} planes with {} buckets",
            planes.len(),
            buckets.len()
        );

        self.progress.set_total(planes.len() as u64);
        let mut slices = Vec::with_capacity(planes.len());
        for (index, plane) in planes.iter().enumerate() {
            slices.push(self.slice_plane(&buckets, plane, index));

            self.progress.add_complete(1);
            on_update(self.progress.progress());
        }
        self.progress.set_finished();

        let polygons = slices.iter().map(|s| s.tops.len()).sum::<usize>();
        info!(
            "Sliced {} planes into {polygons} top polygons in {}",
            slices.len(),
            human_duration(start.elapsed())
        );

        SliceStack::new(slices)
    }

    fn slice_plane(&self, buckets: &Buckets, plane: &Plane, index: usize) -> Slice {
        let mut points = PointArena::default();
        let faces = buckets.faces_at(plane.z).iter().copied();
        let lines = intersect_plane(&self.mesh, faces, plane.z, &mut points);
        let lines = remove_duplicate_lines(lines, &points);

        let connector = Connector::new(
            &lines,
            &points,
            self.options.path_cap,
            self.options.bridge_gap,
        );
        let polygons = connector.connect();

        let mut slice = Slice::new(plane.z, index);
        slice.thickness = plane.thickness;
        slice.tops = nest(polygons, false, false);

        if self.options.topo {
            let lines = lines
                .iter()
                .map(|line| [*points.get(line.a), *points.get(line.b)])
                .collect();
            slice.lines = Some(lines);
        }

        if let Some(axis) = self.options.swap_axis {
            unswap_slice(axis, &mut slice);
        }

        slice
    }
}

fn validate_policy(policy: &ZPolicy) -> Result<(), SliceError> {
    let positive = |height: f64| match height.is_finite() && height > 0.0 {
        true => Ok(()),
        false => Err(SliceError::InvalidHeight(height)),
    };

    match policy {
        ZPolicy::Fixed {
            height,
            first_height,
        } => {
            positive(*height)?;
            first_height.map(positive).transpose()?;
        }
        ZPolicy::Adaptive {
            height,
            min_height,
            first_height,
        } => {
            positive(*height)?;
            positive(*min_height)?;
            first_height.map(positive).transpose()?;
        }
        ZPolicy::Auto { min_height } => {
            if !min_height.is_finite() || *min_height < 0.0 {
                return Err(SliceError::InvalidHeight(*min_height));
            }
        }
        ZPolicy::CamFlats { step, .. } => positive(*step)?,
        ZPolicy::Explicit { heights } => {
            if let Some(bad) = heights.iter().find(|z| !z.is_finite()) {
                return Err(SliceError::InvalidHeight(*bad));
            }
        }
    }

    Ok(())
}

fn unswap_slice(axis: Axis, slice: &mut Slice) {
    fn unswap_polygon(axis: Axis, polygon: &mut Polygon) {
        for point in polygon.points_mut().iter_mut() {
            *point = unswap(axis, point);
        }
        polygon
            .inner
            .iter_mut()
            .for_each(|inner| unswap_polygon(axis, inner));
    }

    slice
        .tops
        .iter_mut()
        .for_each(|top| unswap_polygon(axis, top));

    if let Some(lines) = &mut slice.lines {
        for line in lines.iter_mut() {
            *line = line.map(|point: Pos| unswap(axis, &point));
        }
    }
}

#[cfg(test)]
mod tests {
    use common::config::{Axis, SliceOptions, ZPolicy};

    use super::*;
    use crate::mesh::tests::cuboid;

    fn explicit(heights: &[f64]) -> SliceOptions {
        SliceOptions {
            policy: ZPolicy::Explicit {
                heights: heights.to_vec(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn prism_slices_to_one_square() {
        let mesh = cuboid(Pos::zeros(), Pos::repeat(10.0));
        let slicer = Slicer::new(mesh, explicit(&[5.0])).unwrap();

        let mut updates = Vec::new();
        let stack = slicer.slice(|fraction| updates.push(fraction));
        assert_eq!(updates, vec![1.0]);
        assert!(slicer.progress().complete());

        let slice = &stack.slices()[0];
        assert_eq!(slice.z, 5.0);
        assert_eq!(slice.tops.len(), 1);
        assert!(slice.tops[0].inner.is_empty());
        assert!((slice.area() - 100.0).abs() < 1e-6);
        assert!(slice.lines.is_none());
    }

    #[test]
    fn hollow_box_has_a_hole() {
        let outer = cuboid(Pos::zeros(), Pos::new(10.0, 10.0, 4.0));
        let inner = cuboid(Pos::new(3.0, 3.0, 0.0), Pos::new(7.0, 7.0, 4.0));
        let mesh = Mesh::from_triangles(
            outer
                .vertices()
                .iter()
                .chain(inner.vertices())
                .copied()
                .collect(),
        )
        .unwrap();

        let stack = Slicer::new(mesh, explicit(&[2.0])).unwrap().slice(|_| {});
        let slice = &stack.slices()[0];
        assert_eq!(slice.tops.len(), 1);
        assert_eq!(slice.tops[0].inner.len(), 1);
        assert!((slice.area() - 84.0).abs() < 1e-6);
    }

    #[test]
    fn fixed_layers_fill_the_range() {
        let mesh = cuboid(Pos::zeros(), Pos::new(10.0, 10.0, 2.0));
        let options = SliceOptions {
            policy: ZPolicy::Fixed {
                height: 0.5,
                first_height: None,
            },
            topo: true,
            ..Default::default()
        };

        let stack = Slicer::new(mesh, options).unwrap().slice(|_| {});
        assert_eq!(stack.len(), 4);
        for slice in stack.slices() {
            assert_eq!(slice.tops.len(), 1);
            assert_eq!(slice.lines.as_ref().map(Vec::len), Some(4));
        }
        assert_eq!(stack.slices()[1].down, Some(0));
        assert_eq!(stack.slices()[1].up, Some(2));
    }

    #[test]
    fn swapped_axis_maps_points_back() {
        let mesh = cuboid(Pos::zeros(), Pos::new(4.0, 10.0, 10.0));
        let options = SliceOptions {
            swap_axis: Some(Axis::X),
            ..explicit(&[2.0])
        };

        let stack = Slicer::new(mesh, options).unwrap().slice(|_| {});
        let top = &stack.slices()[0].tops[0];
        assert!(top.points().iter().all(|p| (p.x - 2.0).abs() < 1e-9));
    }

    #[test]
    fn bad_input_fails_before_work() {
        let mesh = cuboid(Pos::zeros(), Pos::repeat(10.0));

        let options = SliceOptions {
            policy: ZPolicy::Fixed {
                height: 0.0,
                first_height: None,
            },
            ..Default::default()
        };
        assert_eq!(
            Slicer::new(mesh.clone(), options).err(),
            Some(SliceError::InvalidHeight(0.0))
        );

        let options = SliceOptions {
            zmin: Some(8.0),
            zmax: Some(4.0),
            ..Default::default()
        };
        assert_eq!(
            Slicer::new(mesh, options).err(),
            Some(SliceError::EmptyRange { min: 8.0, max: 4.0 })
        );
    }
}
