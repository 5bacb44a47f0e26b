//! Ordering of slice polygons into tool paths and conversion of those paths
//! into a motion stream.

use common::config::ToolpathConfig;
use tracing::debug;

use crate::{
    geometry::{precision, PlanePoint},
    slice::{SliceStack, Terrain},
    Pos,
};

mod arc;
mod order;
mod output;
mod pool;

pub use arc::{center2d, center2pr, emit_motion, theta_diff, ArcEmitter, Circle, Motion};
pub use order::{poly2poly, tip2tip, Visit};
pub use output::{visit_points, EmitContext, MoveRecord};
pub use pool::{depth_first, Pools};

/// Cuts every slice of `stack` from the top down, finishing each pocket
/// through all its layers before moving on. Long travel moves rise over
/// any part of the stack in their way.
pub fn stack_records(stack: &SliceStack, config: &ToolpathConfig, start: Pos) -> Vec<MoveRecord> {
    let layers = stack
        .iter_down()
        .map(|slice| slice.tops.clone())
        .collect::<Vec<_>>();
    let terrain = Terrain::from_stack(stack);

    let mut ctx = EmitContext::new(0, config.retract_over, config.emit.seek_rate);
    let radius = config.tool_diameter / 2.0;
    let mut moves = 0;

    depth_first(&layers, start, config.tool_diameter, |_, poly, visit| {
        let entry = visit_points(poly, &visit).first().copied()?;

        if let Some(last) = ctx.last_point() {
            let far = last.dist_2d(&entry) > config.retract_over;
            let steep = (last.z - entry.z).abs() > radius;
            if far || steep {
                let z = last.z.max(entry.z);
                let clear = terrain.clearance_z(&last, &entry, z, 0.0, radius, config.travel_clearance);
                if clear > entry.z + precision::SLICE_Z {
                    ctx.travel(Pos::new(last.x, last.y, clear));
                    ctx.travel(Pos::new(entry.x, entry.y, clear));
                }
            }
        }

        moves += 1;
        Some(ctx.poly_print_path(poly, &visit, 1.0, config.emit.feed_rate))
    });

    debug!("Ordered {moves} paths over {} layers", layers.len());
    ctx.into_records()
}

#[cfg(test)]
mod tests {
    use common::config::{SliceOptions, ZPolicy};

    use super::*;
    use crate::{
        mesh::{tests::cuboid, Mesh},
        slicer::Slicer,
    };

    fn posts() -> SliceStack {
        let left = cuboid(Pos::zeros(), Pos::new(2.0, 2.0, 4.0));
        let right = cuboid(Pos::new(10.0, 0.0, 0.0), Pos::new(12.0, 2.0, 4.0));
        let mesh = Mesh::from_triangles(
            left.vertices()
                .iter()
                .chain(right.vertices())
                .copied()
                .collect(),
        )
        .unwrap();

        let options = SliceOptions {
            policy: ZPolicy::Explicit {
                heights: vec![1.0, 3.0],
            },
            ..Default::default()
        };
        Slicer::new(mesh, options).unwrap().slice(|_| {})
    }

    #[test]
    fn every_polygon_is_cut_once() {
        let config = ToolpathConfig::default();
        let records = stack_records(&posts(), &config, Pos::zeros());

        // Four closed squares, each one travel and four cuts.
        assert_eq!(records.iter().filter(|r| !r.is_travel()).count(), 16);
        assert!(records.first().is_some_and(|r| r.is_travel()));
    }

    #[test]
    fn travel_rises_over_the_part() {
        let config = ToolpathConfig::default();
        let records = stack_records(&posts(), &config, Pos::zeros());

        // Moving from the bottom of one post to the top of the other has to
        // clear the top layer.
        let highest = records
            .iter()
            .filter(|r| r.is_travel())
            .map(|r| r.point.z)
            .fold(f64::MIN, f64::max);
        assert!(highest >= 3.0 + config.travel_clearance - 1e-9);

        let motions = emit_motion(&config.emit, &records);
        assert!(motions.len() >= records.len());
    }
}
