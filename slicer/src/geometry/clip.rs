//! Polygon booleans and offsets.
//!
//! Booleans run through `i_overlay` and offsets through `cavalier_contours`.
//! Both work on plain contours so the backends can be swapped behind
//! [`Clipper`].

use std::f64::consts::PI;

use cavalier_contours::{
    polyline::{PlineSource, PlineSourceMut, Polyline},
    shape_algorithms::{Shape, ShapeOffsetOptions},
};
use i_overlay::{
    core::{fill_rule, overlay_rule::OverlayRule},
    float::single::SingleFloatOverlay,
};
use tracing::trace;

use super::{polygon::Polygon, precision};

/// A ring of XY points.
pub type Contour = Vec<[f64; 2]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipOp {
    Union,
    Difference,
    Intersection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    EvenOdd,
    NonZero,
}

pub trait Clipper {
    /// Runs a boolean, returning shapes as `[outer, holes..]`. `None` when
    /// the backend fails.
    fn boolean(
        &self,
        op: ClipOp,
        subject: &[Contour],
        clip: &[Contour],
        fill: FillRule,
    ) -> Option<Vec<Vec<Contour>>>;

    /// Offsets a shape given as outer rings (counter clockwise) and holes
    /// (clockwise). Positive distances shrink the shape.
    fn offset(&self, contours: &[Contour], delta: f64) -> Option<Vec<Contour>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayClipper;

impl Clipper for OverlayClipper {
    fn boolean(
        &self,
        op: ClipOp,
        subject: &[Contour],
        clip: &[Contour],
        fill: FillRule,
    ) -> Option<Vec<Vec<Contour>>> {
        let rule = match op {
            ClipOp::Union => OverlayRule::Union,
            ClipOp::Difference => OverlayRule::Difference,
            ClipOp::Intersection => OverlayRule::Intersect,
        };
        let fill = match fill {
            FillRule::EvenOdd => fill_rule::FillRule::EvenOdd,
            FillRule::NonZero => fill_rule::FillRule::NonZero,
        };

        let subject = subject.to_vec();
        let clip = clip.to_vec();
        let shapes = subject.overlay(&clip, rule, fill);

        Some(
            shapes
                .into_iter()
                .map(|shape| shape.into_iter().filter(|c| c.len() >= 3).collect::<Vec<_>>())
                .filter(|shape| !shape.is_empty())
                .collect(),
        )
    }

    fn offset(&self, contours: &[Contour], delta: f64) -> Option<Vec<Contour>> {
        let plines = contours
            .iter()
            .filter(|c| c.len() >= 3)
            .map(|contour| {
                let mut pline: Polyline<f64> = Polyline::new();
                for point in contour {
                    pline.add(point[0], point[1], 0.0);
                }
                pline.set_is_closed(true);
                pline
            })
            .collect::<Vec<_>>();

        if plines.is_empty() {
            return None;
        }

        let shape = Shape::from_plines(plines);
        let offset = shape.parallel_offset(delta, ShapeOffsetOptions::default());

        let out = offset
            .ccw_plines
            .iter()
            .chain(offset.cw_plines.iter())
            .map(|indexed| flatten_pline(&indexed.polyline))
            .filter(|c| c.len() >= 3)
            .collect::<Vec<_>>();
        Some(out)
    }
}

/// Converts a closed polyline into straight segments, replacing each bulged
/// segment with enough chords to stay within [`precision::ARC_FLATTEN`].
fn flatten_pline(pline: &Polyline<f64>) -> Contour {
    let count = pline.vertex_count();
    let mut out = Vec::with_capacity(count);

    for i in 0..count {
        let start = pline.at(i);
        let end = pline.at((i + 1) % count);
        out.push([start.x, start.y]);

        if start.bulge.abs() < 1e-9 {
            continue;
        }

        let bulge = start.bulge;
        let (dx, dy) = (end.x - start.x, end.y - start.y);
        let chord = dx.hypot(dy);
        if chord < 1e-12 {
            continue;
        }

        let k = (1.0 - bulge * bulge) / (4.0 * bulge);
        let center = [
            (start.x + end.x) / 2.0 - dy * k,
            (start.y + end.y) / 2.0 + dx * k,
        ];
        let radius = (start.x - center[0]).hypot(start.y - center[1]);
        let sweep = 4.0 * bulge.atan();

        let step = match radius > precision::ARC_FLATTEN {
            true => 2.0 * (1.0 - precision::ARC_FLATTEN / radius).acos(),
            false => PI,
        };
        let segments = (sweep.abs() / step).ceil().max(1.0) as usize;
        let start_angle = (start.y - center[1]).atan2(start.x - center[0]);

        for j in 1..segments {
            let angle = start_angle + sweep * j as f64 / segments as f64;
            out.push([
                center[0] + radius * angle.cos(),
                center[1] + radius * angle.sin(),
            ]);
        }
    }

    out
}

fn shapes_to_polygons(shapes: Vec<Vec<Contour>>, z: f64) -> Vec<Polygon> {
    shapes
        .into_iter()
        .filter_map(|shape| {
            let mut shape = shape.into_iter();
            let mut outer = Polygon::from_contour(&shape.next()?, z);
            outer.inner = shape.map(|hole| Polygon::from_contour(&hole, z)).collect();
            Some(outer)
        })
        .collect()
}

impl Polygon {
    fn dominant_fill_angle(&self, other: &Polygon) -> Option<f64> {
        match self.fill_angle {
            Some(angle) if self.area() > other.area() => Some(angle),
            _ => other.fill_angle,
        }
    }

    fn boolean_with(&self, clipper: &impl Clipper, other: &Polygon, op: ClipOp) -> Vec<Polygon> {
        let result = clipper.boolean(
            op,
            &self.to_contours(),
            &other.to_contours(),
            FillRule::EvenOdd,
        );

        let Some(shapes) = result else {
            trace!("{op:?} of polygons failed");
            return Vec::new();
        };

        let fill_angle = self.dominant_fill_angle(other);
        let mut out = shapes_to_polygons(shapes, self.z());
        out.iter_mut().for_each(|p| p.fill_angle = fill_angle);
        out
    }

    /// Merges two overlapping polygons. Returns `None` unless the result is
    /// a single polygon once slivers are dropped.
    pub fn union(&self, other: &Polygon) -> Option<Polygon> {
        self.union_with(&OverlayClipper, other)
    }

    pub fn union_with(&self, clipper: &impl Clipper, other: &Polygon) -> Option<Polygon> {
        if !self
            .bounds()
            .overlaps(&other.bounds(), precision::POLY_MERGE)
        {
            return None;
        }

        let mut out = self.boolean_with(clipper, other, ClipOp::Union);
        out.retain(|p| p.area() >= precision::UNION_SLIVER);
        match out.len() {
            1 => out.pop(),
            _ => None,
        }
    }

    /// This polygon with `other` removed. Holes end up in `inner`.
    pub fn diff(&self, other: &Polygon) -> Vec<Polygon> {
        self.diff_with(&OverlayClipper, other)
    }

    pub fn diff_with(&self, clipper: &impl Clipper, other: &Polygon) -> Vec<Polygon> {
        self.boolean_with(clipper, other, ClipOp::Difference)
    }

    /// The parts of this polygon covered by `other`.
    pub fn mask(&self, other: &Polygon) -> Vec<Polygon> {
        self.mask_with(&OverlayClipper, other)
    }

    pub fn mask_with(&self, clipper: &impl Clipper, other: &Polygon) -> Vec<Polygon> {
        self.boolean_with(clipper, other, ClipOp::Intersection)
    }

    /// Offsets the polygon and its holes. Positive distances shrink it. The
    /// result is `None` if the polygon collapses or is open.
    pub fn offset(&self, distance: f64) -> Option<Vec<Polygon>> {
        self.offset_with(&OverlayClipper, distance)
    }

    pub fn offset_with(&self, clipper: &impl Clipper, distance: f64) -> Option<Vec<Polygon>> {
        if self.is_open() || self.len() < 3 {
            return None;
        }

        let contours = clipper.offset(&self.to_contours(), distance)?;
        if contours.is_empty() {
            return None;
        }

        let z = self.z();
        let mut outers = Vec::new();
        let mut holes = Vec::new();
        for contour in contours {
            let poly = Polygon::from_contour(&contour, z);
            match poly.is_clockwise() {
                true => holes.push(poly),
                false => outers.push(poly),
            }
        }

        for hole in holes {
            let parent = outers
                .iter_mut()
                .filter(|outer| hole.is_inside(outer, precision::NESTED_SQ))
                .min_by(|a, b| a.area().total_cmp(&b.area()));
            if let Some(parent) = parent {
                parent.inner.push(hole);
            }
        }

        outers.iter_mut().for_each(|p| {
            p.fill_angle = self.fill_angle;
            p.depth = self.depth;
        });
        (!outers.is_empty()).then_some(outers)
    }
}

/// Unions a set of polygons with their holes into disjoint shapes.
pub fn union_all(polygons: &[Polygon]) -> Vec<Polygon> {
    union_all_with(&OverlayClipper, polygons)
}

pub fn union_all_with(clipper: &impl Clipper, polygons: &[Polygon]) -> Vec<Polygon> {
    let Some(first) = polygons.first() else {
        return Vec::new();
    };

    let subject = polygons
        .iter()
        .flat_map(Polygon::to_contours)
        .collect::<Vec<_>>();
    match clipper.boolean(ClipOp::Union, &subject, &[], FillRule::NonZero) {
        Some(shapes) => shapes_to_polygons(shapes, first.z()),
        None => Vec::new(),
    }
}
