use std::{cell::Cell, f64::consts::PI};

use crate::Pos;

use super::{
    bounds::Bounds,
    point::{dist_to_segment_sq, segment_intersection, PlanePoint},
    precision,
};

/// An ordered ring (or open run) of points in a slice plane. Closed unless
/// marked open. Children in `inner` are the polygons directly nested inside
/// this one, holes for a top level polygon.
///
/// The signed area and bounds are cached. Any access that can change the
/// points goes through a method that drops the caches.
#[derive(Debug, Clone, Default)]
pub struct Polygon {
    points: Vec<Pos>,
    open: bool,

    pub inner: Vec<Polygon>,
    /// Nesting depth assigned by [`super::nest`].
    pub depth: usize,
    /// Preferred fill direction in degrees.
    pub fill_angle: Option<f64>,

    area2: Cell<Option<f64>>,
    bounds: Cell<Option<Bounds>>,
}

/// Result of [`Polygon::find_closest_point_to`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Closest {
    pub point: Pos,
    pub index: usize,
    pub distance: f64,
}

impl Polygon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<Pos>) -> Self {
        Self {
            points,
            ..Default::default()
        }
    }

    pub fn from_xy(points: &[(f64, f64)], z: f64) -> Self {
        Self::from_points(points.iter().map(|&(x, y)| Pos::new(x, y, z)).collect())
    }

    pub fn with_open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    pub fn set_open(&mut self, open: bool) {
        self.open = open;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn points(&self) -> &[Pos] {
        &self.points
    }

    /// Mutable access to the points. The cached area and bounds are
    /// dropped up front since the caller may change anything.
    pub fn points_mut(&mut self) -> &mut Vec<Pos> {
        self.invalidate();
        &mut self.points
    }

    pub fn into_points(self) -> Vec<Pos> {
        self.points
    }

    pub fn push(&mut self, point: Pos) {
        self.invalidate();
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&Pos> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&Pos> {
        self.points.last()
    }

    /// Z of the plane this polygon lies in.
    pub fn z(&self) -> f64 {
        self.points.first().map_or(0.0, |p| p.z)
    }

    fn invalidate(&mut self) {
        self.area2.set(None);
        self.bounds.set(None);
    }

    /// Signed double area from the shoelace sum. Positive when clockwise.
    pub fn signed_area2(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }

        if let Some(area2) = self.area2.get() {
            return area2;
        }

        let area2 = self
            .segments_closed()
            .map(|(a, b)| (b.x - a.x) * (b.y + a.y))
            .sum();
        self.area2.set(Some(area2));
        area2
    }

    /// Enclosed area.
    pub fn area(&self) -> f64 {
        (self.signed_area2() / 2.0).abs()
    }

    /// Area with the area of direct children removed.
    pub fn area_deep(&self) -> f64 {
        self.area() - self.inner.iter().map(Polygon::area).sum::<f64>()
    }

    pub fn is_clockwise(&self) -> bool {
        self.signed_area2() > 0.0
    }

    /// Reverses the point order. The cached area only changes sign.
    pub fn reverse(&mut self) {
        self.points.reverse();
        if let Some(area2) = self.area2.get() {
            self.area2.set(Some(-area2));
        }
    }

    pub fn set_clockwise(&mut self) -> &mut Self {
        if !self.is_clockwise() {
            self.reverse();
        }
        self
    }

    pub fn set_counter_clockwise(&mut self) -> &mut Self {
        if self.is_clockwise() {
            self.reverse();
        }
        self
    }

    pub fn bounds(&self) -> Bounds {
        if let Some(bounds) = self.bounds.get() {
            return bounds;
        }

        let bounds = Bounds::from_points(&self.points);
        self.bounds.set(Some(bounds));
        bounds
    }

    pub fn translate(&mut self, offset: Pos) {
        self.points_mut().iter_mut().for_each(|p| *p += offset);
        self.inner.iter_mut().for_each(|p| p.translate(offset));
    }

    /// Scales about the origin in XY.
    pub fn scale(&mut self, factor: f64) {
        self.points_mut().iter_mut().for_each(|p| {
            p.x *= factor;
            p.y *= factor;
        });
        self.inner.iter_mut().for_each(|p| p.scale(factor));
    }

    /// Each edge as a pair of points, including the closing edge.
    fn segments_closed(&self) -> impl Iterator<Item = (&Pos, &Pos)> {
        let next = self.points.iter().cycle().skip(1);
        self.points.iter().zip(next)
    }

    /// Each edge as a pair of points. Open polygons have no closing edge.
    pub fn segments(&self) -> impl Iterator<Item = (&Pos, &Pos)> {
        let count = match self.open {
            true => self.points.len().saturating_sub(1),
            false => self.points.len(),
        };
        self.segments_closed().take(count)
    }

    /// Walks every point once starting at `start`. Closed polygons return to
    /// the start point when `close` is set.
    pub fn walk_from(&self, start: usize, close: bool) -> impl Iterator<Item = &Pos> {
        let len = self.points.len();
        let count = if close && len > 0 { len + 1 } else { len };
        (0..count).map(move |i| &self.points[(start + i) % len])
    }

    pub fn perimeter(&self) -> f64 {
        self.segments().map(|(a, b)| a.dist_2d(b)).sum()
    }

    /// 1.0 for a perfect circle, approaching 0.0 for a sliver.
    pub fn circularity(&self) -> f64 {
        let perimeter = self.perimeter();
        if perimeter == 0.0 {
            return 0.0;
        }

        4.0 * PI * self.area() / (perimeter * perimeter)
    }

    /// Ray crossing test.
    pub fn in_polygon(&self, point: &Pos) -> bool {
        if !self.bounds().contains_xy(point.x, point.y) {
            return false;
        }

        let mut inside = false;
        for (a, b) in self.segments_closed() {
            if (a.y > point.y) != (b.y > point.y)
                && point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x
            {
                inside = !inside;
            }
        }

        inside
    }

    /// True if `point` is within the squared distance of any edge.
    pub fn near_polygon(&self, point: &Pos, dist_sq: f64) -> bool {
        self.segments()
            .any(|(a, b)| dist_to_segment_sq(point, a, b) <= dist_sq)
    }

    fn inside_or_near(&self, point: &Pos, dist_sq: f64) -> bool {
        self.in_polygon(point) || self.near_polygon(point, dist_sq)
    }

    /// True if every sampled point of this polygon is inside `other` or
    /// within `tolerance` (squared) of its edge. Long edges are also checked
    /// at their midpoint.
    pub fn is_inside(&self, other: &Polygon, tolerance: f64) -> bool {
        if !self.bounds().is_nested(&other.bounds(), tolerance * 3.0) {
            return false;
        }

        self.segments().all(|(prev, next)| {
            if prev.dist_2d(next) > precision::MIDPOINT_CHECK_DIST {
                let mid = (prev + next) / 2.0;
                if !other.inside_or_near(&mid, tolerance) {
                    return false;
                }
            }

            other.inside_or_near(next, tolerance)
        })
    }

    /// True if `other` is inside this polygon but not inside any of its
    /// children.
    pub fn contains(&self, other: &Polygon, tolerance: f64) -> bool {
        other.is_inside(self, tolerance)
            && !self
                .inner
                .iter()
                .any(|child| other.is_inside(child, tolerance))
    }

    pub fn is_nested(&self, parent: &Polygon) -> bool {
        parent.bounds().contains(&self.bounds()) && self.is_inside(parent, precision::NESTED_SQ)
    }

    /// Approximate equality of two polygons that may have been tessellated
    /// differently.
    pub fn is_equivalent(&self, other: &Polygon, recurse: bool, precision: Option<f64>) -> bool {
        let area_tolerance = precision.unwrap_or(precision::POLY_AREA);
        let bounds_tolerance = precision.unwrap_or(precision::POLY_BOUNDS);

        if (self.area() - other.area()).abs() > area_tolerance
            || !self.bounds().equals(&other.bounds(), bounds_tolerance)
        {
            return false;
        }

        let (c1, c2) = (self.circularity(), other.circularity());
        if (c1 - c2).abs() < precision::CIRCULARITY && 1.0 - c1 < precision::CIRCULARITY {
            return true;
        }

        if recurse
            && (self.inner.len() != other.inner.len()
                || self
                    .inner
                    .iter()
                    .zip(&other.inner)
                    .any(|(a, b)| !a.is_equivalent(b, false, None)))
        {
            return false;
        }

        let merge_sq = precision::POLY_MERGE * precision::POLY_MERGE;
        self.points.iter().all(|point| {
            other
                .segments()
                .any(|(a, b)| dist_to_segment_sq(point, a, b) < merge_sq)
        })
    }

    pub fn find_closest_point_to(&self, target: &Pos) -> Option<Closest> {
        let mut closest: Option<Closest> = None;
        for (index, point) in self.points.iter().enumerate() {
            let distance = point.dist_2d(target);
            if closest.map_or(true, |c| distance < c.distance) {
                closest = Some(Closest {
                    point: *point,
                    index,
                    distance,
                });
            }
        }

        closest
    }

    /// Smallest distance from any vertex of this polygon to an edge of
    /// `other`.
    pub fn min_offset_to(&self, other: &Polygon) -> f64 {
        self.points
            .iter()
            .flat_map(|p| other.segments().map(move |(a, b)| dist_to_segment_sq(p, a, b)))
            .fold(f64::INFINITY, f64::min)
            .sqrt()
    }

    /// Points where the segment `p1`-`p2` crosses this polygon's edges,
    /// closest to `p1` first. Children are included when `deep` is set.
    pub fn intersections(&self, p1: &Pos, p2: &Pos, deep: bool) -> Vec<Pos> {
        let mut out = self
            .segments()
            .filter_map(|(a, b)| segment_intersection(p1, p2, a, b))
            .collect::<Vec<_>>();

        if deep {
            for child in &self.inner {
                out.extend(child.intersections(p1, p2, true));
            }
        }

        out.sort_by(|a, b| a.dist_sq_2d(p1).total_cmp(&b.dist_sq_2d(p1)));
        out
    }

    pub fn intersects_segment(&self, p1: &Pos, p2: &Pos) -> bool {
        self.segments()
            .any(|(a, b)| segment_intersection(p1, p2, a, b).is_some())
    }

    /// Drops points closer than `distance` to their neighbour and points
    /// that lie within `distance` of the line through their neighbours.
    /// Open polygons keep both end points.
    pub fn clean(&mut self, distance: f64) {
        let dist_sq = distance * distance;
        let count = self.points.len();
        let mut out: Vec<Pos> = Vec::with_capacity(count);

        for (i, &point) in self.points.iter().enumerate() {
            if let Some(top) = out.last() {
                if top.dist_sq_2d(&point) <= dist_sq {
                    if self.open && i + 1 == count && out.len() > 1 {
                        out.pop();
                    } else {
                        continue;
                    }
                }
            }

            while out.len() >= 2
                && dist_to_segment_sq(&out[out.len() - 1], &out[out.len() - 2], &point) < dist_sq
            {
                out.pop();
            }
            out.push(point);
        }

        if !self.open {
            loop {
                let len = out.len();
                if len < 3 {
                    break;
                }

                let (first, last) = (out[0], out[len - 1]);
                if last.dist_sq_2d(&first) <= dist_sq
                    || dist_to_segment_sq(&last, &out[len - 2], &first) < dist_sq
                {
                    out.pop();
                } else if dist_to_segment_sq(&first, &last, &out[1]) < dist_sq {
                    out.remove(0);
                } else {
                    break;
                }
            }
        }

        if out.len() != count {
            *self.points_mut() = out;
        }
    }

    /// Contours of this polygon and its direct children, ready for a
    /// clipper. Outer rings are counter clockwise and holes clockwise.
    pub fn to_contours(&self) -> Vec<Vec<[f64; 2]>> {
        let mut out = Vec::with_capacity(1 + self.inner.len());
        out.push(self.oriented_contour(false));
        for child in &self.inner {
            out.push(child.oriented_contour(true));
        }
        out
    }

    fn oriented_contour(&self, clockwise: bool) -> Vec<[f64; 2]> {
        let mut contour = self.points.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>();
        if self.is_clockwise() != clockwise {
            contour.reverse();
        }
        contour
    }

    /// Builds a polygon at height `z` from a clipper contour.
    pub fn from_contour(contour: &[[f64; 2]], z: f64) -> Self {
        Self::from_points(contour.iter().map(|p| Pos::new(p[0], p[1], z)).collect())
    }
}

/// Every polygon of a forest, parents before their children.
pub fn flatten(polygons: &[Polygon]) -> Vec<&Polygon> {
    let mut out = Vec::new();
    let mut stack = polygons.iter().rev().collect::<Vec<_>>();
    while let Some(poly) = stack.pop() {
        out.push(poly);
        stack.extend(poly.inner.iter().rev());
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use proptest::prelude::*;

    use super::*;

    pub fn rect(x: f64, y: f64, w: f64, h: f64) -> Polygon {
        Polygon::from_xy(&[(x, y), (x + w, y), (x + w, y + h), (x, y + h)], 0.0)
    }

    pub fn circle(x: f64, y: f64, r: f64, steps: usize) -> Polygon {
        let points = (0..steps)
            .map(|i| {
                let a = i as f64 / steps as f64 * 2.0 * PI;
                Pos::new(x + r * a.cos(), y + r * a.sin(), 0.0)
            })
            .collect();
        Polygon::from_points(points)
    }

    #[test]
    fn winding_and_area() {
        let mut square = rect(0.0, 0.0, 10.0, 10.0);
        assert!(!square.is_clockwise());
        assert_eq!(square.area(), 100.0);

        square.set_clockwise();
        assert!(square.is_clockwise());
        assert_eq!(square.signed_area2(), 200.0);
    }

    #[test]
    fn mutation_drops_cached_area() {
        let mut square = rect(0.0, 0.0, 10.0, 10.0);
        assert_eq!(square.area(), 100.0);

        square.points_mut()[2].x = 20.0;
        assert_eq!(square.area(), 150.0);

        square.push(Pos::new(-5.0, 5.0, 0.0));
        assert_eq!(square.bounds().min.x, -5.0);

        square.scale(2.0);
        assert_eq!(square.bounds().max.x, 40.0);
    }

    #[test]
    fn open_perimeter_skips_closing_edge() {
        let square = rect(0.0, 0.0, 1.0, 1.0);
        assert_eq!(square.perimeter(), 4.0);
        assert_eq!(square.clone().with_open(true).perimeter(), 3.0);
    }

    #[test]
    fn containment_respects_holes() {
        let mut outer = rect(0.0, 0.0, 10.0, 10.0);
        outer.inner.push(rect(2.0, 2.0, 6.0, 6.0));

        let in_hole = rect(3.0, 3.0, 1.0, 1.0);
        let in_ring = rect(0.5, 0.5, 1.0, 1.0);

        assert!(in_hole.is_inside(&outer, precision::CLOSE_TO_POLY_SQ));
        assert!(!outer.contains(&in_hole, precision::CLOSE_TO_POLY_SQ));
        assert!(outer.contains(&in_ring, precision::CLOSE_TO_POLY_SQ));
    }

    #[test]
    fn long_edges_sample_midpoints() {
        // A notch cuts across the middle of the candidate's long bottom edge
        // without covering any of its vertices.
        let container = Polygon::from_xy(
            &[
                (0.0, 0.0),
                (4.0, 0.0),
                (5.0, 3.0),
                (6.0, 0.0),
                (10.0, 0.0),
                (10.0, 10.0),
                (0.0, 10.0),
            ],
            0.0,
        );
        let candidate = rect(1.0, 1.0, 8.0, 8.0);
        assert!(!candidate.is_inside(&container, precision::CLOSE_TO_POLY_SQ));
        assert!(rect(1.0, 4.0, 8.0, 5.0).is_inside(&container, precision::CLOSE_TO_POLY_SQ));
    }

    #[test]
    fn circles_of_different_resolution_are_equivalent() {
        let coarse = circle(0.0, 0.0, 5.0, 360);
        let fine = circle(0.0, 0.0, 5.0, 720);
        assert!(coarse.is_equivalent(&fine, false, None));
        assert!(!coarse.is_equivalent(&circle(1.0, 0.0, 5.0, 360), false, None));
        assert!(rect(0.0, 0.0, 4.0, 4.0).is_equivalent(&rect(0.0, 0.0, 4.0, 4.0), true, None));
    }

    #[test]
    fn closest_point() {
        let square = rect(0.0, 0.0, 10.0, 10.0);
        let closest = square.find_closest_point_to(&Pos::new(11.0, 9.0, 0.0)).unwrap();
        assert_eq!(closest.index, 2);
        assert_eq!(closest.point, Pos::new(10.0, 10.0, 0.0));
        assert!(Polygon::new().find_closest_point_to(&Pos::zeros()).is_none());
    }

    #[test]
    fn clean_removes_collinear_points() {
        let mut poly = Polygon::from_xy(
            &[
                (0.0, 0.0),
                (5.0, 0.0),
                (10.0, 0.0),
                (10.0, 10.0),
                (10.0, 10.001),
                (0.0, 10.0),
                (0.0, 5.0),
            ],
            0.0,
        );
        poly.clean(precision::CLEAN);
        assert_eq!(poly.len(), 4);
        assert!((poly.area() - 100.0).abs() < 0.01);

        let mut open = Polygon::from_xy(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)], 0.0).with_open(true);
        open.clean(precision::CLEAN);
        assert_eq!(open.points(), &[Pos::zeros(), Pos::new(2.0, 0.0, 0.0)]);
    }

    #[test]
    fn walk_wraps_around() {
        let square = rect(0.0, 0.0, 1.0, 1.0);
        let walked = square.walk_from(2, true).copied().collect::<Vec<_>>();
        assert_eq!(walked.len(), 5);
        assert_eq!(walked[0], walked[4]);
        assert_eq!(walked[1], Pos::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn flatten_lists_parents_first() {
        let mut outer = rect(0.0, 0.0, 10.0, 10.0);
        let mut hole = rect(1.0, 1.0, 8.0, 8.0);
        hole.inner.push(rect(2.0, 2.0, 1.0, 1.0));
        outer.inner.push(hole);

        let flat = flatten(std::slice::from_ref(&outer));
        let areas = flat.iter().map(|p| p.area()).collect::<Vec<_>>();
        assert_eq!(areas, vec![100.0, 64.0, 1.0]);
    }

    prop_compose! {
        fn arb_star()(radii in prop::collection::vec(1.0..10.0f64, 3..40), x in -50.0..50.0f64, y in -50.0..50.0f64) -> Polygon {
            let steps = radii.len();
            let points = radii
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    let a = i as f64 / steps as f64 * 2.0 * PI;
                    Pos::new(x + r * a.cos(), y + r * a.sin(), 0.0)
                })
                .collect();
            Polygon::from_points(points)
        }
    }

    proptest! {
        #[test]
        fn reverse_flips_sign_only(poly in arb_star()) {
            let mut poly = poly;
            let (signed, area) = (poly.signed_area2(), poly.area());
            poly.reverse();

            prop_assert_eq!(poly.signed_area2(), -signed);
            prop_assert_eq!(poly.area(), area);

            // The negated cache agrees with a fresh shoelace sum.
            let fresh = Polygon::from_points(poly.points().to_vec());
            prop_assert!((fresh.signed_area2() + signed).abs() < 1e-9 * signed.abs().max(1.0));
        }
    }
}
