use crate::Pos;

use super::precision::KEY_DECIMALS;

/// Identity of a point once its coordinates are rounded. Two points with the
/// same key are the same vertex when building slice graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointKey([i64; 3]);

impl PointKey {
    pub fn new(pos: &Pos) -> Self {
        let scale = 10f64.powi(KEY_DECIMALS);
        let round = |x: f64| (x * scale).round() as i64;
        Self([round(pos.x), round(pos.y), round(pos.z)])
    }
}

/// Planar helpers for points that live on a slice plane.
pub trait PlanePoint {
    fn key(&self) -> PointKey;
    fn dist_2d(&self, other: &Pos) -> f64;
    fn dist_sq_2d(&self, other: &Pos) -> f64;
    /// Point where the segment from `self` to `other` crosses height `z`.
    fn intersect_z(&self, other: &Pos, z: f64) -> Pos;
    /// Rounds the coordinates to the identity key precision.
    fn snapped(&self) -> Pos;
}

impl PlanePoint for Pos {
    fn key(&self) -> PointKey {
        PointKey::new(self)
    }

    fn dist_2d(&self, other: &Pos) -> f64 {
        self.dist_sq_2d(other).sqrt()
    }

    fn dist_sq_2d(&self, other: &Pos) -> f64 {
        let (dx, dy) = (self.x - other.x, self.y - other.y);
        dx * dx + dy * dy
    }

    fn intersect_z(&self, other: &Pos, z: f64) -> Pos {
        let t = (z - self.z) / (other.z - self.z);
        let mut out = self + t * (other - self);
        out.z = z;
        out
    }

    fn snapped(&self) -> Pos {
        let scale = 10f64.powi(KEY_DECIMALS);
        self.map(|x| (x * scale).round() / scale)
    }
}

/// Squared distance from `p` to the closest point of segment `a`-`b`.
pub fn dist_to_segment_sq(p: &Pos, a: &Pos, b: &Pos) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = dx * dx + dy * dy;
    if len == 0.0 {
        return p.dist_sq_2d(a);
    }

    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len).clamp(0.0, 1.0);
    let (x, y) = (a.x + t * dx, a.y + t * dy);
    (p.x - x).powi(2) + (p.y - y).powi(2)
}

/// Intersection of segments `p1`-`p2` and `s1`-`s2`, ends included.
pub fn segment_intersection(p1: &Pos, p2: &Pos, s1: &Pos, s2: &Pos) -> Option<Pos> {
    let (d1x, d1y) = (p2.x - p1.x, p2.y - p1.y);
    let (d2x, d2y) = (s2.x - s1.x, s2.y - s1.y);

    let denom = d2y * d1x - d2x * d1y;
    if denom == 0.0 {
        return None;
    }

    let ua = (d2x * (p1.y - s1.y) - d2y * (p1.x - s1.x)) / denom;
    let ub = (d1x * (p1.y - s1.y) - d1y * (p1.x - s1.x)) / denom;
    ((0.0..=1.0).contains(&ua) && (0.0..=1.0).contains(&ub))
        .then(|| Pos::new(p1.x + ua * d1x, p1.y + ua * d1y, p1.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_merge_close_points() {
        let a = Pos::new(1.0, 2.0, 3.0);
        let b = Pos::new(1.000_001, 2.0, 3.0);
        let c = Pos::new(1.0001, 2.0, 3.0);

        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn plane_crossing() {
        let over = Pos::new(0.0, 0.0, 10.0);
        let under = Pos::new(10.0, 0.0, 0.0);
        let hit = over.intersect_z(&under, 2.5);

        assert!((hit.x - 7.5).abs() < 1e-12);
        assert_eq!(hit.z, 2.5);
    }

    #[test]
    fn segment_distance_is_clamped() {
        let (a, b) = (Pos::new(0.0, 0.0, 0.0), Pos::new(10.0, 0.0, 0.0));
        assert_eq!(dist_to_segment_sq(&Pos::new(5.0, 2.0, 0.0), &a, &b), 4.0);
        assert_eq!(dist_to_segment_sq(&Pos::new(13.0, 4.0, 0.0), &a, &b), 25.0);
    }

    #[test]
    fn crossing_segments() {
        let hit = segment_intersection(
            &Pos::new(0.0, 0.0, 0.0),
            &Pos::new(2.0, 2.0, 0.0),
            &Pos::new(0.0, 2.0, 0.0),
            &Pos::new(2.0, 0.0, 0.0),
        );
        assert_eq!(hit, Some(Pos::new(1.0, 1.0, 0.0)));

        let miss = segment_intersection(
            &Pos::new(0.0, 0.0, 0.0),
            &Pos::new(1.0, 0.0, 0.0),
            &Pos::new(0.0, 1.0, 0.0),
            &Pos::new(1.0, 1.0, 0.0),
        );
        assert_eq!(miss, None);
    }
}
