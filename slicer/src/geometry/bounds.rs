use nalgebra::Vector2;

use crate::Pos;

use super::precision;

/// Axis aligned box in the XY plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vector2<f64>,
    pub max: Vector2<f64>,
}

impl Bounds {
    pub fn empty() -> Self {
        Self {
            min: Vector2::repeat(f64::MAX),
            max: Vector2::repeat(f64::MIN),
        }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Pos>) -> Self {
        points.into_iter().fold(Self::empty(), |mut bounds, point| {
            bounds.include(point);
            bounds
        })
    }

    pub fn include(&mut self, point: &Pos) {
        self.min = self.min.inf(&point.xy());
        self.max = self.max.sup(&point.xy());
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Vector2<f64> {
        (self.min + self.max) / 2.0
    }

    /// True if this box fits inside `parent` grown by `grace`.
    pub fn is_nested(&self, parent: &Bounds, grace: f64) -> bool {
        self.min.x >= parent.min.x - grace
            && self.max.x <= parent.max.x + grace
            && self.min.y >= parent.min.y - grace
            && self.max.y <= parent.max.y + grace
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        other.is_nested(self, precision::BOUNDS)
    }

    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.min.x && x <= self.max.x && y >= self.min.y && y <= self.max.y
    }

    /// Every edge within `margin` of the matching edge of `other`.
    pub fn equals(&self, other: &Bounds, margin: f64) -> bool {
        (self.min - other.min).abs().max() <= margin && (self.max - other.max).abs().max() <= margin
    }

    pub fn overlaps(&self, other: &Bounds, precision: f64) -> bool {
        let delta = (self.center() - other.center()).abs() * 2.0;
        delta.x - precision < self.width() + other.width()
            && delta.y - precision < self.height() + other.height()
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Bounds {
        Bounds::from_points(&[Pos::new(x, y, 0.0), Pos::new(x + size, y + size, 0.0)])
    }

    #[test]
    fn nesting_with_grace() {
        let outer = square(0.0, 0.0, 10.0);
        let inner = square(2.0, 2.0, 2.0);
        let edge = square(-0.00005, 0.0, 10.0);

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&edge));
        assert!(!outer.contains(&square(-0.1, 0.0, 10.0)));
    }

    #[test]
    fn overlap() {
        let a = square(0.0, 0.0, 10.0);
        assert!(a.overlaps(&square(5.0, 5.0, 10.0), 0.0));
        assert!(!a.overlaps(&square(20.0, 0.0, 5.0), 0.0));
        assert!(Bounds::empty().is_empty());
    }
}
