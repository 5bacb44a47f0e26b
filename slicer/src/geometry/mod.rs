//! Planar polygon kernel used by the slicer and the toolpath code.

pub mod bounds;
pub mod clip;
pub mod nest;
pub mod point;
pub mod polygon;
pub mod precision;

pub use bounds::Bounds;
pub use clip::{union_all, union_all_with, ClipOp, Clipper, FillRule, OverlayClipper};
pub use nest::{nest, Forest};
pub use point::{PlanePoint, PointKey};
pub use polygon::{flatten, Closest, Polygon};
