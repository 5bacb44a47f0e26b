//! Fixed tolerances used by the polygon kernel and the slicer.

/// Vertices closer than this to a plane are on it.
pub const SLICE_Z: f64 = 0.0001;
/// Decimal places of the point identity key.
pub const KEY_DECIMALS: i32 = 5;
/// Grace applied to bounds when checking if one box nests in another.
pub const BOUNDS: f64 = 0.0001;
/// Squared distance under which a sample counts as on a polygon's edge.
pub const CLOSE_TO_POLY_SQ: f64 = 0.001 * 0.001;
/// Segments longer than this also have their midpoint sampled.
pub const MIDPOINT_CHECK_DIST: f64 = 1.0;
/// Squared tolerance used when nesting polygons.
pub const NESTED_SQ: f64 = 0.01 * 0.01;
pub const POLY_AREA: f64 = 0.05;
pub const POLY_BOUNDS: f64 = 0.01;
pub const POLY_MERGE: f64 = 0.05;
pub const CIRCULARITY: f64 = 0.001;
/// Collinear cross product limit when merging slice lines.
pub const COLLINEAR: f64 = 0.0001;
/// Points closer than this are merged by [`super::Polygon::clean`].
pub const CLEAN: f64 = 0.0025;
/// Squared distance between the ends of a bridged path that closes it.
pub const CLOSE_LOOP_SQ: f64 = 0.01;
/// Pieces smaller than this are dropped from a union result.
pub const UNION_SLIVER: f64 = 0.1;
/// Maximum chord error when flattening offset arcs.
pub const ARC_FLATTEN: f64 = 0.01;
