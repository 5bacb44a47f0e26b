//! Mesh slicing and toolpath generation. A [`mesh::Mesh`] is cut into
//! [`slice::Slice`]s of nested [`geometry::Polygon`]s by the
//! [`slicer::Slicer`], which the [`toolpath`] module orders and turns into
//! a stream of motion commands.

use nalgebra::Vector3;
use thiserror::Error;

pub mod format;
pub mod geometry;
pub mod mesh;
pub mod slice;
pub mod slicer;
pub mod toolpath;

pub type Pos = Vector3<f64>;

/// Input that can not be sliced at all. Degenerate geometry found while
/// slicing is logged and skipped instead.
#[derive(Debug, Error, PartialEq)]
pub enum SliceError {
    #[error("mesh has no vertices")]
    EmptyMesh,
    #[error("vertex count {0} is not a multiple of 3")]
    PartialTriangle(usize),
    #[error("vertex {0} has a non-finite coordinate")]
    NonFinite(usize),
    #[error("face {face} references missing vertex {vertex}")]
    MissingVertex { face: usize, vertex: usize },
    #[error("layer height must be positive, got {0}")]
    InvalidHeight(f64),
    #[error("empty Z range {min}..{max}")]
    EmptyRange { min: f64, max: f64 },
}
