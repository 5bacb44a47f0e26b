//! Export of slice stacks for inspection.

pub mod svg;
