use std::{
    collections::HashMap,
    io::{Read, Seek},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use common::config::Axis;
use tracing::{debug, warn};

use crate::{geometry::PointKey, Pos, SliceError};

/// A triangle soup. Every three consecutive vertices form one face. The
/// vertex buffer is shared so cloning a mesh is cheap.
#[derive(Debug, Clone)]
pub struct Mesh {
    inner: Arc<MeshInner>,
    bounds: (Pos, Pos),
}

#[derive(Debug)]
struct MeshInner {
    vertices: Box<[Pos]>,
}

impl Mesh {
    /// Creates a mesh from a flat list of triangle vertices.
    pub fn from_triangles(vertices: Vec<Pos>) -> Result<Self, SliceError> {
        if vertices.is_empty() {
            return Err(SliceError::EmptyMesh);
        }

        if vertices.len() % 3 != 0 {
            return Err(SliceError::PartialTriangle(vertices.len()));
        }

        if let Some(bad) = vertices.iter().position(|v| !v.iter().all(|c| c.is_finite())) {
            return Err(SliceError::NonFinite(bad));
        }

        let bounds = vertex_bounds(&vertices);
        Ok(Self {
            inner: Arc::new(MeshInner {
                vertices: vertices.into_boxed_slice(),
            }),
            bounds,
        })
    }

    /// Expands an indexed mesh into a triangle soup.
    pub fn from_indexed(vertices: &[Pos], faces: &[[u32; 3]]) -> Result<Self, SliceError> {
        let mut soup = Vec::with_capacity(faces.len() * 3);
        for (face, indices) in faces.iter().enumerate() {
            for &vertex in indices {
                let vertex = vertex as usize;
                let point = vertices
                    .get(vertex)
                    .ok_or(SliceError::MissingVertex { face, vertex })?;
                soup.push(*point);
            }
        }

        Self::from_triangles(soup)
    }

    pub fn vertices(&self) -> &[Pos] {
        self.inner.vertices.as_ref()
    }

    pub fn face_count(&self) -> usize {
        self.vertices().len() / 3
    }

    pub fn face(&self, index: usize) -> [Pos; 3] {
        let v = &self.vertices()[index * 3..index * 3 + 3];
        [v[0], v[1], v[2]]
    }

    pub fn faces(&self) -> impl Iterator<Item = [Pos; 3]> + '_ {
        self.vertices().chunks_exact(3).map(|v| [v[0], v[1], v[2]])
    }

    /// Get the minimum and maximum of each component of every vertex in the
    /// mesh. These points define its bounding box.
    pub fn bounds(&self) -> (Pos, Pos) {
        self.bounds
    }

    /// Returns a copy of the mesh with `axis` exchanged for Z. Points sliced
    /// from the copy are mapped back with [`unswap`].
    pub fn swap_axis(&self, axis: Axis) -> Self {
        let vertices = self
            .vertices()
            .iter()
            .map(|v| swap(axis, v))
            .collect::<Vec<_>>();

        let bounds = vertex_bounds(&vertices);
        debug!("Swapped {axis:?} with Z, new bounds {bounds:?}");
        Self {
            inner: Arc::new(MeshInner {
                vertices: vertices.into_boxed_slice(),
            }),
            bounds,
        }
    }

    /// True if every edge is shared by exactly two faces.
    pub fn is_manifold(&self) -> bool {
        let mut edges = HashMap::<_, u8>::new();

        for [a, b, c] in self.faces() {
            let (a, b, c) = (PointKey::new(&a), PointKey::new(&b), PointKey::new(&c));
            for (a, b) in [(a, b), (b, c), (c, a)] {
                *edges.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }

        edges.values().all(|&count| count == 2)
    }
}

fn swap(axis: Axis, v: &Pos) -> Pos {
    match axis {
        Axis::X => Pos::new(v.z, v.y, v.x),
        Axis::Y => Pos::new(v.x, v.z, v.y),
    }
}

/// Maps a point from a mesh produced by [`Mesh::swap_axis`] back into the
/// original frame.
pub fn unswap(axis: Axis, point: &Pos) -> Pos {
    swap(axis, point)
}

fn vertex_bounds(vertices: &[Pos]) -> (Pos, Pos) {
    vertices.iter().fold(
        (Pos::repeat(f64::MAX), Pos::repeat(f64::MIN)),
        |(min, max), v| (min.inf(v), max.sup(v)),
    )
}

/// Loads a mesh from a reader. Only `stl` (binary or ASCII) is supported.
pub fn load_mesh<T: Read + Seek>(mut reader: T, format: &str) -> Result<Mesh> {
    let format = format.to_ascii_lowercase();
    if format != "stl" {
        bail!("unsupported mesh format `{format}`");
    }

    let stl = stl_io::read_stl(&mut reader).context("Failed to parse STL")?;
    let vertices = stl
        .vertices
        .iter()
        .map(|v| Pos::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect::<Vec<_>>();
    let faces = stl
        .faces
        .iter()
        .map(|f| f.vertices.map(|i| i as u32))
        .collect::<Vec<_>>();

    let mesh = Mesh::from_indexed(&vertices, &faces)?;
    if !mesh.is_manifold() {
        warn!("Mesh is not manifold, slices may contain open paths");
    }

    Ok(mesh)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use super::*;

    /// Axis aligned box as twelve triangles.
    pub fn cuboid(min: Pos, max: Pos) -> Mesh {
        let corner = |i: usize| {
            Pos::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            )
        };
        let vertices = (0..8).map(corner).collect::<Vec<_>>();
        let faces = [
            [0, 2, 1],
            [1, 2, 3],
            [4, 5, 6],
            [5, 7, 6],
            [0, 1, 4],
            [1, 5, 4],
            [2, 6, 3],
            [3, 6, 7],
            [0, 4, 2],
            [2, 4, 6],
            [1, 3, 5],
            [3, 7, 5],
        ];
        Mesh::from_indexed(&vertices, &faces).unwrap()
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            Mesh::from_triangles(Vec::new()).unwrap_err(),
            SliceError::EmptyMesh
        );
        assert_eq!(
            Mesh::from_triangles(vec![Pos::zeros(); 4]).unwrap_err(),
            SliceError::PartialTriangle(4)
        );

        let mut bad = vec![Pos::zeros(); 3];
        bad[1].y = f64::NAN;
        assert_eq!(
            Mesh::from_triangles(bad).unwrap_err(),
            SliceError::NonFinite(1)
        );

        assert_eq!(
            Mesh::from_indexed(&[Pos::zeros()], &[[0, 0, 3]]).unwrap_err(),
            SliceError::MissingVertex { face: 0, vertex: 3 }
        );
    }

    #[test]
    fn cuboid_is_closed() {
        let mesh = cuboid(Pos::zeros(), Pos::new(10.0, 10.0, 10.0));
        assert_eq!(mesh.face_count(), 12);
        assert!(mesh.is_manifold());
        assert_eq!(mesh.bounds(), (Pos::zeros(), Pos::repeat(10.0)));
    }

    #[test]
    fn swap_moves_axis_up() {
        let mesh = cuboid(Pos::zeros(), Pos::new(30.0, 20.0, 10.0));
        let swapped = mesh.swap_axis(Axis::X);
        assert_eq!(swapped.bounds().1, Pos::new(10.0, 20.0, 30.0));

        let point = Pos::new(1.0, 2.0, 3.0);
        assert_eq!(unswap(Axis::Y, &swap(Axis::Y, &point)), point);
    }

    #[test]
    fn loads_ascii_stl() {
        let stl = "solid t
facet normal 0 0 1
outer loop
vertex 0 0 0
vertex 1 0 0
vertex 0 1 0
endloop
endfacet
endsolid t
";
        let mesh = load_mesh(Cursor::new(stl.as_bytes()), "STL").unwrap();
        assert_eq!(mesh.face_count(), 1);
        assert_eq!(mesh.bounds().1, Pos::new(1.0, 1.0, 0.0));

        assert!(load_mesh(Cursor::new(Vec::new()), "obj").is_err());
    }
}
