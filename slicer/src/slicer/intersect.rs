use std::collections::HashMap;

use tracing::warn;

use crate::{
    geometry::{precision, PlanePoint, PointKey},
    mesh::Mesh,
    Pos,
};

/// Points of a single plane, interned by their rounded key. Lines refer to
/// points by index so the same vertex is shared by every line touching it.
#[derive(Debug, Default)]
pub struct PointArena {
    points: Vec<Pos>,
    index: HashMap<PointKey, usize>,
}

impl PointArena {
    pub fn intern(&mut self, point: &Pos) -> usize {
        let key = point.key();
        if let Some(&id) = self.index.get(&key) {
            return id;
        }

        let id = self.points.len();
        self.points.push(point.snapped());
        self.index.insert(key, id);
        id
    }

    pub fn get(&self, id: usize) -> &Pos {
        &self.points[id]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// An undirected segment between two interned points. The ends are stored
/// lowest id first so equal segments have equal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    pub a: usize,
    pub b: usize,
    /// The segment is the edge of a triangle lying on the plane.
    pub edge: bool,
}

impl Line {
    pub fn new(a: usize, b: usize, edge: bool) -> Self {
        Self {
            a: a.min(b),
            b: a.max(b),
            edge,
        }
    }

    pub fn key(&self) -> (usize, usize) {
        (self.a, self.b)
    }

    /// The end that is not `point`.
    pub fn other(&self, point: usize) -> usize {
        match self.a == point {
            true => self.b,
            false => self.a,
        }
    }

    pub fn is_collinear(&self, other: &Line, points: &PointArena) -> bool {
        let (p1, p2) = (points.get(self.a), points.get(self.b));
        let (p3, p4) = (points.get(other.a), points.get(other.b));
        let (d1x, d1y) = (p2.x - p1.x, p2.y - p1.y);
        let (d2x, d2y) = (p4.x - p3.x, p4.y - p3.y);
        (d2y * d1x - d2x * d1y).abs() < precision::COLLINEAR
    }
}

/// Cuts the given faces of `mesh` with the plane at `z`, interning the
/// resulting points into `points`.
pub fn intersect_plane(
    mesh: &Mesh,
    faces: impl IntoIterator<Item = usize>,
    z: f64,
    points: &mut PointArena,
) -> Vec<Line> {
    let mut lines = Vec::new();

    for face in faces {
        let Some((p1, p2, edge)) = intersect_triangle(&mesh.face(face), z) else {
            continue;
        };

        let (a, b) = (points.intern(&p1), points.intern(&p2));
        if a != b {
            lines.push(Line::new(a, b, edge));
        }
    }

    lines
}

/// Intersects one triangle with the plane at `z`. Returns the two ends of
/// the cut and whether it is a triangle edge lying on the plane.
pub fn intersect_triangle(face: &[Pos; 3], z: f64) -> Option<(Pos, Pos, bool)> {
    let mut on = Vec::with_capacity(3);
    let mut under = Vec::with_capacity(3);
    let mut over = Vec::with_capacity(3);

    for point in face {
        let delta = point.z - z;
        if delta.abs() < precision::SLICE_Z {
            on.push(*point);
        } else if delta < 0.0 {
            under.push(*point);
        } else {
            over.push(*point);
        }
    }

    if under.len() == 3 || over.len() == 3 {
        return None;
    }

    // An edge on the plane is only kept when the third vertex is below.
    // Keeping the other side too leads to ambiguous nesting on flat tops.
    if on.len() == 2 {
        return (under.len() == 1).then(|| (flatten_z(on[0], z), flatten_z(on[1], z), true));
    }

    // Coplanar faces are covered by the edges of their neighbours.
    if on.len() == 3 || under.is_empty() || over.is_empty() {
        return None;
    }

    // Every over/under vertex pair spans an edge crossing the plane.
    let mut cut = Vec::with_capacity(2);
    for high in &over {
        for low in &under {
            cut.push(high.intersect_z(low, z));
        }
    }

    if cut.len() < 2 && on.len() == 1 {
        cut.push(flatten_z(on[0], z));
    }

    match cut.as_slice() {
        [a, b] => Some((*a, *b, false)),
        _ => {
            warn!("Triangle cut at z={z} produced {} points", cut.len());
            None
        }
    }
}

fn flatten_z(mut point: Pos, z: f64) -> Pos {
    point.z = z;
    point
}
