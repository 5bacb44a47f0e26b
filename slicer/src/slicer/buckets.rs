use crate::{mesh::Mesh, Pos};

/// Acceleration structure for mesh slicing. The Z range of the mesh is split
/// into buckets and every triangle is referenced from each bucket its Z span
/// overlaps, so slicing a plane only has to look at the triangles of one
/// bucket.
pub struct Buckets {
    start_height: f64,
    scale: f64,

    buckets: Vec<Vec<usize>>,
}

impl Buckets {
    /// Sizes buckets from the mean Z span of the triangles. Meshes with tall
    /// triangles get few buckets, finely tessellated meshes get many.
    pub fn from_mesh(mesh: &Mesh) -> Self {
        let (min, max) = mesh.bounds();
        let range = max.z - min.z;

        let z_sum = mesh
            .faces()
            .map(|[a, b, c]| (a.z - b.z).abs() + (b.z - c.z).abs() + (c.z - a.z).abs())
            .sum::<f64>();
        let mean_span = z_sum / mesh.vertices().len() as f64;

        let count = match mean_span > 0.0 && range > 0.0 {
            true => ((range / mean_span).ceil() as usize).saturating_sub(1).max(1),
            false => 1,
        };

        Self::with_count(mesh, count)
    }

    /// Creates buckets with a fixed count.
    pub fn with_count(mesh: &Mesh, count: usize) -> Self {
        let (min, max) = mesh.bounds();
        let range = max.z - min.z;
        let count = count.max(1);
        let scale = match range > 0.0 {
            true => count as f64 / range,
            false => 0.0,
        };

        // One extra bucket so a plane at the very top still has a home.
        let mut buckets = vec![Vec::new(); count + 1];
        for (face, [a, b, c]) in mesh.faces().enumerate() {
            let (low, high) = triangle_bounds(&a, &b, &c);
            let first = ((low - min.z) * scale).floor().max(0.0) as usize;
            let last = (((high - min.z) * scale).ceil() as usize).min(count);

            for bucket in buckets.iter_mut().take(last + 1).skip(first) {
                bucket.push(face);
            }
        }

        Self {
            start_height: min.z,
            scale,
            buckets,
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Faces that may cross a plane at `height`.
    pub fn faces_at(&self, height: f64) -> &[usize] {
        let bucket = (height - self.start_height) * self.scale;
        if bucket < 0.0 || bucket.is_nan() {
            return &[];
        }

        let bucket = (bucket.floor() as usize).min(self.buckets.len() - 1);
        &self.buckets[bucket]
    }
}

/// Gets the min and max heights of the vertices of a face.
fn triangle_bounds(a: &Pos, b: &Pos, c: &Pos) -> (f64, f64) {
    (a.z.min(b.z).min(c.z), a.z.max(b.z).max(c.z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::cuboid;

    #[test]
    fn bucket_count_follows_triangle_span() {
        // Eight side triangles spanning 20 each over 36 vertices.
        let mesh = cuboid(Pos::zeros(), Pos::repeat(10.0));
        let buckets = Buckets::from_mesh(&mesh);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets.faces_at(5.0).len(), 8);
    }

    #[test]
    fn planes_only_see_overlapping_faces() {
        let low = cuboid(Pos::zeros(), Pos::new(1.0, 1.0, 1.0));
        let high = cuboid(Pos::new(0.0, 0.0, 9.0), Pos::new(1.0, 1.0, 10.0));
        let mesh = Mesh::from_triangles(
            low.vertices()
                .iter()
                .chain(high.vertices())
                .copied()
                .collect(),
        )
        .unwrap();

        let buckets = Buckets::with_count(&mesh, 10);
        let low_faces = buckets.faces_at(0.5);
        assert_eq!(low_faces.len(), 10);
        assert!(low_faces.iter().all(|&f| f < 12));

        assert!(buckets.faces_at(5.0).is_empty());
        assert!(buckets.faces_at(9.5).iter().all(|&f| f >= 12));
        assert!(buckets.faces_at(-1.0).is_empty());
        assert_eq!(buckets.faces_at(10.0).len(), 10);
    }
}
