use ordered_float::OrderedFloat;

use crate::{
    geometry::{union_all, Polygon},
    Pos,
};

/// The polygons cut from a mesh by one Z plane.
#[derive(Debug, Clone, Default)]
pub struct Slice {
    pub z: f64,
    /// Position of the plane in the order it was selected.
    pub index: usize,
    /// Thickness of the band this plane stands for. Only known for
    /// auto selected planes.
    pub thickness: Option<f64>,
    /// Top level polygons with their holes in `inner`.
    pub tops: Vec<Polygon>,
    /// Deduplicated raw lines, kept when slicing in topo mode.
    pub lines: Option<Vec<[Pos; 2]>>,

    /// Index of the next slice above in the owning [`SliceStack`].
    pub up: Option<usize>,
    /// Index of the next slice below in the owning [`SliceStack`].
    pub down: Option<usize>,
}

impl Slice {
    pub fn new(z: f64, index: usize) -> Self {
        Self {
            z,
            index,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tops.is_empty()
    }

    pub fn area(&self) -> f64 {
        self.tops.iter().map(Polygon::area_deep).sum()
    }
}

/// Slices ordered bottom to top with their `up` and `down` links set.
#[derive(Debug, Clone, Default)]
pub struct SliceStack {
    slices: Vec<Slice>,
}

impl SliceStack {
    pub fn new(mut slices: Vec<Slice>) -> Self {
        slices.sort_by_key(|slice| OrderedFloat(slice.z));

        let count = slices.len();
        for (i, slice) in slices.iter_mut().enumerate() {
            slice.down = i.checked_sub(1);
            slice.up = (i + 1 < count).then_some(i + 1);
        }

        Self { slices }
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn into_slices(self) -> Vec<Slice> {
        self.slices
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Slice> {
        self.slices.get(index)
    }

    pub fn up(&self, index: usize) -> Option<&Slice> {
        self.slices.get(index)?.up.and_then(|i| self.slices.get(i))
    }

    pub fn down(&self, index: usize) -> Option<&Slice> {
        self.slices.get(index)?.down.and_then(|i| self.slices.get(i))
    }

    /// Slices from the top of the stack down.
    pub fn iter_down(&self) -> impl Iterator<Item = &Slice> {
        self.slices.iter().rev()
    }

    /// Union of the tops of the slice at `index` and every slice above it,
    /// as seen looking down the Z axis.
    pub fn shadow_at(&self, index: usize) -> Vec<Polygon> {
        let Some(slice) = self.slices.get(index) else {
            return Vec::new();
        };

        let mut tops = self.slices[index..]
            .iter()
            .flat_map(|s| s.tops.iter().cloned())
            .collect::<Vec<_>>();
        tops.iter_mut().for_each(|p| {
            let z = slice.z - p.z();
            p.translate(Pos::new(0.0, 0.0, z));
        });

        union_all(&tops)
    }
}

#[derive(Debug, Clone)]
pub struct TerrainLayer {
    pub z: f64,
    pub tops: Vec<Polygon>,
}

/// Shadows of a part from the top down. Used to find how high a travel
/// move has to rise to clear the part.
#[derive(Debug, Clone, Default)]
pub struct Terrain {
    layers: Vec<TerrainLayer>,
}

impl Terrain {
    /// Builds terrain layers from the top of `stack` down. The running union
    /// is carried downward so each layer only merges one slice.
    pub fn from_stack(stack: &SliceStack) -> Self {
        let mut layers = Vec::with_capacity(stack.len());
        let mut shadow: Vec<Polygon> = Vec::new();

        for slice in stack.iter_down() {
            let mut merged = shadow;
            merged.extend(slice.tops.iter().cloned());
            merged.iter_mut().for_each(|p| {
                let z = slice.z - p.z();
                p.translate(Pos::new(0.0, 0.0, z));
            });

            shadow = union_all(&merged);
            layers.push(TerrainLayer {
                z: slice.z,
                tops: shadow.clone(),
            });
        }

        Self { layers }
    }

    pub fn layers(&self) -> &[TerrainLayer] {
        &self.layers
    }

    /// The Z a move from `from` to `to` at height `z` must rise to, so it
    /// passes `over` above every shadow it would cross. The move is also
    /// checked `offset` to either side.
    pub fn clearance_z(&self, from: &Pos, to: &Pos, z: f64, z_add: f64, offset: f64, over: f64) -> f64 {
        let mut max_z = z;

        let mut check = Vec::new();
        for layer in &self.layers {
            check.push(layer);
            if layer.z + z_add < z {
                break;
            }
        }

        let normal = {
            let dir = (to - from).xy();
            match dir.try_normalize(f64::EPSILON) {
                Some(dir) => Pos::new(-dir.y, dir.x, 0.0),
                None => Pos::zeros(),
            }
        };
        let sides = [
            (*from, *to),
            (from + normal * offset, to + normal * offset),
            (from - normal * offset, to - normal * offset),
        ];

        for layer in check.into_iter().rev() {
            let hit = sides.iter().any(|(a, b)| {
                layer
                    .tops
                    .iter()
                    .any(|top| !top.intersections(a, b, true).is_empty())
            });

            if hit {
                max_z = max_z.max(layer.z + z_add + over);
            }
        }

        max_z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::polygon::tests::rect;

    fn layer(z: f64, tops: Vec<Polygon>) -> Slice {
        let mut slice = Slice::new(z, 0);
        slice.tops = tops
            .into_iter()
            .map(|mut p| {
                p.translate(Pos::new(0.0, 0.0, z));
                p
            })
            .collect();
        slice
    }

    fn stepped() -> SliceStack {
        SliceStack::new(vec![
            layer(5.0, vec![rect(0.0, 0.0, 2.0, 2.0)]),
            layer(1.0, vec![rect(0.0, 0.0, 10.0, 10.0)]),
            layer(3.0, vec![rect(0.0, 0.0, 5.0, 5.0)]),
        ])
    }

    #[test]
    fn stack_links_neighbours() {
        let stack = stepped();
        let heights = stack.slices().iter().map(|s| s.z).collect::<Vec<_>>();
        assert_eq!(heights, vec![1.0, 3.0, 5.0]);

        assert_eq!(stack.up(0).map(|s| s.z), Some(3.0));
        assert_eq!(stack.down(0).map(|s| s.z), None);
        assert_eq!(stack.down(2).map(|s| s.z), Some(3.0));
        assert!(stack.up(2).is_none());
    }

    #[test]
    fn shadow_covers_layers_above() {
        let stack = SliceStack::new(vec![
            layer(1.0, vec![rect(0.0, 0.0, 2.0, 2.0)]),
            layer(2.0, vec![rect(10.0, 0.0, 2.0, 2.0)]),
        ]);

        let shadow = stack.shadow_at(0);
        assert_eq!(shadow.len(), 2);
        assert!(shadow.iter().all(|p| p.z() == 1.0));
        assert_eq!(stack.shadow_at(1).len(), 1);
        assert!(stack.shadow_at(7).is_empty());
    }

    #[test]
    fn travel_rises_over_terrain() {
        let terrain = Terrain::from_stack(&stepped());
        assert_eq!(terrain.layers().len(), 3);
        assert_eq!(terrain.layers()[0].z, 5.0);

        // Crossing the whole part at the bottom has to clear the top layer.
        let (from, to) = (Pos::new(-5.0, 1.0, 0.0), Pos::new(15.0, 1.0, 0.0));
        assert_eq!(terrain.clearance_z(&from, &to, 6.0, 0.0, 0.5, 1.0), 6.0);
        assert_eq!(terrain.clearance_z(&from, &to, 0.0, 0.0, 0.5, 1.0), 6.0);

        // Passing beside the narrow top only hits its side offset.
        let (from, to) = (Pos::new(-5.0, 7.0, 0.0), Pos::new(15.0, 7.0, 0.0));
        assert_eq!(terrain.clearance_z(&from, &to, 0.0, 0.0, 0.5, 1.0), 2.0);

        let (from, to) = (Pos::new(-5.0, 2.2, 0.0), Pos::new(15.0, 2.2, 0.0));
        assert_eq!(terrain.clearance_z(&from, &to, 0.0, 0.0, 0.5, 1.0), 6.0);
    }
}
