//! Depth first ordering across a stack of layers. Polygons are grouped
//! into pools, and a pool is finished down through every layer beneath it
//! before the tool moves to the next one.

use ordered_float::OrderedFloat;
use tracing::{debug, warn};

use crate::{
    geometry::{flatten, Forest, Polygon},
    Pos,
};

use super::order::{poly2poly, Visit};

/// Squared tolerance used when fitting a pool into one in the layer above.
const POOL_FIT: f64 = 0.1;

/// A polygon heading a group of polygons cut together.
#[derive(Debug)]
struct Pool {
    layer: usize,
    /// Index of the pool polygon in its layer's forest.
    head: usize,
    /// Nested polygons that did not earn a pool of their own.
    members: Vec<usize>,
    /// Pools of the layer below that fit inside this one.
    down: Vec<usize>,
}

/// Pools of every layer, built from polygon stacks ordered top down.
pub struct Pools {
    forests: Vec<Forest>,
    pools: Vec<Pool>,
    /// Pool ids of each layer, smallest first.
    layers: Vec<Vec<usize>>,
}

impl Pools {
    /// Groups `layers` (each a forest of top polygons, ordered top down)
    /// into pools. A polygon heads its own pool if it is open, has no
    /// parent, has siblings, or sits further than `tool_diameter` from its
    /// parent. Otherwise it joins the nearest pool above it in the nesting.
    pub fn build(layers: &[Vec<Polygon>], tool_diameter: f64) -> Self {
        let mut out = Self {
            forests: Vec::with_capacity(layers.len()),
            pools: Vec::new(),
            layers: Vec::with_capacity(layers.len()),
        };

        for (layer, tops) in layers.iter().enumerate() {
            let polygons = flatten(tops).into_iter().cloned().collect();
            let forest = Forest::build(polygons, true);
            let mut pool_of = vec![None; forest.len()];
            let mut ids = Vec::new();

            // Largest first so parents are placed before their children.
            for index in (0..forest.len()).rev() {
                let poly = &forest.polygons[index];
                let own = match forest.parent[index] {
                    None => true,
                    Some(parent) => {
                        poly.is_open()
                            || forest.children[parent].len() > 1
                            || poly.min_offset_to(&forest.polygons[parent]) > tool_diameter
                    }
                };

                if own {
                    pool_of[index] = Some(out.pools.len());
                    ids.push(out.pools.len());
                    out.pools.push(Pool {
                        layer,
                        head: index,
                        members: Vec::new(),
                        down: Vec::new(),
                    });
                    continue;
                }

                match forest.ancestors(index).find_map(|up| pool_of[up]) {
                    Some(pool) => {
                        out.pools[pool].members.push(index);
                        pool_of[index] = Some(pool);
                    }
                    None => warn!("Polygon {index} of layer {layer} has no pool"),
                }
            }

            ids.sort_by_key(|&id| OrderedFloat(forest.polygons[out.pools[id].head].area()));
            out.forests.push(forest);

            if layer > 0 {
                out.attach_below(layer, &ids);
            }
            out.layers.push(ids);
        }

        debug!(
            "Grouped {} layers into {} pools",
            out.layers.len(),
            out.pools.len()
        );
        out
    }

    fn head(&self, pool: usize) -> &Polygon {
        let pool = &self.pools[pool];
        &self.forests[pool.layer].polygons[pool.head]
    }

    /// Hangs each pool of `layer` under the smallest pool above it that it
    /// fits in. Closed pools never hang under open ones.
    fn attach_below(&mut self, layer: usize, ids: &[usize]) {
        for &id in ids {
            let poly = self.head(id);
            let above = self.layers[layer - 1].iter().copied().find(|&up| {
                let up_poly = self.head(up);
                !(up_poly.is_open() && !poly.is_open()) && poly.is_inside(up_poly, POOL_FIT)
            });

            if let Some(up) = above {
                self.pools[up].down.push(id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Polygons cut as part of `pool`, head last.
    fn polygons(&self, pool: usize) -> Vec<Polygon> {
        let Pool {
            layer,
            head,
            members,
            ..
        } = &self.pools[pool];
        let forest = &self.forests[*layer];
        members
            .iter()
            .chain(std::iter::once(head))
            .map(|&i| forest.polygons[i].clone())
            .collect()
    }

    /// Emits every pool starting from the top layer, descending into the
    /// pools hung below each one before moving on. Within a pool polygons
    /// are ordered nearest first. `emit` also receives the layer index.
    pub fn emit(
        &self,
        start: Pos,
        mut emit: impl FnMut(usize, &Polygon, Visit) -> Option<Pos>,
    ) -> Pos {
        let mut done = vec![false; self.pools.len()];
        let mut position = start;

        for layer in &self.layers {
            for &pool in layer {
                position = self.emit_pool(pool, position, &mut done, &mut emit);
            }
        }

        position
    }

    fn emit_pool<F>(&self, pool: usize, start: Pos, done: &mut [bool], emit: &mut F) -> Pos
    where
        F: FnMut(usize, &Polygon, Visit) -> Option<Pos>,
    {
        if done[pool] {
            return start;
        }
        done[pool] = true;

        let layer = self.pools[pool].layer;
        let polygons = self.polygons(pool);
        let mut position = poly2poly(&polygons, start, |poly, visit| emit(layer, poly, visit));

        for &down in &self.pools[pool].down {
            position = self.emit_pool(down, position, done, emit);
        }

        position
    }
}

/// Emits `layers` (top down) depth first. See [`Pools`].
pub fn depth_first(
    layers: &[Vec<Polygon>],
    start: Pos,
    tool_diameter: f64,
    emit: impl FnMut(usize, &Polygon, Visit) -> Option<Pos>,
) -> Pos {
    Pools::build(layers, tool_diameter).emit(start, emit)
}
