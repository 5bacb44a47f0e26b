use ordered_float::OrderedFloat;

use super::polygon::Polygon;

/// Polygons of one plane with their containment links stored as indices.
/// Index order is ascending area.
#[derive(Debug, Default)]
pub struct Forest {
    pub polygons: Vec<Polygon>,
    pub parent: Vec<Option<usize>>,
    pub children: Vec<Vec<usize>>,
}

impl Forest {
    /// Nests each polygon into the smallest larger polygon containing it.
    /// With `open_top` set, open polygons never become parents.
    pub fn build(mut polygons: Vec<Polygon>, open_top: bool) -> Self {
        polygons.sort_by_key(|poly| OrderedFloat(poly.area()));
        for poly in polygons.iter_mut() {
            poly.inner.clear();
        }

        let count = polygons.len();
        let mut parent = vec![None; count];
        let mut children = vec![Vec::new(); count];

        for i in 0..count {
            let candidate = (i + 1..count).find(|&j| {
                !(open_top && polygons[j].is_open()) && polygons[i].is_nested(&polygons[j])
            });

            if let Some(j) = candidate {
                parent[i] = Some(j);
                children[j].push(i);
            }
        }

        for i in 0..count {
            let mut depth = 0;
            let mut at = i;
            while let Some(up) = parent[at] {
                depth += 1;
                at = up;
            }
            polygons[i].depth = depth;
        }

        Self {
            polygons,
            parent,
            children,
        }
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Converts into an owned tree. When `deep` is set every level is kept
    /// under the depth 0 roots. Otherwise every even depth polygon is a root
    /// holding only its direct (odd depth) children.
    pub fn into_tree(self, deep: bool) -> Vec<Polygon> {
        let Forest {
            polygons,
            parent,
            children,
        } = self;
        let mut slots = polygons.into_iter().map(Some).collect::<Vec<_>>();
        let count = slots.len();

        // A child always has a smaller index than its parent, so walking
        // upward finishes every subtree before it gets attached.
        for i in 0..count {
            let Some(mut poly) = slots[i].take() else {
                continue;
            };

            if deep || poly.depth % 2 == 0 {
                for &child in &children[i] {
                    if let Some(child) = slots[child].take() {
                        poly.inner.push(child);
                    }
                }
            }
            slots[i] = Some(poly);
        }

        let mut roots = Vec::new();
        for (i, slot) in slots.iter_mut().enumerate() {
            let keep = match deep {
                true => parent[i].is_none(),
                false => slot.as_ref().is_some_and(|p| p.depth % 2 == 0),
            };
            if let Some(poly) = slot.take().filter(|_| keep) {
                roots.push(poly);
            }
        }
        roots
    }

    /// Every polygon reachable by walking up from `index`, nearest first.
    pub fn ancestors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.parent[index], |&at| self.parent[at])
    }
}

/// Nests a flat list of polygons into a forest, returning the roots.
pub fn nest(polygons: Vec<Polygon>, deep: bool, open_top: bool) -> Vec<Polygon> {
    Forest::build(polygons, open_top).into_tree(deep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::polygon::{
        flatten,
        tests::{circle, rect},
    };

    fn rings() -> Vec<Polygon> {
        vec![
            rect(4.0, 4.0, 2.0, 2.0),
            rect(0.0, 0.0, 10.0, 10.0),
            rect(20.0, 0.0, 5.0, 5.0),
            rect(2.0, 2.0, 6.0, 6.0),
        ]
    }

    #[test]
    fn parents_are_smallest_container() {
        let forest = Forest::build(rings(), false);
        let areas = forest.polygons.iter().map(Polygon::area).collect::<Vec<_>>();
        assert_eq!(areas, vec![4.0, 25.0, 36.0, 100.0]);

        assert_eq!(forest.parent, vec![Some(2), None, Some(3), None]);
        assert_eq!(forest.ancestors(0).collect::<Vec<_>>(), vec![2, 3]);
        let depths = forest.polygons.iter().map(|p| p.depth).collect::<Vec<_>>();
        assert_eq!(depths, vec![2, 0, 1, 0]);
    }

    #[test]
    fn shallow_nesting_splits_islands() {
        let tops = nest(rings(), false, false);
        assert_eq!(tops.len(), 3);

        let outer = tops.iter().find(|p| p.area() == 100.0).unwrap();
        assert_eq!(outer.inner.len(), 1);
        assert!(outer.inner[0].inner.is_empty());

        let island = tops.iter().find(|p| p.area() == 4.0).unwrap();
        assert_eq!(island.depth, 2);
    }

    #[test]
    fn deep_nesting_keeps_every_level() {
        let tops = nest(rings(), true, false);
        assert_eq!(tops.len(), 2);

        let outer = tops.iter().find(|p| p.area() == 100.0).unwrap();
        assert_eq!(outer.inner[0].inner.len(), 1);
        assert_eq!(flatten(&tops).len(), 4);
    }

    #[test]
    fn open_polygons_can_not_hold_children() {
        let polys = vec![
            circle(0.0, 0.0, 10.0, 64).with_open(true),
            rect(-1.0, -1.0, 2.0, 2.0),
        ];

        assert_eq!(nest(polys.clone(), true, false).len(), 1);
        assert_eq!(nest(polys, true, true).len(), 2);
    }
}
