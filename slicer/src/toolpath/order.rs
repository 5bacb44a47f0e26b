//! Greedy nearest-next ordering of paths and polygons.

use crate::{
    geometry::{PlanePoint, Polygon},
    Pos,
};

/// How one member of an ordered set is entered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visit {
    /// Index into the ordered set.
    pub index: usize,
    /// Point the path is entered at. Always 0 for open paths.
    pub start: usize,
    /// Open paths only, walk from the last point to the first.
    pub reversed: bool,
    /// Distance from the previous position to the entry point.
    pub distance: f64,
}

impl Visit {
    /// The point of `poly` this visit leaves from once the path is done.
    pub fn exit(&self, poly: &Polygon) -> Option<Pos> {
        match (poly.is_open(), self.reversed) {
            (true, false) => poly.last().copied(),
            (true, true) => poly.first().copied(),
            (false, _) => poly.points().get(self.start).copied(),
        }
    }
}

/// Emits open paths by nearest endpoint. Each round every remaining path's
/// two ends are checked and the closest one overall wins. Ties go to the
/// earlier path, and to the first point over the last. `emit` is called
/// for every path in visiting order. Returns the final position.
pub fn tip2tip(paths: &[Polygon], start: Pos, mut emit: impl FnMut(&Polygon, Visit)) -> Pos {
    let mut used = vec![false; paths.len()];
    let mut position = start;

    loop {
        let mut found: Option<(Visit, Pos)> = None;
        for (index, path) in paths.iter().enumerate() {
            let (Some(first), Some(last)) = (path.first(), path.last()) else {
                continue;
            };
            if used[index] {
                continue;
            }

            for (tip, other, reversed) in [(first, last, false), (last, first, true)] {
                let distance = position.dist_2d(tip);
                if found.map_or(true, |(best, _)| distance < best.distance) {
                    let visit = Visit {
                        index,
                        start: 0,
                        reversed,
                        distance,
                    };
                    found = Some((visit, *other));
                }
            }
        }

        let Some((visit, exit)) = found else {
            break;
        };

        used[visit.index] = true;
        position = exit;
        emit(&paths[visit.index], visit);
    }

    position
}

/// Emits polygons in nearest-next order. A closed polygon can be entered
/// at any of its points, an open one only at either end. `emit` returns the
/// position the tool is left at, or `None` to use the polygon's exit point.
/// Every polygon is visited exactly once. Returns the final position.
pub fn poly2poly(
    polygons: &[Polygon],
    start: Pos,
    mut emit: impl FnMut(&Polygon, Visit) -> Option<Pos>,
) -> Pos {
    let mut used = vec![false; polygons.len()];
    let mut position = start;

    loop {
        let mut found: Option<Visit> = None;
        for (index, poly) in polygons.iter().enumerate() {
            if used[index] || poly.is_empty() {
                continue;
            }

            let best = found.map_or(f64::INFINITY, |v| v.distance);
            let visit = match poly.is_open() {
                true => nearest_tip(poly, &position, index),
                false => nearest_point(poly, &position, index),
            };

            if let Some(visit) = visit.filter(|v| v.distance < best) {
                found = Some(visit);
            }
        }

        let Some(visit) = found else {
            break;
        };

        used[visit.index] = true;
        let poly = &polygons[visit.index];
        let fallback = visit.exit(poly).unwrap_or(position);
        position = emit(poly, visit).unwrap_or(fallback);
    }

    position
}

/// Open polygon entry. The last point is only chosen when strictly closer
/// than the first.
fn nearest_tip(poly: &Polygon, position: &Pos, index: usize) -> Option<Visit> {
    let to_first = position.dist_2d(poly.first()?);
    let to_last = position.dist_2d(poly.last()?);
    let reversed = to_last < to_first;

    Some(Visit {
        index,
        start: 0,
        reversed,
        distance: if reversed { to_last } else { to_first },
    })
}

fn nearest_point(poly: &Polygon, position: &Pos, index: usize) -> Option<Visit> {
    let closest = poly.find_closest_point_to(position)?;
    Some(Visit {
        index,
        start: closest.index,
        reversed: false,
        distance: closest.distance,
    })
}
