//! Rebuilds polygons from the unordered lines of one plane.
//!
//! Every point knows the points it shares a line with. Paths are traced
//! from each unused point until they either run into a point already on the
//! path (a loop) or a dead end (an open path). At points with more than two
//! links every way forward is explored, each with its own copy of the path,
//! and the best candidate from each start point is kept.

use tracing::{trace, warn};

use crate::geometry::{precision, PlanePoint, Polygon};

use super::intersect::{Line, PointArena};

/// A traced run of point ids.
#[derive(Debug, Clone, Default, PartialEq)]
struct Path {
    points: Vec<usize>,
    open: bool,
}

/// A pending walk: continue from `start` having already visited `path`,
/// arriving from `from`.
struct Walk {
    start: usize,
    path: Vec<usize>,
    from: Option<usize>,
}

pub struct Connector<'a> {
    points: &'a PointArena,
    /// Ids of points in the order their first line appears.
    order: Vec<usize>,
    links: Vec<Vec<usize>>,

    on_path: Vec<bool>,
    claimed: Vec<bool>,
    /// Points of open paths waiting to be bridged.
    deferred: Vec<bool>,
    seq: Vec<usize>,
    next_seq: usize,

    candidates: usize,
    path_cap: usize,
    capped: bool,
    bridge_gap: f64,

    connect: Vec<Path>,
    output: Vec<Polygon>,
}

impl<'a> Connector<'a> {
    pub fn new(lines: &[Line], points: &'a PointArena, path_cap: usize, bridge_gap: f64) -> Self {
        let count = points.len();
        let mut links = vec![Vec::new(); count];
        let mut seen = vec![false; count];
        let mut order = Vec::new();

        for line in lines {
            for (a, b) in [(line.a, line.b), (line.b, line.a)] {
                if !seen[a] {
                    seen[a] = true;
                    order.push(a);
                }
                links[a].push(b);
            }
        }

        Self {
            points,
            order,
            links,

            on_path: vec![false; count],
            claimed: vec![false; count],
            deferred: vec![false; count],
            seq: vec![0; count],
            next_seq: 1,

            candidates: 0,
            path_cap,
            capped: false,
            bridge_gap,

            connect: Vec::new(),
            output: Vec::new(),
        }
    }

    /// True if the candidate cap was hit while connecting.
    pub fn capped(&self) -> bool {
        self.capped
    }

    pub fn connect(mut self) -> Vec<Polygon> {
        // Dangling ends only show up in broken meshes. Trace from them first
        // so their open runs are not split up by the loop search.
        for i in 0..self.order.len() {
            let point = self.order[i];
            if self.seq[point] == 0 && self.links[point].len() == 1 {
                self.trace_from(point);
            }
        }

        for _ in 0..2 {
            for i in 0..self.order.len() {
                let point = self.order[i];
                if self.seq[point] == 0 && self.links[point].len() == 2 {
                    self.trace_from(point);
                }
            }

            let (claimed, deferred) = (&self.claimed, &self.deferred);
            self.order.retain(|&p| !claimed[p] && !deferred[p]);
            for &point in &self.order {
                self.seq[point] = 0;
            }

            if self.order.len() < 2 {
                break;
            }
        }

        self.bridge();
        self.output
    }

    fn trace_from(&mut self, seed: usize) {
        let paths = self.find_paths(seed);
        if !paths.is_empty() {
            self.emit_longest(paths);
        }
    }

    fn find_paths(&mut self, seed: usize) -> Vec<Path> {
        let mut paths = Vec::new();
        let mut work = vec![Walk {
            start: seed,
            path: Vec::new(),
            from: None,
        }];

        while let Some(walk) = work.pop() {
            if self.candidates > self.path_cap {
                if !self.capped {
                    let z = self.points.get(seed).z;
                    warn!(
                        "Indeterminate paths at z={z}, gave up after {} candidates",
                        self.candidates
                    );
                    self.capped = true;
                }
                break;
            }

            let mut branches = self.walk(walk, &mut paths);
            // Reversed so the first branch is explored first.
            branches.reverse();
            work.extend(branches);
        }

        paths
    }

    /// Follows one walk until it closes, ends or splits. Finished paths go
    /// into `paths`, splits are returned as new walks.
    fn walk(&mut self, walk: Walk, paths: &mut Vec<Path>) -> Vec<Walk> {
        let Walk {
            start,
            mut path,
            mut from,
        } = walk;

        for &point in &path {
            self.on_path[point] = true;
        }

        let mut branches = Vec::new();
        let mut point = start;
        loop {
            path.push(point);
            self.on_path[point] = true;
            self.seq[point] = self.next_seq;
            self.next_seq += 1;

            let links = self.links[point].clone();

            // Seed with two points so the walk does not also run backwards.
            if path.len() == 1 {
                from = Some(point);
                point = links[0];
                continue;
            }

            if links.len() > 2 {
                for &next in &links {
                    if Some(next) == from {
                        continue;
                    }

                    if self.on_path[next] || self.claimed[next] {
                        self.record(paths, slice_at(&path, next));
                    } else {
                        branches.push(Walk {
                            start: next,
                            path: path.clone(),
                            from: Some(point),
                        });
                    }
                }
                break;
            }

            let next = match Some(links[0]) == from {
                true => links.get(1).copied(),
                false => Some(links[0]),
            };
            from = Some(point);

            match next {
                None => {
                    let points = path.clone();
                    self.record(paths, Path { points, open: true });
                    break;
                }
                Some(next) if self.on_path[next] || self.claimed[next] => {
                    self.record(paths, slice_at(&path, next));
                    break;
                }
                Some(next) => point = next,
            }
        }

        for &point in &path {
            self.on_path[point] = false;
        }

        branches
    }

    fn record(&mut self, paths: &mut Vec<Path>, path: Path) {
        self.candidates += 1;
        paths.push(path);
    }

    /// Picks what to keep from the candidates of one seed.
    fn emit_longest(&mut self, mut paths: Vec<Path>) {
        let closed = paths.iter().filter(|p| !p.open).count();
        let open = paths.len() - closed;

        if closed > 1 && open == 0 {
            // Largest first. A smaller loop reusing any point of a loop
            // accepted here is dropped.
            paths.sort_by(|a, b| b.points.len().cmp(&a.points.len()));
            let mut taken = vec![false; self.claimed.len()];
            for path in paths {
                if path.points.len() < 3 || path.points.iter().any(|&p| taken[p]) {
                    continue;
                }
                for &point in &path.points {
                    taken[point] = true;
                }
                self.claim(&path);
                self.emit(&path.points, false);
            }
            return;
        }

        let mut longest: Option<Path> = None;
        for path in paths {
            let longer = match &longest {
                Some(l) => path.points.len() > l.points.len(),
                None => true,
            };
            if longer {
                longest = Some(path);
            }
        }

        let Some(longest) = longest else {
            return;
        };

        if longest.open {
            for &point in &longest.points {
                self.deferred[point] = true;
            }
            self.connect.push(longest);
        } else {
            self.claim(&longest);
            self.emit(&longest.points, false);
        }
    }

    fn claim(&mut self, path: &Path) {
        for &point in &path.points {
            self.claimed[point] = true;
        }
    }

    /// Joins open paths whose ends are within the bridge gap of each other.
    fn bridge(&mut self) {
        let mut connect = std::mem::take(&mut self.connect);
        let mut used = vec![false; connect.len()];

        for i in 0..connect.len() {
            if self.bridge_gap <= 0.0 {
                let points = std::mem::take(&mut connect[i].points);
                self.emit(&points, true);
                continue;
            }

            if used[i] {
                continue;
            }

            let mut array = std::mem::take(&mut connect[i].points);
            loop {
                let Some(&last) = array.last() else {
                    break;
                };
                let last = *self.points.get(last);

                let mut closest: Option<(f64, usize, bool)> = None;
                for (j, other) in connect.iter().enumerate().skip(i + 1) {
                    if used[j] {
                        continue;
                    }

                    let (Some(&head), Some(&tail)) = (other.points.first(), other.points.last())
                    else {
                        continue;
                    };

                    for (end, reverse) in [(head, false), (tail, true)] {
                        let dist = last.dist_sq_2d(self.points.get(end));
                        let best = closest.map_or(f64::INFINITY, |c| c.0);
                        if dist < best && dist <= self.bridge_gap {
                            closest = Some((dist, j, reverse));
                        }
                    }
                }

                let Some((_, j, reverse)) = closest else {
                    self.emit(&array, true);
                    break;
                };

                used[j] = true;
                let mut other = std::mem::take(&mut connect[j].points);
                if reverse {
                    other.reverse();
                }
                array.extend(other);
                trace!("Bridged open path {j} onto {i}");

                let (first, last) = (array[0], array[array.len() - 1]);
                if self
                    .points
                    .get(first)
                    .dist_sq_2d(self.points.get(last))
                    <= precision::CLOSE_LOOP_SQ
                {
                    self.emit(&array, false);
                    break;
                }
            }
        }
    }

    /// Cleans and outputs a path, dropping it if fewer than three points
    /// survive.
    fn emit(&mut self, path: &[usize], open: bool) {
        let points = path.iter().map(|&p| *self.points.get(p)).collect();
        let mut poly = Polygon::from_points(points).with_open(open);
        poly.clean(precision::CLEAN);

        if poly.len() > 2 {
            self.output.push(poly);
        } else {
            trace!("Dropped path that cleaned down to {} points", poly.len());
        }
    }
}

/// The tail of `path` starting at `term`, or the whole path if `term` is not
/// on it. A path that reaches a point claimed by another polygon is kept
/// whole.
fn slice_at(path: &[usize], term: usize) -> Path {
    let end = path.len().saturating_sub(1);
    let points = match path[..end].iter().position(|&p| p == term) {
        Some(start) => path[start..].to_vec(),
        None => path.to_vec(),
    };

    Path {
        points,
        open: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pos;

    fn build(points: &[(f64, f64)], lines: &[(usize, usize)]) -> (PointArena, Vec<Line>) {
        let mut arena = PointArena::default();
        for &(x, y) in points {
            arena.intern(&Pos::new(x, y, 1.0));
        }
        let lines = lines.iter().map(|&(a, b)| Line::new(a, b, false)).collect();
        (arena, lines)
    }

    fn connect(points: &[(f64, f64)], lines: &[(usize, usize)], gap: f64) -> Vec<Polygon> {
        let (arena, lines) = build(points, lines);
        Connector::new(&lines, &arena, 10_000, gap).connect()
    }

    fn key_set(poly: &Polygon) -> Vec<(i64, i64)> {
        let mut keys = poly
            .points()
            .iter()
            .map(|p| ((p.x * 1e3) as i64, (p.y * 1e3) as i64))
            .collect::<Vec<_>>();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn single_loop_is_rebuilt() {
        let points = [(0.0, 0.0), (4.0, 0.0), (5.0, 3.0), (2.0, 5.0), (-1.0, 3.0)];
        // Shuffled and in mixed directions.
        let lines = [(2, 3), (0, 1), (4, 0), (3, 4), (1, 2)];

        let out = connect(&points, &lines, 0.0001);
        assert_eq!(out.len(), 1);
        assert!(!out[0].is_open());

        let expected = Polygon::from_xy(&points, 1.0);
        assert_eq!(key_set(&out[0]), key_set(&expected));
    }

    #[test]
    fn two_loops_sharing_a_point() {
        // Figure eight touching at the origin.
        let points = [
            (0.0, 0.0),
            (2.0, 1.0),
            (2.0, -1.0),
            (-2.0, 1.0),
            (-2.0, -1.0),
        ];
        let lines = [(0, 1), (1, 2), (2, 0), (0, 3), (3, 4), (4, 0)];

        let out = connect(&points, &lines, 0.0001);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.len() == 3 && !p.is_open()));
    }

    #[test]
    fn open_runs_are_bridged() {
        // A square broken into two halves with a tiny gap at each seam.
        let points = [
            (0.0, 0.0),
            (4.0, 0.0),
            (4.0, 4.0),
            (4.005, 4.0),
            (0.005, 4.0),
            (0.0, 4.0),
            (0.0, 3.0),
        ];
        let lines = [(0, 1), (1, 2), (3, 4), (5, 6), (6, 0)];

        let out = connect(&points, &lines, 0.0001);
        assert_eq!(out.len(), 1);
        assert!(!out[0].is_open());
        assert!((out[0].area() - 16.0).abs() < 0.1);

        // Without bridging the runs come out open and the two point run is
        // dropped.
        let out = connect(&points, &lines, 0.0);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_open());
    }

    #[test]
    fn candidate_cap_stops_search() {
        // A dense grid has a huge number of loops through every point.
        let size = 6;
        let points = (0..size * size)
            .map(|i| ((i % size) as f64, (i / size) as f64))
            .collect::<Vec<_>>();
        let mut lines = Vec::new();
        for i in 0..size * size {
            if i % size + 1 < size {
                lines.push((i, i + 1));
            }
            if i + size < size * size {
                lines.push((i, i + size));
            }
        }

        let (arena, lines) = build(&points, &lines);
        let mut connector = Connector::new(&lines, &arena, 50, 0.0001);
        let paths = connector.find_paths(0);
        assert!(connector.capped());
        assert!(paths.len() <= 60);
    }
}
