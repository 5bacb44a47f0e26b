use serde::Serialize;

use crate::{
    geometry::{PlanePoint, Polygon},
    Pos,
};

use super::order::Visit;

/// One point of an ordered tool path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MoveRecord {
    pub point: Pos,
    /// Zero for travel, otherwise the material / power / cut factor.
    pub emit: f64,
    pub feed: f64,
    pub tool: usize,
    /// Retract once this move is done.
    pub retract: bool,
}

impl MoveRecord {
    pub fn is_travel(&self) -> bool {
        self.emit == 0.0
    }
}

/// Collects the move records of one emission pass. Remembers the last
/// record so a point repeated with the same emit factor is only recorded
/// once.
#[derive(Debug, Clone)]
pub struct EmitContext {
    records: Vec<MoveRecord>,
    tool: usize,
    /// Travel moves longer than this retract first.
    retract_over: f64,
    seek_rate: f64,
}

impl EmitContext {
    pub fn new(tool: usize, retract_over: f64, seek_rate: f64) -> Self {
        Self {
            records: Vec::new(),
            tool,
            retract_over,
            seek_rate,
        }
    }

    pub fn records(&self) -> &[MoveRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<MoveRecord> {
        self.records
    }

    pub fn last_point(&self) -> Option<Pos> {
        self.records.last().map(|r| r.point)
    }

    pub fn set_tool(&mut self, tool: usize) {
        self.tool = tool;
    }

    /// Appends a record unless it repeats the last one.
    pub fn add(&mut self, point: Pos, emit: f64, feed: f64) {
        if let Some(last) = self.records.last() {
            if last.point == point && last.emit == emit {
                return;
            }
        }

        self.records.push(MoveRecord {
            point,
            emit,
            feed,
            tool: self.tool,
            retract: false,
        });
    }

    /// Moves to `point` without emitting. A long move flags a retract on the
    /// last cutting record before it.
    pub fn travel(&mut self, point: Pos) {
        if let Some(last) = self.records.last_mut() {
            if !last.is_travel() && last.point.dist_2d(&point) > self.retract_over {
                last.retract = true;
            }
        }

        self.add(point, 0.0, self.seek_rate);
    }

    /// Emits `poly` entered as described by `visit`: one travel to the entry
    /// then cutting records along the path. Closed polygons are cut
    /// clockwise and return to their entry point. Returns the last point.
    pub fn poly_print_path(&mut self, poly: &Polygon, visit: &Visit, emit: f64, feed: f64) -> Pos {
        let points = visit_points(poly, visit);
        let Some((first, rest)) = points.split_first() else {
            return self.last_point().unwrap_or_else(Pos::zeros);
        };

        self.travel(*first);
        for point in rest {
            self.add(*point, emit, feed);
        }

        points.last().copied().unwrap_or(*first)
    }
}

/// The points of `poly` in cutting order for `visit`.
pub fn visit_points(poly: &Polygon, visit: &Visit) -> Vec<Pos> {
    let points = poly.points();
    if points.is_empty() {
        return Vec::new();
    }

    if poly.is_open() {
        let mut out = points.to_vec();
        if visit.reversed {
            out.reverse();
        }
        return out;
    }

    let mut out = poly.walk_from(visit.start, true).copied().collect::<Vec<_>>();
    if !poly.is_clockwise() {
        out.reverse();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::polygon::tests::rect;

    fn visit(start: usize, reversed: bool) -> Visit {
        Visit {
            index: 0,
            start,
            reversed,
            distance: 0.0,
        }
    }

    #[test]
    fn repeated_points_are_dropped() {
        let mut ctx = EmitContext::new(0, 2.0, 100.0);
        ctx.add(Pos::new(1.0, 1.0, 0.0), 1.0, 10.0);
        ctx.add(Pos::new(1.0, 1.0, 0.0), 1.0, 10.0);
        ctx.add(Pos::new(1.0, 1.0, 0.0), 0.0, 10.0);
        assert_eq!(ctx.records().len(), 2);
    }

    #[test]
    fn polygon_is_cut_clockwise_from_entry() {
        let poly = rect(0.0, 0.0, 2.0, 2.0);
        let mut ctx = EmitContext::new(1, 2.0, 100.0);
        let end = ctx.poly_print_path(&poly, &visit(2, false), 1.0, 10.0);

        let records = ctx.into_records();
        assert_eq!(records.len(), 5);
        assert!(records[0].is_travel());
        assert!(records[1..].iter().all(|r| r.emit == 1.0 && r.tool == 1));
        assert_eq!(records[0].point, records[4].point);
        assert_eq!(end, records[0].point);
        assert_eq!(records[0].point, poly.points()[2]);

        let cut = Polygon::from_points(records[..4].iter().map(|r| r.point).collect());
        assert!(cut.is_clockwise());
    }

    #[test]
    fn open_paths_follow_visit_direction() {
        let path = Polygon::from_xy(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)], 0.0).with_open(true);
        let points = visit_points(&path, &visit(0, true));
        assert_eq!(points.first(), Some(&Pos::new(2.0, 0.0, 0.0)));
        assert_eq!(points.len(), 3);
    }

    #[test]
    fn long_travel_flags_retract() {
        let mut ctx = EmitContext::new(0, 2.0, 100.0);
        ctx.travel(Pos::zeros());
        ctx.add(Pos::new(1.0, 0.0, 0.0), 1.0, 10.0);
        ctx.travel(Pos::new(2.0, 0.0, 0.0));
        assert!(!ctx.records()[1].retract);

        ctx.add(Pos::new(3.0, 0.0, 0.0), 1.0, 10.0);
        ctx.travel(Pos::new(10.0, 0.0, 0.0));
        assert!(ctx.records()[3].retract);
    }
}
