//! Turns move records into motion commands, merging runs of points that lie
//! on a common circle into single arc moves.

use std::{
    collections::VecDeque,
    f64::consts::{PI, TAU},
};

use common::config::EmitParams;
use nalgebra::Vector2;
use serde::Serialize;
use tracing::trace;

use crate::{
    geometry::{precision, PlanePoint},
    Pos,
};

use super::output::MoveRecord;

/// One command of the motion stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Motion {
    Travel {
        to: Pos,
        feed: f64,
    },
    Linear {
        to: Pos,
        feed: f64,
        emit: f64,
    },
    Arc {
        to: Pos,
        /// Circle center relative to the start of the arc.
        center_offset: [f64; 2],
        clockwise: bool,
        feed: f64,
        /// Material emitted over the whole arc.
        emit: f64,
    },
    Retract {
        distance: f64,
        feed: f64,
        firmware: bool,
    },
    Unretract {
        distance: f64,
        feed: f64,
        firmware: bool,
    },
    ZHop {
        z: f64,
        feed: f64,
    },
    Dwell {
        ms: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Vector2<f64>,
    pub radius: f64,
}

/// Circle through three points, or `None` if they are collinear.
pub fn center2d(a: &Pos, b: &Pos, c: &Pos) -> Option<Circle> {
    let denominator = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if denominator.abs() < f64::EPSILON {
        return None;
    }

    let (a2, b2, c2) = (a.xy().norm_squared(), b.xy().norm_squared(), c.xy().norm_squared());
    let center = Vector2::new(
        (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / denominator,
        (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / denominator,
    );

    let radius = (center - a.xy()).norm();
    radius.is_finite().then_some(Circle { center, radius })
}

/// Center of the circle of `radius` through `from` and `to` that a short
/// arc in the given direction turns around. `None` when the points are
/// further apart than the diameter.
pub fn center2pr(from: &Pos, to: &Pos, radius: f64, clockwise: bool) -> Option<Vector2<f64>> {
    let chord = to.xy() - from.xy();
    let length = chord.norm();
    if length == 0.0 || radius < length / 2.0 {
        return None;
    }

    let mid = (from.xy() + to.xy()) / 2.0;
    let height = (radius * radius - length * length / 4.0).sqrt();
    let left = Vector2::new(-chord.y, chord.x) / length * height;

    Some(match clockwise {
        true => mid - left,
        false => mid + left,
    })
}

/// Angle swept going from `from` to `to`. Negative when clockwise.
pub fn theta_diff(from: f64, to: f64, clockwise: bool) -> f64 {
    let mut diff = to - from;
    while diff < -PI {
        diff += TAU;
    }
    while diff > PI {
        diff -= TAU;
    }

    if clockwise && diff > 0.0 {
        diff -= TAU;
    }
    if !clockwise && diff < 0.0 {
        diff += TAU;
    }
    diff
}

/// Angle of a chord of length `dist` on a circle of `radius`.
fn step_angle(dist: f64, radius: f64) -> f64 {
    if radius <= 0.0 {
        return PI;
    }
    2.0 * (dist / (2.0 * radius)).min(1.0).asin()
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    point: Pos,
    /// Distance from the previous point.
    dist: f64,
    feed: f64,
    emit: f64,
}

/// Builds the motion stream for one tool path. Cutting moves are held in a
/// window while they keep fitting one circle and are written as a single
/// arc once the run ends.
pub struct ArcEmitter {
    params: EmitParams,

    window: VecDeque<Sample>,
    centers: Vec<Circle>,

    /// Last record pushed.
    last: Option<Pos>,
    /// Where the written motion leaves the tool.
    position: Pos,
    retracted: Option<f64>,
    /// Z to return to once a z-hop is undone.
    hop_from: Option<f64>,
    emitted: f64,

    out: Vec<Motion>,
}

impl ArcEmitter {
    pub fn new(params: EmitParams) -> Self {
        Self {
            params,
            window: VecDeque::new(),
            centers: Vec::new(),
            last: None,
            position: Pos::zeros(),
            retracted: None,
            hop_from: None,
            emitted: 0.0,
            out: Vec::new(),
        }
    }

    fn arcs_enabled(&self) -> bool {
        self.params.arc_tolerance > 0.0
    }

    fn step_limit(&self) -> f64 {
        TAU / self.params.arc_resolution
    }

    /// Total material emitted so far.
    pub fn emitted(&self) -> f64 {
        self.emitted
    }

    pub fn motions(&self) -> &[Motion] {
        &self.out
    }

    pub fn push(&mut self, record: &MoveRecord) {
        let dist = self.last.map_or(0.0, |last| last.dist_2d(&record.point));

        if !record.is_travel() && self.retracted.is_some() {
            self.unretract();
        }

        let sample = Sample {
            point: record.point,
            dist,
            feed: record.feed,
            emit: record.emit,
        };

        match self.last.is_some() && !record.is_travel() {
            true if self.arcs_enabled() => self.push_arc(sample),
            true => self.linear(&sample),
            false => {
                self.drain();
                self.travel(record.point);
            }
        }

        if record.retract {
            self.drain();
            self.retract();
        }

        self.last = Some(record.point);
    }

    /// Drains the window and returns the motion stream.
    pub fn finish(mut self) -> Vec<Motion> {
        self.drain();
        self.out
    }

    fn push_arc(&mut self, sample: Sample) {
        self.window.push_back(sample);
        let len = self.window.len();
        if len < 3 {
            return;
        }

        let w = &self.window;
        let Some(circle) = center2d(&w[0].point, &w[len / 2].point, &w[len - 1].point) else {
            // The new point is not on the window's circle, it starts the next one.
            if let Some(defer) = self.window.pop_back() {
                self.drain();
                self.window.push_back(defer);
            }
            return;
        };

        let rad_fault = match center2d(&w[len - 1].point, &w[len - 2].point, &w[len - 3].point) {
            Some(local) => step_angle(sample.dist, local.radius) > self.step_limit(),
            None => true,
        };

        let drift = match len {
            3 => {
                self.centers = vec![circle];
                0.0
            }
            _ => (circle.center - average(&self.centers).center).norm(),
        };
        let radius_sum = self.centers.iter().map(|c| c.radius).sum::<f64>();

        let first = self.window[0];
        let rejected = first.emit != sample.emit
            || first.feed != sample.feed
            || drift * self.centers.len() as f64 / radius_sum > self.params.arc_tolerance
            || sample.dist > circle.radius
            || circle.radius > self.params.arc_max_radius
            || rad_fault
            || !self.arc_valid();

        if !rejected {
            self.centers.push(circle);
            return;
        }

        if len == 4 {
            // Too short for an arc, give up the oldest point and refit.
            self.emit_front();
            let w = &self.window;
            match center2d(&w[0].point, &w[1].point, &w[2].point) {
                None => self.emit_front(),
                Some(circle) => {
                    let step = step_angle(w[1].dist, circle.radius);
                    self.centers = vec![circle];
                    if step > self.step_limit() {
                        self.emit_front();
                    }
                }
            }
        } else if let Some(defer) = self.window.pop_back() {
            self.drain();
            self.window.push_back(defer);
        }
    }

    /// Checks the whole window against one circle: every end-anchored fit
    /// agrees on the center, every point sits on the radius, no step is
    /// too coarse and every local fit is close to the common radius.
    fn arc_valid(&self) -> bool {
        let w = &self.window;
        let len = w.len();
        if len < 3 {
            return false;
        }

        let Some(fits) = (0..len - 2)
            .map(|i| center2d(&w[0].point, &w[i + 1].point, &w[len - 1].point))
            .collect::<Option<Vec<_>>>()
        else {
            return false;
        };

        let tolerance = self.params.arc_tolerance;
        let avg = average(&fits);

        fits.iter()
            .all(|fit| (fit.center - avg.center).norm() / avg.radius <= tolerance)
            && w.iter().all(|s| {
                let radius = (s.point.xy() - avg.center).norm();
                (radius - avg.radius).abs() <= avg.radius * tolerance
            })
            && w.iter()
                .skip(1)
                .all(|s| step_angle(s.dist, avg.radius) <= self.step_limit())
            && w.iter().zip(w.iter().skip(1)).zip(w.iter().skip(2)).all(|((a, b), c)| {
                center2d(&a.point, &b.point, &c.point).is_some_and(|local| {
                    ((local.radius - avg.radius) / local.radius).abs() <= self.params.arc_deviation
                })
            })
    }

    /// Writes out the window, as one arc if it is long enough to trust.
    fn drain(&mut self) {
        if self.window.len() > 4 && !self.centers.is_empty() {
            self.drain_arc();
        }

        while let Some(sample) = self.window.pop_front() {
            self.linear(&sample);
        }
        self.centers.clear();
    }

    fn drain_arc(&mut self) {
        let (Some(&from), Some(&to)) = (self.window.front(), self.window.back()) else {
            return;
        };

        let first = self.centers[0].center - from.point.xy();
        let heading = self.window[1].point.xy() - from.point.xy();
        let clockwise = heading.perp(&first) < 0.0;

        let avg = average(&self.centers);
        let angle = theta_diff(
            (from.point.y - avg.center.y).atan2(from.point.x - avg.center.x),
            (to.point.y - avg.center.y).atan2(to.point.x - avg.center.x),
            clockwise,
        );

        let center = match angle.abs() <= 3.0 * PI / 4.0 {
            true => center2pr(&from.point, &to.point, avg.radius, clockwise),
            false => None,
        }
        .unwrap_or(avg.center);

        self.linear(&from);
        let dist = self.window.iter().skip(1).map(|s| s.dist).sum::<f64>();
        let emit = from.emit * self.params.emit_per_mm * dist;
        let offset = center - self.position.xy();

        trace!(
            "Merged {} points into arc r={:.3}",
            self.window.len() - 1,
            avg.radius
        );
        self.out.push(Motion::Arc {
            to: to.point,
            center_offset: [offset.x, offset.y],
            clockwise,
            feed: from.feed,
            emit,
        });

        self.emitted += emit;
        self.position = to.point;
        self.window.clear();
    }

    fn emit_front(&mut self) {
        if let Some(sample) = self.window.pop_front() {
            self.linear(&sample);
        }
    }

    /// Moves cutting downward are capped at the plunge rate.
    fn feed_to(&self, to: &Pos, feed: f64) -> f64 {
        match to.z < self.position.z - precision::SLICE_Z {
            true => feed.min(self.params.plunge_rate),
            false => feed,
        }
    }

    fn linear(&mut self, sample: &Sample) {
        let emit = sample.dist * self.params.emit_per_mm * sample.emit;
        self.out.push(Motion::Linear {
            to: sample.point,
            feed: self.feed_to(&sample.point, sample.feed),
            emit,
        });
        self.emitted += emit;
        self.position = sample.point;
    }

    fn travel(&mut self, point: Pos) {
        let mut to = point;
        if self.hop_from.is_some() {
            to.z = self.position.z;
        }

        self.out.push(Motion::Travel {
            to,
            feed: self.feed_to(&to, self.params.seek_rate),
        });
        self.position = to;
    }

    /// Pulls material back, hopping up if configured. Does nothing when
    /// already retracted.
    pub fn retract(&mut self) {
        if self.retracted.is_some() {
            return;
        }

        let distance = self.params.retract_distance;
        self.retracted = Some(distance);
        self.out.push(Motion::Retract {
            distance,
            feed: self.params.retract_speed,
            firmware: self.params.firmware_retract,
        });

        if self.params.z_hop > 0.0 {
            self.hop_from = Some(self.position.z);
            self.position.z += self.params.z_hop;
            self.out.push(Motion::ZHop {
                z: self.position.z,
                feed: self.params.seek_rate,
            });
        }
    }

    /// Undoes a retract, dropping back from a z-hop first. Does nothing when
    /// not retracted.
    pub fn unretract(&mut self) {
        let Some(distance) = self.retracted.take() else {
            return;
        };
        self.drain();

        if let Some(z) = self.hop_from.take() {
            if self.position.z != z {
                self.position.z = z;
                self.out.push(Motion::ZHop {
                    z,
                    feed: self.params.seek_rate,
                });
            }
        }

        self.out.push(Motion::Unretract {
            distance,
            feed: self.params.retract_speed,
            firmware: self.params.firmware_retract,
        });

        if self.params.retract_dwell_ms > 0 {
            self.out.push(Motion::Dwell {
                ms: self.params.retract_dwell_ms,
            });
        }
    }
}

fn average(circles: &[Circle]) -> Circle {
    let count = circles.len().max(1) as f64;
    let center = circles.iter().map(|c| c.center).sum::<Vector2<f64>>() / count;
    let radius = circles.iter().map(|c| c.radius).sum::<f64>() / count;
    Circle { center, radius }
}

/// Runs `records` through a fresh [`ArcEmitter`].
pub fn emit_motion(params: &EmitParams, records: &[MoveRecord]) -> Vec<Motion> {
    let mut emitter = ArcEmitter::new(params.clone());
    for record in records {
        emitter.push(record);
    }
    emitter.finish()
}
