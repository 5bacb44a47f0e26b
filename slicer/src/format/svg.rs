use std::io::{self, Write};

use nalgebra::Vector2;
use svg::{
    node::element::{Polygon as SvgPolygon, Polyline, Rectangle},
    Document,
};

use crate::{
    geometry::{Bounds, Polygon},
    slice::SliceStack,
};

const MARGIN: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Outer,
    Hole,
    Open,
}

impl Kind {
    fn color(self) -> &'static str {
        match self {
            Kind::Outer => "black",
            Kind::Hole => "red",
            Kind::Open => "blue",
        }
    }
}

struct Path {
    kind: Kind,
    points: Vec<Vector2<f64>>,
}

/// Renders every slice of a stack into one SVG, laid out on a square grid
/// from the bottom slice up.
pub struct SvgFile {
    layers: Vec<Vec<Path>>,
    bounds: Bounds,
}

impl SvgFile {
    pub fn from_stack(stack: &SliceStack) -> Self {
        let mut bounds = Bounds::empty();
        let layers = stack
            .slices()
            .iter()
            .map(|slice| {
                let mut paths = Vec::new();
                for top in &slice.tops {
                    collect(top, Kind::Outer, &mut paths, &mut bounds);
                }
                paths
            })
            .collect();

        Self { layers, bounds }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn document(&self) -> Document {
        let sides = self.layers.len().isqrt() + 1;
        let (width, height) = match self.bounds.is_empty() {
            true => (1.0, 1.0),
            false => (
                self.bounds.width() + MARGIN * 2.0,
                self.bounds.height() + MARGIN * 2.0,
            ),
        };
        let size = (width * sides as f64, height * sides as f64);
        let origin = match self.bounds.is_empty() {
            true => Vector2::zeros(),
            false => self.bounds.min - Vector2::repeat(MARGIN),
        };

        let mut svg = Document::new()
            .set("viewBox", (0, 0, size.0, size.1))
            .set("width", format!("{}mm", size.0))
            .set("height", format!("{}mm", size.1));

        for (idx, layer) in self.layers.iter().enumerate() {
            let (x, y) = (idx % sides, idx / sides);
            let offset = Vector2::new(x as f64 * width, y as f64 * height) - origin;

            svg = svg.add(
                Rectangle::new()
                    .set("x", x as f64 * width)
                    .set("y", y as f64 * height)
                    .set("width", width)
                    .set("height", height)
                    .set("fill", "none")
                    .set("stroke", "gray")
                    .set("stroke-width", "0.1"),
            );

            for path in layer {
                let points = path
                    .points
                    .iter()
                    .map(|p| p + offset)
                    .map(|p| (p.x, p.y))
                    .collect::<Vec<_>>();

                svg = match path.kind {
                    Kind::Open => svg.add(
                        Polyline::new()
                            .set("points", points)
                            .set("fill", "none")
                            .set("stroke", path.kind.color())
                            .set("stroke-width", "0.1"),
                    ),
                    _ => svg.add(
                        SvgPolygon::new()
                            .set("points", points)
                            .set("fill", "none")
                            .set("stroke", path.kind.color())
                            .set("stroke-width", "0.1"),
                    ),
                };
            }
        }

        svg
    }

    pub fn write<W: Write>(&self, writer: W) -> io::Result<()> {
        svg::write(writer, &self.document())
    }
}

fn collect(poly: &Polygon, kind: Kind, out: &mut Vec<Path>, bounds: &mut Bounds) {
    for point in poly.points() {
        bounds.include(point);
    }

    out.push(Path {
        kind: if poly.is_open() { Kind::Open } else { kind },
        points: poly.points().iter().map(|p| p.xy()).collect(),
    });

    let child = match kind {
        Kind::Hole => Kind::Outer,
        _ => Kind::Hole,
    };
    for inner in &poly.inner {
        collect(inner, child, out, bounds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{geometry::polygon::tests::rect, slice::Slice};

    #[test]
    fn holes_and_open_paths_are_coloured() {
        let mut outer = rect(0.0, 0.0, 10.0, 10.0);
        outer.inner.push(rect(2.0, 2.0, 2.0, 2.0));
        let open = Polygon::from_xy(&[(20.0, 0.0), (25.0, 0.0)], 0.0).with_open(true);

        let mut slice = Slice::new(0.0, 0);
        slice.tops = vec![outer, open];
        let file = SvgFile::from_stack(&SliceStack::new(vec![slice, Slice::new(1.0, 1)]));
        assert_eq!(file.layer_count(), 2);

        let mut out = Vec::new();
        file.write(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(text.matches("<polygon").count(), 2);
        assert_eq!(text.matches("<polyline").count(), 1);
        assert!(text.contains("stroke=\"red\""));
        assert!(text.contains("stroke=\"blue\""));
        assert_eq!(text.matches("<rect").count(), 2);
    }
}
