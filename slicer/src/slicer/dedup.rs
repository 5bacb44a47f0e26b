use std::collections::HashMap;

use tracing::trace;

use super::intersect::{Line, PointArena};

/// Removes duplicate lines and merges chains of collinear lines. A set of
/// duplicates keeps a single copy only if one of them is a triangle edge,
/// since a cut shared by two faces is interior to the surface.
///
/// Merging can expose new duplicates, so both steps repeat until nothing
/// changes. The result is sorted by key.
pub fn remove_duplicate_lines(lines: Vec<Line>, points: &PointArena) -> Vec<Line> {
    let mut lines = drop_duplicates(lines);

    loop {
        let merged = merge_collinear(&mut lines, points);
        let count = lines.len();
        lines = drop_duplicates(lines);

        if merged == 0 && lines.len() == count {
            break;
        }
        trace!("Merged {merged} collinear lines, {} remain", lines.len());
    }

    lines
}

fn drop_duplicates(mut lines: Vec<Line>) -> Vec<Line> {
    lines.sort_by_key(Line::key);

    let mut out = Vec::with_capacity(lines.len());
    for group in lines.chunk_by(|a, b| a.key() == b.key()) {
        match group {
            [line] => out.push(*line),
            _ => out.extend(group.iter().find(|line| line.edge).copied()),
        }
    }

    out
}

/// Replaces every pair of collinear lines meeting at a point of degree two
/// with one line between their far ends. Returns the number of merges.
fn merge_collinear(lines: &mut Vec<Line>, points: &PointArena) -> usize {
    let mut deleted = vec![false; lines.len()];
    let mut links = HashMap::<usize, Vec<usize>>::new();
    for (i, line) in lines.iter().enumerate() {
        links.entry(line.a).or_default().push(i);
        links.entry(line.b).or_default().push(i);
    }

    let mut order = links.keys().copied().collect::<Vec<_>>();
    order.sort_unstable();

    let mut merged = 0;
    for point in order {
        let (l1, l2) = match links.get(&point).map(Vec::as_slice) {
            Some(&[l1, l2]) => (l1, l2),
            _ => continue,
        };

        let (first, second) = (lines[l1], lines[l2]);
        if !first.is_collinear(&second, points) {
            continue;
        }

        let (p1, p2) = (first.other(point), second.other(point));
        if p1 == p2 {
            continue;
        }

        let joined = lines.len();
        lines.push(Line::new(p1, p2, first.edge || second.edge));
        deleted.push(false);
        deleted[l1] = true;
        deleted[l2] = true;
        merged += 1;

        links.remove(&point);
        for end in [p1, p2] {
            if let Some(list) = links.get_mut(&end) {
                list.retain(|&l| l != l1 && l != l2);
                list.push(joined);
            }
        }
    }

    let mut keep = deleted.iter().map(|d| !d);
    lines.retain(|_| keep.next().unwrap_or(true));
    merged
}
