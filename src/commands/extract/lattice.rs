//! Ruled-table finder: rules are snapped and joined, their crossings become
//! junctions, and every rectangle closed on all four sides becomes a cell.

use super::*;

use crate::config::LatticeConfig;

type JunctionKey = (i64, i64);

#[derive(Debug, Default)]
struct Junction {
    x: f64,
    y: f64,
    horizontals: HashSet<usize>,
    verticals: HashSet<usize>,
}

fn junction_key(x: f64, y: f64) -> JunctionKey {
    ((x * 100.0).round() as i64, (y * 100.0).round() as i64)
}

pub(crate) fn find_lattice_tables(
    edges: &[Segment],
    words: &[PositionedWord],
    config: &LatticeConfig,
) -> Vec<TableCandidate> {
    let (horizontals, verticals) = normalize_edges(edges, config);
    if horizontals.len() < 2 || verticals.len() < 2 {
        return Vec::new();
    }

    let junctions = find_junctions(&horizontals, &verticals, config.intersection_tolerance);
    let cells = find_cells(&junctions);
    if cells.is_empty() {
        return Vec::new();
    }

    group_cells(&cells)
        .into_iter()
        .filter(|group| group.len() >= 2)
        .map(|group| build_candidate(&group, words, config.line_tolerance))
        .collect()
}

fn normalize_edges(edges: &[Segment], config: &LatticeConfig) -> (Vec<Segment>, Vec<Segment>) {
    let mut horizontals = Vec::new();
    let mut verticals = Vec::new();

    for edge in edges {
        if edge.length() < config.edge_min_length {
            continue;
        }
        match edge.orientation() {
            Some(Orientation::Horizontal) => horizontals.push(*edge),
            Some(Orientation::Vertical) => verticals.push(*edge),
            None => {}
        }
    }

    let horizontals = join_collinear(
        snap(horizontals, Orientation::Horizontal, config.snap_tolerance),
        Orientation::Horizontal,
        config.join_tolerance,
    );
    let verticals = join_collinear(
        snap(verticals, Orientation::Vertical, config.snap_tolerance),
        Orientation::Vertical,
        config.join_tolerance,
    );

    (horizontals, verticals)
}

fn position(edge: &Segment, orientation: Orientation) -> f64 {
    match orientation {
        Orientation::Horizontal => edge.top,
        Orientation::Vertical => edge.x0,
    }
}

/// Moves nearly-collinear rules onto their cluster's mean coordinate.
fn snap(mut edges: Vec<Segment>, orientation: Orientation, tolerance: f64) -> Vec<Segment> {
    edges.sort_by(|a, b| position(a, orientation).total_cmp(&position(b, orientation)));

    let mut snapped = Vec::with_capacity(edges.len());
    let mut cluster: Vec<Segment> = Vec::new();

    let flush = |cluster: &mut Vec<Segment>, snapped: &mut Vec<Segment>| {
        if cluster.is_empty() {
            return;
        }
        let mean = cluster.iter().map(|edge| position(edge, orientation)).sum::<f64>()
            / cluster.len() as f64;
        for edge in cluster.drain(..) {
            snapped.push(match orientation {
                Orientation::Horizontal => Segment::horizontal(edge.x0, edge.x1, mean),
                Orientation::Vertical => Segment::vertical(mean, edge.top, edge.bottom),
            });
        }
    };

    for edge in edges {
        let anchor = cluster.first().map(|first| position(first, orientation));
        if let Some(anchor) = anchor {
            if position(&edge, orientation) - anchor > tolerance {
                flush(&mut cluster, &mut snapped);
            }
        }
        cluster.push(edge);
    }
    flush(&mut cluster, &mut snapped);

    snapped
}

/// Merges rules on the same line whose extents touch or nearly touch.
fn join_collinear(mut edges: Vec<Segment>, orientation: Orientation, tolerance: f64) -> Vec<Segment> {
    let extent = |edge: &Segment| match orientation {
        Orientation::Horizontal => (edge.x0, edge.x1),
        Orientation::Vertical => (edge.top, edge.bottom),
    };

    edges.sort_by(|a, b| {
        position(a, orientation)
            .total_cmp(&position(b, orientation))
            .then(extent(a).0.total_cmp(&extent(b).0))
    });

    let mut joined: Vec<Segment> = Vec::with_capacity(edges.len());
    for edge in edges {
        if let Some(last) = joined.last_mut() {
            let same_line = position(last, orientation) == position(&edge, orientation);
            let (start, end) = extent(&edge);
            let (_, last_end) = extent(last);
            if same_line && start <= last_end + tolerance {
                let merged_end = last_end.max(end);
                match orientation {
                    Orientation::Horizontal => last.x1 = merged_end,
                    Orientation::Vertical => last.bottom = merged_end,
                }
                continue;
            }
        }
        joined.push(edge);
    }

    joined
}

fn find_junctions(
    horizontals: &[Segment],
    verticals: &[Segment],
    tolerance: f64,
) -> HashMap<JunctionKey, Junction> {
    let mut junctions = HashMap::<JunctionKey, Junction>::new();

    for (v_index, v) in verticals.iter().enumerate() {
        for (h_index, h) in horizontals.iter().enumerate() {
            let crosses = v.x0 >= h.x0 - tolerance
                && v.x0 <= h.x1 + tolerance
                && h.top >= v.top - tolerance
                && h.top <= v.bottom + tolerance;
            if !crosses {
                continue;
            }

            let junction = junctions
                .entry(junction_key(v.x0, h.top))
                .or_insert_with(|| Junction {
                    x: v.x0,
                    y: h.top,
                    ..Junction::default()
                });
            junction.horizontals.insert(h_index);
            junction.verticals.insert(v_index);
        }
    }

    junctions
}

fn share_rule(a: &HashSet<usize>, b: &HashSet<usize>) -> bool {
    a.iter().any(|index| b.contains(index))
}

fn find_cells(junctions: &HashMap<JunctionKey, Junction>) -> Vec<BBox> {
    let mut points = junctions.values().collect::<Vec<&Junction>>();
    points.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let mut cells = Vec::new();
    for (index, point) in points.iter().enumerate() {
        let rest = &points[index + 1..];
        let below = rest
            .iter()
            .filter(|other| other.x == point.x && other.y > point.y)
            .collect::<Vec<_>>();
        let mut right = rest
            .iter()
            .filter(|other| other.y == point.y && other.x > point.x)
            .collect::<Vec<_>>();
        right.sort_by(|a, b| a.x.total_cmp(&b.x));

        'search: for lower in &below {
            if !share_rule(&point.verticals, &lower.verticals) {
                continue;
            }
            for side in &right {
                if !share_rule(&point.horizontals, &side.horizontals) {
                    continue;
                }
                let Some(corner) = junctions.get(&junction_key(side.x, lower.y)) else {
                    continue;
                };
                if share_rule(&corner.verticals, &side.verticals)
                    && share_rule(&corner.horizontals, &lower.horizontals)
                {
                    cells.push(BBox::new(point.x, point.y, side.x, lower.y));
                    break 'search;
                }
            }
        }
    }

    cells
}

fn corners(cell: &BBox) -> [JunctionKey; 4] {
    [
        junction_key(cell.x0, cell.top),
        junction_key(cell.x1, cell.top),
        junction_key(cell.x0, cell.bottom),
        junction_key(cell.x1, cell.bottom),
    ]
}

/// Cells sharing a corner belong to the same table.
fn group_cells(cells: &[BBox]) -> Vec<Vec<BBox>> {
    let mut parent = (0..cells.len()).collect::<Vec<usize>>();

    fn root(parent: &mut [usize], mut index: usize) -> usize {
        while parent[index] != index {
            parent[index] = parent[parent[index]];
            index = parent[index];
        }
        index
    }

    let mut owner = HashMap::<JunctionKey, usize>::new();
    for (index, cell) in cells.iter().enumerate() {
        for corner in corners(cell) {
            match owner.get(&corner) {
                Some(&other) => {
                    let a = root(&mut parent, index);
                    let b = root(&mut parent, other);
                    if a != b {
                        parent[a] = b;
                    }
                }
                None => {
                    owner.insert(corner, index);
                }
            }
        }
    }

    let mut groups = Vec::<Vec<BBox>>::new();
    let mut group_of_root = HashMap::<usize, usize>::new();
    for (index, cell) in cells.iter().enumerate() {
        let root_index = root(&mut parent, index);
        let slot = *group_of_root.entry(root_index).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(*cell);
    }

    groups.sort_by(|a, b| {
        let top = |group: &Vec<BBox>| group.iter().map(|cell| cell.top).fold(f64::MAX, f64::min);
        top(a).total_cmp(&top(b))
    });
    groups
}

fn distinct_sorted(mut values: Vec<f64>) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    values.dedup();
    values
}

fn build_candidate(cells: &[BBox], words: &[PositionedWord], line_tolerance: f64) -> TableCandidate {
    let row_tops = distinct_sorted(cells.iter().map(|cell| cell.top).collect());
    let column_lefts = distinct_sorted(cells.iter().map(|cell| cell.x0).collect());

    let rows = row_tops
        .iter()
        .map(|top| {
            column_lefts
                .iter()
                .map(|left| {
                    cells
                        .iter()
                        .find(|cell| cell.top == *top && cell.x0 == *left)
                        .and_then(|cell| cell_text(cell, words, line_tolerance))
                })
                .collect::<Vec<Option<String>>>()
        })
        .collect::<Vec<Vec<Option<String>>>>();

    let bbox = cells
        .iter()
        .skip(1)
        .fold(cells[0], |acc, cell| acc.union(cell));

    TableCandidate {
        bbox: Some(bbox),
        rows,
        origin: CandidateOrigin::Lattice,
    }
}

/// Words centred inside the cell, one output line per visual line.
fn cell_text(cell: &BBox, words: &[PositionedWord], line_tolerance: f64) -> Option<String> {
    let mut inside = words
        .iter()
        .filter(|word| {
            let (x, y) = word.bbox.center();
            cell.contains_point(x, y)
        })
        .collect::<Vec<&PositionedWord>>();
    if inside.is_empty() {
        return None;
    }
    inside.sort_by(|a, b| a.bbox.top.total_cmp(&b.bbox.top).then(a.bbox.x0.total_cmp(&b.bbox.x0)));

    let mut lines: Vec<(f64, Vec<&PositionedWord>)> = Vec::new();
    for word in inside {
        match lines.last_mut() {
            Some((top, members)) if (word.bbox.top - *top).abs() <= line_tolerance => {
                members.push(word)
            }
            _ => lines.push((word.bbox.top, vec![word])),
        }
    }

    let text = lines
        .into_iter()
        .map(|(_, mut members)| {
            members.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
            members
                .iter()
                .map(|word| word.text.as_str())
                .collect::<Vec<&str>>()
                .join(" ")
        })
        .collect::<Vec<String>>()
        .join("\n");

    (!text.trim().is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x0: f64, top: f64) -> PositionedWord {
        PositionedWord {
            text: text.to_string(),
            bbox: BBox::new(x0, top, x0 + 6.0 * text.chars().count() as f64, top + 10.0),
        }
    }

    #[test]
    fn ruled_two_by_three_grid_becomes_one_candidate() {
        let mut edges = [100.0, 130.0, 160.0, 190.0]
            .iter()
            .map(|y| Segment::horizontal(72.0, 472.0, *y))
            .collect::<Vec<Segment>>();
        // split rule pieces and a slightly offset stroke are normalized before use
        edges.push(Segment::vertical(72.0, 100.0, 150.0));
        edges.push(Segment::vertical(72.0, 151.0, 190.0));
        edges.push(Segment::vertical(272.5, 100.0, 190.0));
        edges.push(Segment::vertical(472.0, 100.0, 190.0));

        let words = vec![
            word("Zona", 80.0, 110.0),
            word("Cuota", 280.0, 110.0),
            word("Centro", 80.0, 140.0),
            word("histórico", 80.0, 150.0),
            word("150.00", 280.0, 140.0),
            word("Periferia", 80.0, 170.0),
        ];

        let tables = find_lattice_tables(&edges, &words, &LatticeConfig::default());
        assert_eq!(tables.len(), 1);

        let table = &tables[0];
        assert_eq!(table.rows.len(), 3);
        assert!(table.rows.iter().all(|row| row.len() == 2));
        assert_eq!(table.rows[0][0].as_deref(), Some("Zona"));
        assert_eq!(table.rows[1][0].as_deref(), Some("Centro\nhistórico"));
        assert_eq!(table.rows[2][1], None);

        let bbox = table.bbox.expect("bbox");
        assert_eq!((bbox.x0, bbox.top, bbox.x1, bbox.bottom), (72.0, 100.0, 472.0, 190.0));
    }

    #[test]
    fn open_rules_without_closed_cells_yield_nothing() {
        let edges = vec![
            Segment::horizontal(72.0, 472.0, 100.0),
            Segment::horizontal(72.0, 472.0, 300.0),
            Segment::vertical(600.0, 100.0, 300.0),
            Segment::vertical(700.0, 100.0, 300.0),
        ];
        assert!(find_lattice_tables(&edges, &[], &LatticeConfig::default()).is_empty());
    }
}
