use super::*;

use std::collections::BTreeMap;

use serde::Serializer;
use serde::ser::SerializeMap;

static MULTI_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" {2,}").expect("multi-space regex is valid"));
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"TABLA_PLACEHOLDER(\d+)_").expect("placeholder regex is valid"));

const PLACEHOLDER_PREFIX: &str = "TABLA_PLACEHOLDER";

/// Why a candidate was not accepted as a real table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    TooFewRows,
    NoGridEvidence,
    SparseHeader,
    LowDensity,
    SignatureBlock,
    AlignedShortText,
    SingleColumn,
    HeaderRepeatsData,
}

impl Rejection {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::TooFewRows => "too_few_rows",
            Self::NoGridEvidence => "no_grid_evidence",
            Self::SparseHeader => "sparse_header",
            Self::LowDensity => "low_density",
            Self::SignatureBlock => "signature_block",
            Self::AlignedShortText => "aligned_short_text",
            Self::SingleColumn => "single_column",
            Self::HeaderRepeatsData => "header_repeats_data",
        }
    }
}

/// Runs the acceptance checks in order and reports the first one that fails.
pub(crate) fn validate_table(
    candidate: &TableCandidate,
    page_edges: &[Segment],
    config: &TableConfig,
) -> std::result::Result<(), Rejection> {
    let rows = &candidate.rows;
    if rows.len() < config.min_rows.max(2) {
        return Err(Rejection::TooFewRows);
    }

    if candidate.origin == CandidateOrigin::Lattice {
        let evidence = candidate
            .bbox
            .map(|bbox| has_grid_evidence(&bbox, page_edges, config))
            .unwrap_or(false);
        if !evidence {
            return Err(Rejection::NoGridEvidence);
        }
    }

    let header = &rows[0];
    let header_filled = header
        .iter()
        .filter(|cell| cell_has_text(cell.as_deref()))
        .count();
    if header_filled < config.min_header_cells {
        return Err(Rejection::SparseHeader);
    }

    let filled = candidate.filled_cells();
    let total = rows.iter().map(Vec::len).sum::<usize>();
    if total == 0
        || filled < config.min_filled_cells
        || (filled as f64 / total as f64) < config.min_fill_density
    {
        return Err(Rejection::LowDensity);
    }

    let all_text = rows
        .iter()
        .flatten()
        .flatten()
        .map(|cell| cell.to_lowercase())
        .collect::<Vec<String>>()
        .join(" ");
    let signature_hits = config
        .signature_keywords
        .iter()
        .filter(|keyword| all_text.contains(keyword.as_str()))
        .count();
    if signature_hits >= config.signature_min_hits && rows.len() <= config.signature_max_rows {
        return Err(Rejection::SignatureBlock);
    }

    if header.len() <= config.short_header_max_cells {
        let header_is_short = header
            .iter()
            .flatten()
            .all(|cell| cell.split_whitespace().count() <= config.short_header_max_words);
        if header_is_short {
            let data_words = rows[1..]
                .iter()
                .flatten()
                .flatten()
                .flat_map(|cell| cell.split_whitespace())
                .collect::<Vec<&str>>();
            if !data_words.is_empty() {
                let average = data_words
                    .iter()
                    .map(|word| word.chars().count())
                    .sum::<usize>() as f64
                    / data_words.len() as f64;
                if average < config.short_data_min_avg_word_len {
                    return Err(Rejection::AlignedShortText);
                }
            }
        }
    }

    let significant_columns = (0..header.len())
        .filter(|&column| {
            rows.iter()
                .filter(|row| cell_has_text(row.get(column).and_then(|cell| cell.as_deref())))
                .count()
                >= 2
        })
        .count();
    if significant_columns < config.min_significant_columns {
        return Err(Rejection::SingleColumn);
    }

    let header_text = joined_lowercase(std::slice::from_ref(header));
    let data_text = joined_lowercase(&rows[1..]);
    if header_text == data_text {
        return Err(Rejection::HeaderRepeatsData);
    }

    Ok(())
}

fn joined_lowercase(rows: &[Vec<Option<String>>]) -> String {
    rows.iter()
        .flatten()
        .flatten()
        .filter(|cell| !cell.is_empty())
        .map(|cell| cell.to_lowercase())
        .collect::<Vec<String>>()
        .join(" ")
}

/// Physical rule evidence: enough long horizontal and vertical rules inside the
/// (padded) table box, in a plausible ratio, crossing each other.
pub(crate) fn has_grid_evidence(bbox: &BBox, edges: &[Segment], config: &TableConfig) -> bool {
    let pad = config.bbox_padding;

    let horizontals = edges
        .iter()
        .filter(|edge| edge.orientation() == Some(Orientation::Horizontal))
        .filter(|edge| {
            edge.top >= bbox.top - pad
                && edge.top <= bbox.bottom + pad
                && edge.x0 >= bbox.x0 - pad
                && edge.x1 <= bbox.x1 + pad
                && edge.length() > config.horizontal_rule_min_len
        })
        .collect::<Vec<&Segment>>();

    let verticals = edges
        .iter()
        .filter(|edge| edge.orientation() == Some(Orientation::Vertical))
        .filter(|edge| {
            edge.x0 >= bbox.x0 - pad
                && edge.x0 <= bbox.x1 + pad
                && edge.top >= bbox.top - pad
                && edge.bottom <= bbox.bottom + pad
                && edge.length() > config.vertical_rule_min_len
        })
        .collect::<Vec<&Segment>>();

    if verticals.len() < config.min_vertical_rules || horizontals.len() < config.min_horizontal_rules
    {
        return false;
    }

    let ratio = horizontals.len() as f64 / verticals.len() as f64;
    if ratio < config.min_rule_ratio || ratio > config.max_rule_ratio {
        return false;
    }

    let tolerance = config.intersection_tolerance;
    let intersections = horizontals
        .iter()
        .flat_map(|h| verticals.iter().map(move |v| (h, v)))
        .filter(|(h, v)| {
            v.x0 >= h.x0 - tolerance
                && v.x0 <= h.x1 + tolerance
                && h.top >= v.top - tolerance
                && h.top <= v.bottom + tolerance
        })
        .count();

    intersections >= config.min_intersections
}

/// Row mapping that keeps `columna_N` keys in column order.
#[derive(Debug, Clone, PartialEq)]
struct OrderedRow(Vec<(String, String)>);

impl Serialize for OrderedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Serialize)]
struct TableBody {
    columnas: Vec<String>,
    filas: Vec<OrderedRow>,
}

fn normalize_cell(cell: Option<&str>) -> Option<String> {
    let trimmed = cell?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(MULTI_SPACE.replace_all(trimmed, " ").into_owned())
}

/// Compact JSON for an accepted grid, or `None` when no data row has content.
pub(crate) fn serialize_table(
    rows: &[Vec<Option<String>>],
    index: usize,
    config: &TableConfig,
) -> Option<String> {
    if rows.len() < 2 {
        return None;
    }

    let columnas = rows[0]
        .iter()
        .map(|cell| normalize_cell(cell.as_deref()).unwrap_or_else(|| config.empty_header.clone()))
        .collect::<Vec<String>>();

    let filas = rows[1..]
        .iter()
        .filter_map(|row| {
            let mut has_content = false;
            let cells = row
                .iter()
                .enumerate()
                .map(|(position, cell)| {
                    let value = match normalize_cell(cell.as_deref()) {
                        Some(text) => {
                            has_content = true;
                            text
                        }
                        None => config.empty_cell.clone(),
                    };
                    (format!("columna_{}", position + 1), value)
                })
                .collect::<Vec<(String, String)>>();
            has_content.then_some(OrderedRow(cells))
        })
        .collect::<Vec<OrderedRow>>();

    if filas.is_empty() {
        return None;
    }

    let mut wrapper = BTreeMap::new();
    wrapper.insert(format!("{}{}", config.key_prefix, index), TableBody { columnas, filas });
    serde_json::to_string(&wrapper).ok()
}

/// Serialized tables parked behind placeholder tokens while the prose stages run.
#[derive(Debug, Default)]
pub(crate) struct TableStash {
    tables: Vec<String>,
}

impl TableStash {
    pub(crate) fn park(&mut self, json: String) -> String {
        let token = format!("{PLACEHOLDER_PREFIX}{}_", self.tables.len());
        self.tables.push(json);
        token
    }

    pub(crate) fn len(&self) -> usize {
        self.tables.len()
    }

    pub(crate) fn is_placeholder(line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.starts_with(PLACEHOLDER_PREFIX)
            && PLACEHOLDER
                .find(trimmed)
                .map(|found| found.start() == 0 && found.end() == trimmed.len())
                .unwrap_or(false)
    }

    pub(crate) fn restore(&self, text: &str) -> String {
        PLACEHOLDER
            .replace_all(text, |captures: &regex::Captures<'_>| {
                captures
                    .get(1)
                    .and_then(|index| index.as_str().parse::<usize>().ok())
                    .and_then(|index| self.tables.get(index))
                    .cloned()
                    .unwrap_or_else(|| captures[0].to_string())
            })
            .into_owned()
    }
}
