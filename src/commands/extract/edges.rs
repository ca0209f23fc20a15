//! Running headers, footers, margin ribbons and boilerplate catalog removal.

use super::*;

use std::collections::{BTreeMap, BTreeSet};

use crate::config::BoilerplateRule;

/// Lines that repeat at page edges often enough to be page furniture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EdgeLines {
    pub headers: BTreeSet<String>,
    pub footers: BTreeSet<String>,
}

impl EdgeLines {
    pub(crate) fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.footers.is_empty()
    }

    fn matches(&self, line: &str) -> bool {
        self.headers
            .iter()
            .chain(self.footers.iter())
            .any(|edge| line == edge.as_str() || line.contains(edge.as_str()))
    }
}

#[derive(Debug)]
struct CompiledRule {
    pattern: Regex,
    scope: PatternScope,
    unless: Option<Regex>,
}

impl CompiledRule {
    fn compile(rule: &BoilerplateRule) -> Result<Self> {
        Ok(Self {
            pattern: compile_pattern(&rule.pattern, rule.case_insensitive)?,
            scope: rule.scope,
            unless: rule
                .unless
                .as_deref()
                .map(|pattern| compile_pattern(pattern, false))
                .transpose()?,
        })
    }

    fn matches(&self, line: &str, in_edge: bool) -> bool {
        if self.scope == PatternScope::Edge && !in_edge {
            return false;
        }
        self.pattern.is_match(line)
            && !self
                .unless
                .as_ref()
                .is_some_and(|unless| unless.is_match(line))
    }
}

#[derive(Debug)]
pub(crate) struct EdgeCleaner {
    rules: Vec<CompiledRule>,
    structural_exclusion: Regex,
    config: EdgeConfig,
}

impl EdgeCleaner {
    pub(crate) fn new(config: &EdgeConfig) -> Result<Self> {
        let rules = config
            .boilerplate
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            structural_exclusion: compile_pattern(&config.structural_exclusion, false)?,
            config: config.clone(),
        })
    }

    /// Counts the first and last non-blank lines of every page long enough to have furniture.
    pub(crate) fn detect(&self, pages: &[Vec<String>]) -> EdgeLines {
        let qualifying = pages
            .iter()
            .map(|page| {
                page.iter()
                    .map(|line| line.trim())
                    .filter(|line| !line.is_empty())
                    .collect::<Vec<&str>>()
            })
            .filter(|lines| lines.len() >= self.config.min_lines_per_page)
            .collect::<Vec<Vec<&str>>>();

        if qualifying.len() < self.config.min_pages {
            return EdgeLines::default();
        }

        let mut top = BTreeMap::<&str, usize>::new();
        let mut bottom = BTreeMap::<&str, usize>::new();
        for lines in &qualifying {
            let take = self.config.lines_per_edge.min(lines.len());
            for line in &lines[..take] {
                *top.entry(*line).or_default() += 1;
            }
            for line in &lines[lines.len() - take..] {
                *bottom.entry(*line).or_default() += 1;
            }
        }

        let threshold = self.config.repeat_ratio * qualifying.len() as f64;
        let common = |counts: BTreeMap<&str, usize>| {
            counts
                .into_iter()
                .filter(|(line, count)| {
                    let length = line.chars().count();
                    *count as f64 > threshold
                        && *count >= self.config.min_repeats
                        && length >= self.config.min_line_len
                        && length <= self.config.max_line_len
                        && !self.structural_exclusion.is_match(line)
                })
                .map(|(line, _)| line.to_string())
                .collect::<BTreeSet<String>>()
        };

        EdgeLines {
            headers: common(top),
            footers: common(bottom),
        }
    }

    /// Removes boilerplate, repeated edge lines and margin ribbons from one page.
    /// Blank lines and table placeholders are always kept. Returns the removal count.
    pub(crate) fn clean_page(
        &self,
        lines: Vec<String>,
        edges: &EdgeLines,
        margins: &[String],
    ) -> (Vec<String>, usize) {
        let total = lines.len();
        let window = self.config.edge_window;
        let mut removed = 0;

        let kept = lines
            .into_iter()
            .enumerate()
            .filter(|(index, line)| {
                let trimmed = line.trim();
                if trimmed.is_empty() || TableStash::is_placeholder(trimmed) {
                    return true;
                }

                let in_edge = *index < window || index + window >= total;
                let drop = self.rules.iter().any(|rule| rule.matches(trimmed, in_edge))
                    || (in_edge && edges.matches(trimmed))
                    || is_margin_piece(trimmed, margins, self.config.margin_min_len);
                if drop {
                    removed += 1;
                }
                !drop
            })
            .map(|(_, line)| line)
            .collect::<Vec<String>>();

        (kept, removed)
    }
}

fn compact(text: &str) -> String {
    text.chars().filter(|character| !character.is_whitespace()).collect()
}

/// A line is a margin piece when, without spaces, it is part of a recorded ribbon.
fn is_margin_piece(line: &str, margins: &[String], min_len: usize) -> bool {
    let line = compact(line);
    line.chars().count() >= min_len && margins.iter().any(|ribbon| ribbon.contains(&line))
}

/// Concatenates the words sitting in the outer side margins of a page, one string per side.
pub(crate) fn collect_margin_text(layout: &LayoutPage, ratio: f64, min_len: usize) -> Vec<String> {
    if layout.width <= 0.0 {
        return Vec::new();
    }
    let left_edge = layout.width * ratio;
    let right_edge = layout.width * (1.0 - ratio);

    let mut left = layout
        .words
        .iter()
        .filter(|word| word.bbox.x0 < left_edge)
        .collect::<Vec<&PositionedWord>>();
    let mut right = layout
        .words
        .iter()
        .filter(|word| word.bbox.x0 > right_edge)
        .collect::<Vec<&PositionedWord>>();

    let mut ribbons = Vec::new();
    for side in [&mut left, &mut right] {
        side.sort_by(|a, b| a.bbox.top.total_cmp(&b.bbox.top));
        let ribbon = side
            .iter()
            .map(|word| compact(&word.text))
            .collect::<String>();
        if ribbon.chars().count() >= min_len {
            ribbons.push(ribbon);
        }
    }
    ribbons
}

/// Unions per-page ribbons, preserving first-seen order.
pub(crate) fn merge_margin_text<'a>(pages: impl IntoIterator<Item = &'a [String]>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for ribbon in pages.into_iter().flatten() {
        if seen.insert(ribbon.clone()) {
            merged.push(ribbon.clone());
        }
    }
    merged
}
