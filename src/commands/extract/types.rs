use super::*;

use thiserror::Error;

/// Failure of one extraction collaborator; callers fall through to the next one.
#[derive(Debug, Error)]
pub(crate) enum ExtractError {
    #[error("{tool} is not available on PATH")]
    ToolUnavailable { tool: &'static str },
    #[error("{tool} failed for {path}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        path: String,
        stderr: String,
    },
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },
    #[error("{0} produced no usable text")]
    Empty(&'static str),
    #[error("unsupported document kind: {0}")]
    Unsupported(&'static str),
}

impl ExtractError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

pub(crate) type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Page-space rectangle, origin top-left, y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BBox {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl BBox {
    pub(crate) fn new(x0: f64, top: f64, x1: f64, bottom: f64) -> Self {
        Self {
            x0: x0.min(x1),
            top: top.min(bottom),
            x1: x0.max(x1),
            bottom: top.max(bottom),
        }
    }

    pub(crate) fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.top + self.bottom) / 2.0)
    }

    pub(crate) fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.top && y <= self.bottom
    }

    pub(crate) fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            top: self.top.min(other.top),
            x1: self.x1.max(other.x1),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Orientation {
    Horizontal,
    Vertical,
}

/// A straight rule drawn on the page (table border, underline, frame side).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Segment {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl Segment {
    pub(crate) fn horizontal(x0: f64, x1: f64, y: f64) -> Self {
        Self {
            x0: x0.min(x1),
            top: y,
            x1: x0.max(x1),
            bottom: y,
        }
    }

    pub(crate) fn vertical(x: f64, top: f64, bottom: f64) -> Self {
        Self {
            x0: x,
            top: top.min(bottom),
            x1: x,
            bottom: top.max(bottom),
        }
    }

    pub(crate) fn orientation(&self) -> Option<Orientation> {
        const AXIS_TOLERANCE: f64 = 1.0;
        let dx = (self.x1 - self.x0).abs();
        let dy = (self.bottom - self.top).abs();
        if dy <= AXIS_TOLERANCE && dx > dy {
            Some(Orientation::Horizontal)
        } else if dx <= AXIS_TOLERANCE && dy > dx {
            Some(Orientation::Vertical)
        } else {
            None
        }
    }

    pub(crate) fn length(&self) -> f64 {
        match self.orientation() {
            Some(Orientation::Horizontal) => self.x1 - self.x0,
            Some(Orientation::Vertical) => self.bottom - self.top,
            None => ((self.x1 - self.x0).powi(2) + (self.bottom - self.top).powi(2)).sqrt(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PositionedWord {
    pub text: String,
    pub bbox: BBox,
}

/// Positioned text of one page as reported by the layout source.
#[derive(Debug, Clone, Default)]
pub(crate) struct LayoutPage {
    pub width: f64,
    pub height: f64,
    pub words: Vec<PositionedWord>,
    /// Character count of each text block on the page.
    pub block_chars: Vec<usize>,
}

/// Vector and raster content of one page.
#[derive(Debug, Clone, Default)]
pub(crate) struct PageGeometry {
    pub edges: Vec<Segment>,
    pub image_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum CandidateOrigin {
    /// Ruled grid found from page geometry; grid evidence is checked.
    Lattice,
    /// Aligned OCR tokens; there is no geometry to check.
    Ocr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableCandidate {
    pub bbox: Option<BBox>,
    pub rows: Vec<Vec<Option<String>>>,
    pub origin: CandidateOrigin,
}

impl TableCandidate {
    pub(crate) fn filled_cells(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter(|cell| cell_has_text(cell.as_deref()))
            .count()
    }
}

pub(crate) fn cell_has_text(cell: Option<&str>) -> bool {
    cell.map(|text| !text.trim().is_empty()).unwrap_or(false)
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RawPage {
    pub number: usize,
    pub text: String,
    pub tables: Vec<TableCandidate>,
    pub edges: Vec<Segment>,
    pub margin_text: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RawDocument {
    pub pages: Vec<RawPage>,
    pub is_scanned: bool,
    pub backend: String,
    pub ocr_page_count: usize,
    pub warnings: Vec<String>,
}

impl RawDocument {
    pub(crate) fn raw_text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.text.as_str())
            .collect::<Vec<&str>>()
            .join("\n")
    }
}

pub(crate) fn non_whitespace_char_count(text: &str) -> usize {
    text.chars()
        .filter(|character| !character.is_whitespace())
        .count()
}
