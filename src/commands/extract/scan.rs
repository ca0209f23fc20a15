use super::*;

/// What the scanned-document heuristic sees of one sampled page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PageSample {
    pub chars: usize,
    pub words: usize,
    pub image_count: usize,
    /// Text blocks longer than the configured block size.
    pub large_text_blocks: usize,
}

impl PageSample {
    pub(crate) fn from_page(
        text: &str,
        layout: Option<&LayoutPage>,
        geometry: Option<&PageGeometry>,
        text_block_chars: usize,
    ) -> Self {
        let large_text_blocks = match layout {
            Some(layout) => layout
                .block_chars
                .iter()
                .filter(|chars| **chars > text_block_chars)
                .count(),
            // without block boxes the page text counts as one block
            None => usize::from(non_whitespace_char_count(text) > text_block_chars),
        };

        Self {
            chars: non_whitespace_char_count(text),
            words: text.split_whitespace().count(),
            image_count: geometry.map(|geometry| geometry.image_count).unwrap_or(0),
            large_text_blocks,
        }
    }
}

/// Returns the reason a document looks scanned, or `None` when its text layer is usable.
pub(crate) fn scanned_reason(samples: &[PageSample], thresholds: &ScanThresholds) -> Option<&'static str> {
    let samples = &samples[..samples.len().min(thresholds.sample_pages)];
    if samples.is_empty() {
        return Some("no pages");
    }

    let total_chars = samples.iter().map(|sample| sample.chars).sum::<usize>();
    let total_words = samples.iter().map(|sample| sample.words).sum::<usize>();
    if total_chars < thresholds.min_chars {
        return Some("too few characters");
    }
    if total_words < thresholds.min_words {
        return Some("too few words");
    }

    if thresholds.readable_page_words > 0 {
        let readable = samples
            .iter()
            .filter(|sample| sample.words > thresholds.readable_page_words)
            .count();
        if (readable as f64) / (samples.len() as f64) < thresholds.min_readable_ratio {
            return Some("too few readable pages");
        }
    }

    if thresholds.image_majority {
        let image_pages = samples
            .iter()
            .filter(|sample| sample.image_count > sample.large_text_blocks)
            .count();
        if image_pages * 2 > samples.len() {
            return Some("images outnumber text blocks");
        }
    }

    None
}
