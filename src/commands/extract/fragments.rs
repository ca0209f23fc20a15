//! Letter-spaced ribbon text (rotated margin decorations) is dropped wherever it appears.

use super::*;

static ROMAN_NUMERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[IVXLCDM]+$").expect("valid roman numeral regex"));

#[derive(Debug)]
pub(crate) struct FragmentFilter {
    ribbons: Vec<Regex>,
    spaced_letters: Regex,
    space_ratio: f64,
    short_line_max_chars: usize,
    min_tokens: usize,
    short_token_len: usize,
    short_token_ratio: f64,
}

impl FragmentFilter {
    pub(crate) fn new(config: &FragmentConfig) -> Result<Self> {
        let ribbons = config
            .ribbon_patterns
            .iter()
            .map(|pattern| compile_pattern(pattern, false))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            ribbons,
            spaced_letters: compile_pattern(&config.spaced_letters_pattern, false)?,
            space_ratio: config.space_ratio,
            short_line_max_chars: config.short_line_max_chars,
            min_tokens: config.min_tokens,
            short_token_len: config.short_token_len,
            short_token_ratio: config.short_token_ratio,
        })
    }

    pub(crate) fn is_fragment(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }

        if self.ribbons.iter().any(|ribbon| ribbon.is_match(line)) {
            return true;
        }

        let spaces = line.chars().filter(|character| *character == ' ').count();
        let visible = non_whitespace_char_count(line);
        if visible > 0 && spaces as f64 >= self.space_ratio * visible as f64 {
            return true;
        }

        if line.chars().count() <= self.short_line_max_chars {
            let all_upper = line.chars().all(|character| character.is_uppercase());
            if all_upper && !ROMAN_NUMERAL.is_match(line) {
                return true;
            }
            let mut characters = line.chars();
            if let (Some(only), None) = (characters.next(), characters.next()) {
                if only.is_ascii_digit() {
                    return true;
                }
            }
        }

        let tokens = line.split_whitespace().collect::<Vec<&str>>();
        if tokens.len() >= self.min_tokens {
            let short = tokens
                .iter()
                .filter(|token| token.chars().count() <= self.short_token_len)
                .count();
            if short as f64 >= self.short_token_ratio * tokens.len() as f64 {
                return true;
            }
        }

        self.spaced_letters.is_match(line)
    }

    /// Drops fragment lines, keeping blank lines and table placeholders. Returns the removal count.
    pub(crate) fn filter(&self, lines: Vec<String>) -> (Vec<String>, usize) {
        let before = lines.len();
        let kept = lines
            .into_iter()
            .filter(|line| TableStash::is_placeholder(line) || !self.is_fragment(line))
            .collect::<Vec<String>>();
        let removed = before - kept.len();
        (kept, removed)
    }
}
