use super::*;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug)]
pub(crate) struct TitleDeriver {
    prefixes: Vec<Regex>,
    config: TitleConfig,
}

impl TitleDeriver {
    pub(crate) fn new(config: &TitleConfig) -> Result<Self> {
        let prefixes = config
            .prefix_patterns
            .iter()
            .map(|pattern| compile_pattern(pattern, false))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            prefixes,
            config: config.clone(),
        })
    }

    /// Readable title from a source file name: numbering prefixes stripped, words capitalized.
    pub(crate) fn derive(&self, file_name: &str) -> String {
        let stem = Path::new(file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());

        let mut stripped = stem;
        for prefix in &self.prefixes {
            stripped = prefix.replace(&stripped, "").into_owned();
        }
        let stripped = stripped
            .trim_matches(['_', '-', ' ', '–', '—'])
            .to_string();

        let normalized = if self.config.normalize_capitalization {
            self.capitalize_words(&stripped)
        } else {
            stripped.clone()
        };

        [normalized, stripped]
            .into_iter()
            .map(|candidate| self.clean(&candidate))
            .find(|candidate| candidate.chars().count() >= self.config.min_len)
            .unwrap_or_else(|| self.config.fallback.clone())
    }

    fn capitalize_words(&self, text: &str) -> String {
        let spaced = text.replace(['_', '-'], " ");
        let words = spaced.split_whitespace().collect::<Vec<&str>>();

        // a file name written entirely in capitals has no acronyms to preserve
        let shouting = spaced
            .chars()
            .filter(|character| character.is_alphabetic())
            .all(char::is_uppercase);

        words
            .iter()
            .enumerate()
            .map(|(index, word)| {
                let lower = word.to_lowercase();
                if index == 0 {
                    capitalize(word)
                } else if !shouting && word.chars().count() > 1 && is_all_caps(word) {
                    word.to_string()
                } else if self.config.connectors.iter().any(|connector| *connector == lower) {
                    lower
                } else {
                    capitalize(word)
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }

    fn clean(&self, title: &str) -> String {
        let visible = title
            .chars()
            .filter(|character| !character.is_control())
            .collect::<String>();
        let collapsed = WHITESPACE_RUN.replace_all(&visible, " ");
        let trimmed = collapsed.trim().trim_end_matches('.').trim_end();
        trimmed.chars().take(self.config.max_len).collect::<String>().trim_end().to_string()
    }
}

fn is_all_caps(word: &str) -> bool {
    word.chars().any(char::is_alphabetic)
        && word
            .chars()
            .filter(|character| character.is_alphabetic())
            .all(char::is_uppercase)
}

fn capitalize(word: &str) -> String {
    let mut characters = word.chars();
    match characters.next() {
        Some(first) => first
            .to_uppercase()
            .chain(characters.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
