//! Title lookup against an external reference dataset of `{titulo, contenido}` pairs.

use super::*;

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9\s]").expect("valid alphanumeric regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const TITLE_KEYS: [&str; 3] = ["TITULO", "titulo", "Titulo"];
const CONTENT_KEYS: [&str; 3] = ["contenido", "Contenido", "CONTENIDO"];

/// Accent-free, lowercase, alphanumeric-only form used for comparisons.
pub(crate) fn normalize_for_match(text: &str) -> String {
    let stripped = text
        .nfkd()
        .filter(|character| !is_combining_mark(*character))
        .collect::<String>()
        .to_lowercase();
    let spaced = NON_ALPHANUMERIC.replace_all(&stripped, " ");
    WHITESPACE_RUN.replace_all(&spaced, " ").trim().to_string()
}

#[derive(Debug, Clone)]
pub(crate) struct ReferenceEntry {
    pub title: String,
    normalized: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum MatchKind {
    Exact,
    Similar(f64),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ReferenceMatch<'a> {
    pub entry: &'a ReferenceEntry,
    pub kind: MatchKind,
}

pub(crate) trait MatchStrategy {
    fn name(&self) -> &'static str;
    fn find<'a>(&self, query: &str, entries: &'a [ReferenceEntry]) -> Option<ReferenceMatch<'a>>;
}

#[derive(Debug)]
struct ExactMatch;

impl MatchStrategy for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn find<'a>(&self, query: &str, entries: &'a [ReferenceEntry]) -> Option<ReferenceMatch<'a>> {
        entries
            .iter()
            .find(|entry| entry.normalized == query)
            .map(|entry| ReferenceMatch {
                entry,
                kind: MatchKind::Exact,
            })
    }
}

/// Length gate, then similarity ratio, then the version-word veto.
#[derive(Debug)]
struct SimilarityMatch {
    max_length_diff: f64,
    min_similarity: f64,
    version_words: HashSet<String>,
}

impl SimilarityMatch {
    fn has_version_word(&self, normalized: &str) -> bool {
        normalized
            .split_whitespace()
            .any(|word| self.version_words.contains(word))
    }
}

impl MatchStrategy for SimilarityMatch {
    fn name(&self) -> &'static str {
        "similarity"
    }

    fn find<'a>(&self, query: &str, entries: &'a [ReferenceEntry]) -> Option<ReferenceMatch<'a>> {
        let query_len = query.chars().count();
        let query_versioned = self.has_version_word(query);
        let mut best: Option<ReferenceMatch<'a>> = None;
        let mut best_score = 0.0;

        for entry in entries {
            let entry_len = entry.normalized.chars().count();
            let longest = query_len.max(entry_len);
            if longest == 0 {
                continue;
            }
            let length_diff = query_len.abs_diff(entry_len) as f64 / longest as f64;
            if length_diff > self.max_length_diff {
                continue;
            }

            let score = rapidfuzz::fuzz::ratio(query.chars(), entry.normalized.chars());
            if score <= self.min_similarity || score <= best_score {
                continue;
            }
            if query_versioned != self.has_version_word(&entry.normalized) {
                continue;
            }

            best_score = score;
            best = Some(ReferenceMatch {
                entry,
                kind: MatchKind::Similar(score),
            });
        }

        best
    }
}

pub(crate) struct ReferenceIndex {
    entries: Vec<ReferenceEntry>,
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl std::fmt::Debug for ReferenceIndex {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ReferenceIndex")
            .field("entries", &self.entries.len())
            .field(
                "strategies",
                &self.strategies.iter().map(|strategy| strategy.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ReferenceIndex {
    pub(crate) fn load(path: &Path, config: &MatchingConfig) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read reference dataset {}", path.display()))?;
        let value = serde_json::from_str::<Value>(&raw)
            .with_context(|| format!("failed to parse reference dataset {}", path.display()))?;
        let index = Self::from_value(&value, config)
            .with_context(|| format!("invalid reference dataset {}", path.display()))?;
        info!(
            path = %path.display(),
            entries = index.len(),
            "loaded reference dataset"
        );
        Ok(index)
    }

    pub(crate) fn from_value(value: &Value, config: &MatchingConfig) -> Result<Self> {
        let Some(items) = value.as_array() else {
            bail!("expected a JSON array of title/content objects");
        };

        let entries = items
            .iter()
            .filter_map(|item| {
                let title = first_string(item, &TITLE_KEYS)?;
                let content = first_string(item, &CONTENT_KEYS)?;
                Some(ReferenceEntry {
                    normalized: normalize_for_match(title),
                    title: title.to_string(),
                    content: content.to_string(),
                })
            })
            .filter(|entry| !entry.normalized.is_empty())
            .collect::<Vec<_>>();

        Ok(Self {
            entries,
            strategies: vec![
                Box::new(ExactMatch),
                Box::new(SimilarityMatch {
                    max_length_diff: config.max_length_diff,
                    min_similarity: config.min_similarity,
                    version_words: config.version_words.iter().cloned().collect(),
                }),
            ],
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn find(&self, title: &str) -> Option<ReferenceMatch<'_>> {
        let query = normalize_for_match(title);
        if query.is_empty() {
            return None;
        }

        for strategy in &self.strategies {
            if let Some(found) = strategy.find(&query, &self.entries) {
                debug!(
                    strategy = strategy.name(),
                    kind = ?found.kind,
                    title,
                    reference = %found.entry.title,
                    "reference content matched"
                );
                return Some(found);
            }
        }
        None
    }
}

fn first_string<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .find(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn index() -> ReferenceIndex {
        ReferenceIndex::from_value(
            &json!([
                { "TITULO": "LEY DE AGUAS DEL ESTADO", "contenido": "aguas" },
                { "titulo": "Reglamento Interior de la Secretaría de Finanza", "Contenido": "finanzas" },
                { "Titulo": "Ley de Salud del Estado de Campeche y sus Municipios", "CONTENIDO": "salud" },
                { "TITULO": "Reglamento de Construcciones Partes", "contenido": "construcciones" },
                { "TITULO": "Sin contenido" },
            ]),
            &MatchingConfig::default(),
        )
        .expect("array parses")
    }

    #[test]
    fn normalization_strips_accents_and_punctuation() {
        assert_eq!(
            normalize_for_match("  Ley de Tránsito, del Estado (México)  "),
            "ley de transito del estado mexico"
        );
        assert_eq!(normalize_for_match("Año"), "ano");
    }

    #[test]
    fn exact_normalized_title_wins() {
        let index = index();
        assert_eq!(index.len(), 4);
        let found = index.find("Ley de Aguas del Estado").expect("exact match");
        assert_eq!(found.kind, MatchKind::Exact);
        assert_eq!(found.entry.content, "aguas");
    }

    #[test]
    fn near_identical_titles_match_by_similarity() {
        let index = index();
        let found = index
            .find("Reglamento Interior de la Secretaria de Finanzas")
            .expect("similar match");
        assert!(matches!(found.kind, MatchKind::Similar(score) if score > 0.92));
        assert_eq!(found.entry.content, "finanzas");
    }

    #[test]
    fn large_length_differences_are_rejected() {
        assert!(index().find("Ley de Salud").is_none());
    }

    #[test]
    fn version_words_on_one_side_veto_the_match() {
        assert!(index().find("Reglamento de Construcciones Parte II").is_none());
    }

    #[test]
    fn non_array_datasets_are_errors() {
        assert!(ReferenceIndex::from_value(&json!({"titulo": "x"}), &MatchingConfig::default()).is_err());
    }
}
