//! Line-joining state machine that turns a filtered line stream into paragraphs.

use super::*;

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").expect("valid space regex"));
static SPACE_BEFORE_CLOSING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" +([.,;:?!)\]}>])").expect("valid closing punctuation regex"));
static SPACE_AFTER_OPENING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\[({<]) +").expect("valid opening bracket regex"));
static EXTRA_BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));

#[derive(Debug)]
pub(crate) struct ParagraphJoiner {
    structural: Vec<Regex>,
    uppercase_ratio: f64,
    uppercase_min_len: usize,
    flush_uppercase_blocks: bool,
    short_line_max_words: Option<usize>,
    terminal_punctuation: Vec<char>,
}

#[derive(Debug, Default)]
struct Blocks {
    finished: Vec<String>,
    current: Vec<String>,
}

impl Blocks {
    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.finished.push(self.current.join(" "));
            self.current.clear();
        }
    }
}

impl ParagraphJoiner {
    pub(crate) fn new(config: &JoinConfig) -> Result<Self> {
        let structural = config
            .structural_patterns
            .iter()
            .map(|pattern| compile_pattern(pattern, false))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            structural,
            uppercase_ratio: config.uppercase_ratio,
            uppercase_min_len: config.uppercase_min_len,
            flush_uppercase_blocks: config.flush_uppercase_blocks,
            short_line_max_words: config.short_line_max_words,
            terminal_punctuation: config.terminal_punctuation.chars().collect(),
        })
    }

    pub(crate) fn is_structural(&self, line: &str) -> bool {
        let line = line.trim_start();
        self.structural.iter().any(|pattern| pattern.is_match(line))
    }

    pub(crate) fn is_uppercase_heading(&self, line: &str) -> bool {
        if line.chars().count() < self.uppercase_min_len {
            return false;
        }
        let letters = line
            .chars()
            .filter(|character| character.is_alphabetic())
            .collect::<Vec<char>>();
        if letters.is_empty() {
            return false;
        }
        let upper = letters
            .iter()
            .filter(|character| character.is_uppercase())
            .count();
        upper as f64 / letters.len() as f64 >= self.uppercase_ratio
    }

    fn ends_terminal(&self, line: &str) -> bool {
        line.chars()
            .last()
            .map(|last| self.terminal_punctuation.contains(&last))
            .unwrap_or(false)
    }

    /// Joins lines into paragraphs. Returns the text and the number of hyphenation repairs.
    pub(crate) fn join(&self, lines: &[String]) -> (String, usize) {
        let lines = lines.iter().map(|line| line.trim()).collect::<Vec<&str>>();
        let mut blocks = Blocks::default();
        let mut hyphen_joins = 0;
        let mut index = 0;

        while index < lines.len() {
            let raw = lines[index];
            index += 1;

            if raw.is_empty() {
                blocks.flush();
                blocks.finished.push(String::new());
                continue;
            }

            if TableStash::is_placeholder(raw) {
                blocks.flush();
                blocks.finished.push(raw.to_string());
                continue;
            }

            let mut line = raw.to_string();
            while index < lines.len() && is_word_break(&line) {
                let next = lines[index];
                if next.is_empty() || self.is_structural(next) || TableStash::is_placeholder(next) {
                    break;
                }
                if !next.chars().next().is_some_and(char::is_alphabetic) {
                    break;
                }
                line.pop();
                line.push_str(next);
                hyphen_joins += 1;
                index += 1;
            }

            if !blocks.current.is_empty() {
                if self.is_structural(&line) {
                    blocks.flush();
                } else if self.flush_uppercase_blocks
                    && self.is_uppercase_heading(&blocks.current.join(" "))
                    && !self.is_uppercase_heading(&line)
                {
                    blocks.flush();
                }
            }

            let next = lines[index..].iter().copied().find(|next| !next.is_empty());
            let flush = self.should_flush(&line, next);
            blocks.current.push(line);
            if flush {
                blocks.flush();
            }
        }
        blocks.flush();

        (post_process(&blocks.finished.join("\n")), hyphen_joins)
    }

    fn should_flush(&self, line: &str, next: Option<&str>) -> bool {
        let Some(next) = next else {
            return true;
        };
        if TableStash::is_placeholder(next) {
            return true;
        }

        let terminal = self.ends_terminal(line);
        let next_first = next.chars().next();
        let next_structural = self.is_structural(next);

        if terminal && (next_first.is_some_and(char::is_uppercase) || next_structural) {
            return true;
        }
        if self.is_uppercase_heading(next) || next_structural {
            return true;
        }

        let comma = line.ends_with(',');
        let continuation =
            next_first.is_some_and(|first| first.is_lowercase() || first.is_ascii_digit());
        if !terminal && !comma && !continuation {
            return true;
        }

        if let Some(max_words) = self.short_line_max_words {
            if !comma && line.split_whitespace().count() <= max_words {
                return true;
            }
        }

        false
    }
}

/// A trailing hyphen directly after a letter marks a word split across lines.
fn is_word_break(line: &str) -> bool {
    let mut tail = line.chars().rev();
    tail.next() == Some('-') && tail.next().is_some_and(char::is_alphabetic)
}

fn post_process(text: &str) -> String {
    let text = MULTI_SPACE.replace_all(text, " ");
    let text = SPACE_BEFORE_CLOSING.replace_all(&text, "$1");
    let text = SPACE_AFTER_OPENING.replace_all(&text, "$1");
    let text = EXTRA_BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joiner() -> ParagraphJoiner {
        ParagraphJoiner::new(&JoinConfig::default()).expect("default patterns compile")
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|line| line.to_string()).collect()
    }

    #[test]
    fn hyphenated_words_are_repaired_without_spaces() {
        let (text, joins) = joiner().join(&lines(&["La inte-", "gración del consejo será paritaria."]));
        assert_eq!(text, "La integración del consejo será paritaria.");
        assert_eq!(joins, 1);
    }

    #[test]
    fn article_dash_suffix_is_not_a_word_break() {
        let (text, joins) = joiner().join(&lines(&[
            "Artículo 12.-",
            "Para los efectos de este reglamento se entiende por:",
        ]));
        assert_eq!(joins, 0);
        assert_eq!(
            text,
            "Artículo 12.-\nPara los efectos de este reglamento se entiende por:"
        );
    }

    #[test]
    fn continuation_lines_join_until_the_next_article() {
        let (text, _) = joiner().join(&lines(&[
            "Artículo 1. El presente ordenamiento",
            "es de orden público y de observancia",
            "general en el Estado.",
            "Artículo 2. Corresponde su aplicación al Ejecutivo.",
        ]));
        assert_eq!(
            text,
            "Artículo 1. El presente ordenamiento es de orden público y de observancia general en el Estado.\n\
             Artículo 2. Corresponde su aplicación al Ejecutivo."
        );
    }

    #[test]
    fn headings_and_list_items_stay_on_their_own_lines() {
        let (text, _) = joiner().join(&lines(&[
            "CAPÍTULO PRIMERO",
            "DISPOSICIONES GENERALES",
            "Artículo 3. Son autoridades:",
            "I. El Gobernador;",
            "II. El Secretario, y",
            "III. Los municipios.",
        ]));
        assert_eq!(
            text.lines().collect::<Vec<&str>>(),
            vec![
                "CAPÍTULO PRIMERO",
                "DISPOSICIONES GENERALES",
                "Artículo 3. Son autoridades:",
                "I. El Gobernador;",
                "II. El Secretario, y",
                "III. Los municipios.",
            ]
        );
    }

    #[test]
    fn blank_lines_separate_paragraphs_and_collapse() {
        let (text, _) = joiner().join(&lines(&[
            "Primer párrafo que",
            "continúa aquí.",
            "",
            "",
            "",
            "Segundo párrafo.",
        ]));
        assert_eq!(text, "Primer párrafo que continúa aquí.\n\nSegundo párrafo.");
    }

    #[test]
    fn spacing_around_punctuation_is_normalized() {
        let (text, _) = joiner().join(&lines(&["Las cuotas  ( en pesos ) se pagarán ."]));
        assert_eq!(text, "Las cuotas (en pesos) se pagarán.");
    }

    #[test]
    fn placeholders_are_standalone_blocks() {
        let (text, _) = joiner().join(&lines(&[
            "Las tarifas aplicables son las",
            "TABLA_PLACEHOLDER0_",
            "siguientes cuotas.",
        ]));
        assert_eq!(
            text,
            "Las tarifas aplicables son las\nTABLA_PLACEHOLDER0_\nsiguientes cuotas."
        );
    }

    #[test]
    fn optional_rules_close_blocks_eagerly() {
        let short_lines = ParagraphJoiner::new(&JoinConfig {
            short_line_max_words: Some(3),
            ..JoinConfig::default()
        })
        .expect("patterns compile");
        let (text, _) = short_lines.join(&lines(&[
            "agua potable;",
            "drenaje sanitario y servicios de",
            "alcantarillado.",
        ]));
        assert_eq!(text, "agua potable;\ndrenaje sanitario y servicios de alcantarillado.");

        let caps = ParagraphJoiner::new(&JoinConfig {
            flush_uppercase_blocks: true,
            ..JoinConfig::default()
        })
        .expect("patterns compile");
        let input = lines(&["TRANSITORIOS", "la presente ley entra en vigor al día siguiente."]);
        assert_eq!(
            caps.join(&input).0,
            "TRANSITORIOS\nla presente ley entra en vigor al día siguiente."
        );
        assert_eq!(
            joiner().join(&input).0,
            "TRANSITORIOS la presente ley entra en vigor al día siguiente."
        );
    }
}
