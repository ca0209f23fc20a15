use super::*;

/// Dates and validity markers read from the head of the raw document text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DocumentDates {
    pub fecha_publicacion: Option<String>,
    pub ultima_reforma: Option<String>,
    pub texto_vigente: bool,
}

#[derive(Debug)]
pub(crate) struct MetadataExtractor {
    publication: Vec<Regex>,
    reform: Vec<Regex>,
    vigente: Vec<Regex>,
    config: MetadataConfig,
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| compile_pattern(pattern, true))
        .collect()
}

/// The first `limit` characters of `text`, cut on a char boundary.
fn head(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|found| found.as_str().split_whitespace().collect::<Vec<&str>>().join(" "))
    })
}

impl MetadataExtractor {
    pub(crate) fn new(config: &MetadataConfig) -> Result<Self> {
        Ok(Self {
            publication: compile_all(&config.publication_patterns)?,
            reform: compile_all(&config.reform_patterns)?,
            vigente: compile_all(&config.vigente_patterns)?,
            config: config.clone(),
        })
    }

    pub(crate) fn dates(&self, raw_text: &str) -> DocumentDates {
        let vigente_head = head(raw_text, self.config.vigente_window);
        DocumentDates {
            fecha_publicacion: first_capture(
                &self.publication,
                head(raw_text, self.config.publication_window),
            ),
            ultima_reforma: first_capture(&self.reform, head(raw_text, self.config.reform_window)),
            texto_vigente: self.vigente.iter().any(|pattern| pattern.is_match(vigente_head)),
        }
    }

    pub(crate) fn record_metadata(
        &self,
        raw_text: &str,
        is_scanned: bool,
        has_tables: bool,
        page_count: usize,
    ) -> RecordMetadata {
        let dates = self.dates(raw_text);
        RecordMetadata {
            ordenamiento: self.config.ordenamiento.clone(),
            jurisdiccion: self.config.jurisdiccion.clone(),
            fuente_oficial: self.config.fuente_oficial.clone(),
            es_escaneado: is_scanned,
            tiene_tablas: has_tables,
            numero_paginas: page_count,
            fecha_publicacion: dates.fecha_publicacion,
            ultima_reforma: dates.ultima_reforma,
            texto_vigente: dates.texto_vigente,
        }
    }
}
