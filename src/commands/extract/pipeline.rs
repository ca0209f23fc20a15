//! Per-document reconstruction: raw pages in, final `contenido` text out.

use super::*;

static HORIZONTAL_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+").expect("valid horizontal space regex"));

/// Compiles one catalog pattern; the error names the pattern that failed.
pub(crate) fn compile_pattern(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .with_context(|| format!("invalid pattern {pattern:?}"))
}

/// Counters reported per document in the run manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DocumentStats {
    pub tables_accepted: usize,
    pub tables_rejected: usize,
    pub tables_unlocated: usize,
    pub edge_lines_removed: usize,
    pub fragment_lines_removed: usize,
    pub hyphen_joins: usize,
}

/// Every stage compiled once for the whole run.
#[derive(Debug)]
pub(crate) struct Pipeline {
    config: PipelineConfig,
    scan: ScanThresholds,
    fragments: FragmentFilter,
    joiner: ParagraphJoiner,
    edges: EdgeCleaner,
    titles: TitleDeriver,
    metadata: MetadataExtractor,
}

impl Pipeline {
    pub(crate) fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            scan: config.scan.thresholds(),
            fragments: FragmentFilter::new(&config.fragments).context("fragment catalog")?,
            joiner: ParagraphJoiner::new(&config.joining).context("joining catalog")?,
            edges: EdgeCleaner::new(&config.edges).context("edge catalog")?,
            titles: TitleDeriver::new(&config.title).context("title catalog")?,
            metadata: MetadataExtractor::new(&config.metadata).context("metadata catalog")?,
        })
    }

    pub(crate) fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub(crate) fn title(&self, file_name: &str) -> String {
        self.titles.derive(file_name)
    }

    pub(crate) fn metadata(&self) -> &MetadataExtractor {
        &self.metadata
    }

    /// Reads a PDF through the digital sources, switching to OCR when the mode asks for it,
    /// the text layer looks scanned, or every text strategy fails.
    pub(crate) fn extract_pdf(
        &self,
        path: &Path,
        sources: &PdfSources,
        ocr: &mut OcrSession,
        mode: OcrMode,
        max_pages: Option<usize>,
    ) -> Result<RawDocument> {
        if mode == OcrMode::Force {
            return ocr_document(path, ocr, max_pages, Vec::new())
                .with_context(|| format!("ocr failed for {}", path.display()));
        }

        let mut warnings = Vec::new();
        let selection = match select_text(
            &sources.text,
            path,
            max_pages,
            self.config.extraction.min_accept_chars,
        ) {
            Ok(selection) => selection,
            Err(err) if mode == OcrMode::Off => {
                return Err(err)
                    .with_context(|| format!("no text strategy could read {}", path.display()));
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "digital text extraction failed; falling back to ocr");
                warnings.push(format!("digital text extraction failed: {err}"));
                return ocr_document(path, ocr, max_pages, warnings)
                    .with_context(|| format!("neither text layer nor ocr could read {}", path.display()));
            }
        };
        debug!(path = %path.display(), strategy = selection.strategy, pages = selection.pages.len(), "text layer selected");

        let layout = match &sources.layout {
            Some(source) => source
                .layout(path, max_pages)
                .map_err(|err| {
                    warn!(path = %path.display(), error = %err, "layout unavailable");
                    warnings.push(format!("layout unavailable: {err}"));
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };
        let geometry = match &sources.geometry {
            Some(source) => source
                .geometry(path, max_pages)
                .map_err(|err| {
                    warn!(path = %path.display(), error = %err, "rule geometry unavailable");
                    warnings.push(format!("rule geometry unavailable: {err}"));
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let samples = selection
            .pages
            .iter()
            .take(self.scan.sample_pages)
            .enumerate()
            .map(|(index, text)| {
                PageSample::from_page(
                    text,
                    layout.get(index),
                    geometry.get(index),
                    self.scan.text_block_chars,
                )
            })
            .collect::<Vec<PageSample>>();
        let scanned = scanned_reason(&samples, &self.scan);

        if let Some(reason) = scanned {
            info!(path = %path.display(), reason, "document looks scanned");
            if mode == OcrMode::Auto {
                match ocr_document(path, ocr, max_pages, warnings.clone()) {
                    Ok(document) => return Ok(document),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "ocr failed; keeping the text layer");
                        warnings.push(format!("ocr failed: {err}"));
                    }
                }
            }
        }

        let detect_tables = self.config.extraction.detect_tables;
        let pages = selection
            .pages
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let page_layout = layout.get(index);
                let page_geometry = geometry.get(index);
                let tables = match (detect_tables, page_geometry, page_layout) {
                    (true, Some(geometry), Some(layout)) => {
                        find_lattice_tables(&geometry.edges, &layout.words, &self.config.tables.lattice)
                    }
                    _ => Vec::new(),
                };
                RawPage {
                    number: index + 1,
                    text,
                    tables,
                    edges: page_geometry.map(|geometry| geometry.edges.clone()).unwrap_or_default(),
                    margin_text: page_layout
                        .map(|layout| {
                            collect_margin_text(
                                layout,
                                self.config.edges.margin_ratio,
                                self.config.edges.margin_min_len,
                            )
                        })
                        .unwrap_or_default(),
                }
            })
            .collect::<Vec<RawPage>>();

        Ok(RawDocument {
            pages,
            is_scanned: scanned.is_some(),
            backend: selection.strategy.to_string(),
            ocr_page_count: 0,
            warnings,
        })
    }

    /// Table validation, reassembly, edge cleanup, fragment filtering and paragraph joining.
    pub(crate) fn reconstruct(&self, document: &RawDocument) -> (String, DocumentStats) {
        let mut stats = DocumentStats::default();
        let mut stash = TableStash::default();

        let mut pages = Vec::with_capacity(document.pages.len());
        for page in &document.pages {
            let mut placed = Vec::new();
            let mut appended = Vec::new();
            for candidate in &page.tables {
                if let Err(rejection) = validate_table(candidate, &page.edges, &self.config.tables) {
                    debug!(page = page.number, reason = rejection.as_str(), "table candidate rejected");
                    stats.tables_rejected += 1;
                    continue;
                }
                match serialize_table(&candidate.rows, stash.len() + 1, &self.config.tables) {
                    Some(json) => {
                        let token = stash.park(json);
                        // OCR cells come from the same words as the page prose, which stays
                        if candidate.origin == CandidateOrigin::Ocr {
                            appended.push(token);
                        } else {
                            placed.push(PlacedTable::new(&candidate.rows, token));
                        }
                        stats.tables_accepted += 1;
                    }
                    None => {
                        debug!(page = page.number, "table candidate has no data rows");
                        stats.tables_rejected += 1;
                    }
                }
            }

            let lines = page.text.lines().map(str::to_string).collect::<Vec<String>>();
            let reassembled = reassemble_page(&lines, &placed, &self.config.reassembly);
            if reassembled.unlocated > 0 {
                debug!(page = page.number, tables = reassembled.unlocated, "tables appended at page end");
            }
            stats.tables_unlocated += reassembled.unlocated;
            let mut page_lines = reassembled.lines;
            page_lines.extend(appended);
            pages.push(page_lines);
        }

        let edges = self.edges.detect(&pages);
        if !edges.is_empty() {
            debug!(headers = ?edges.headers, footers = ?edges.footers, "repeated page edges");
        }
        let margins = merge_margin_text(document.pages.iter().map(|page| page.margin_text.as_slice()));

        let mut lines = Vec::new();
        for page in pages {
            let (kept, removed) = self.edges.clean_page(page, &edges, &margins);
            stats.edge_lines_removed += removed;
            lines.extend(kept);
        }

        let text = self.finish(lines, &stash, &mut stats);
        (text, stats)
    }

    /// Word bodies arrive as real paragraphs and grids; tables skip validation.
    pub(crate) fn reconstruct_word(&self, blocks: &[WordBlock]) -> (String, DocumentStats) {
        let mut stats = DocumentStats::default();
        let mut stash = TableStash::default();

        let mut lines = Vec::new();
        for block in blocks {
            match block {
                WordBlock::Paragraph(text) => lines.extend(
                    text.lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_string),
                ),
                WordBlock::Table(rows) => {
                    match serialize_table(rows, stash.len() + 1, &self.config.tables) {
                        Some(json) => {
                            lines.push(stash.park(json));
                            stats.tables_accepted += 1;
                        }
                        None => stats.tables_rejected += 1,
                    }
                }
            }
        }

        let text = self.finish(lines, &stash, &mut stats);
        (text, stats)
    }

    /// Plain text from `antiword`; no tables survive that conversion.
    pub(crate) fn reconstruct_plain(&self, text: &str) -> (String, DocumentStats) {
        let mut stats = DocumentStats::default();
        let lines = text.lines().map(str::to_string).collect::<Vec<String>>();
        let text = self.finish(lines, &TableStash::default(), &mut stats);
        (text, stats)
    }

    fn finish(&self, lines: Vec<String>, stash: &TableStash, stats: &mut DocumentStats) -> String {
        let (lines, removed) = self.fragments.filter(lines);
        stats.fragment_lines_removed += removed;

        let (joined, hyphen_joins) = self.joiner.join(&lines);
        stats.hyphen_joins += hyphen_joins;

        let collapsed = HORIZONTAL_SPACE.replace_all(&joined, " ");
        let cleaned = collapsed
            .lines()
            .map(str::trim_end)
            .collect::<Vec<&str>>()
            .join("\n");
        stash.restore(cleaned.trim())
    }
}

fn ocr_document(
    path: &Path,
    ocr: &mut OcrSession,
    max_pages: Option<usize>,
    warnings: Vec<String>,
) -> ExtractResult<RawDocument> {
    let pages = ocr.recognize_document(path, max_pages)?;
    let ocr_page_count = pages.iter().filter(|page| !page.text.trim().is_empty()).count();
    info!(path = %path.display(), pages = pages.len(), recognized = ocr_page_count, "ocr finished");

    Ok(RawDocument {
        pages,
        is_scanned: true,
        backend: "ocr".to_string(),
        ocr_page_count,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_catalog_pattern_is_named() {
        let mut config = PipelineConfig::default();
        config.fragments.ribbon_patterns.push("(sin cerrar".to_string());

        let err = Pipeline::new(&config).expect_err("unbalanced group");
        let rendered = format!("{err:#}");
        assert!(rendered.contains("(sin cerrar"), "{rendered}");
        assert!(rendered.contains("fragment catalog"), "{rendered}");
    }

    #[test]
    fn word_tables_are_numbered_in_document_order() {
        let pipeline = Pipeline::new(&PipelineConfig::default()).expect("default pipeline");
        let grid = |label: &str| {
            vec![
                vec![Some("Concepto".to_string()), Some("Importe".to_string())],
                vec![Some(label.to_string()), Some("120.00".to_string())],
            ]
        };
        let blocks = vec![
            WordBlock::Paragraph("Artículo 3. Las cuotas aplicables por servicio son:".to_string()),
            WordBlock::Table(grid("Conexión")),
            WordBlock::Paragraph(String::new()),
            WordBlock::Paragraph("Artículo 4. Los derechos se pagan por bimestre:".to_string()),
            WordBlock::Table(grid("Reconexión")),
        ];

        let (text, stats) = pipeline.reconstruct_word(&blocks);
        assert_eq!(stats.tables_accepted, 2);
        let first = text.find(r#"{"tabla_1":"#).expect("first table");
        let second = text.find(r#"{"tabla_2":"#).expect("second table");
        assert!(first < second);
        assert!(text[first..second].contains("Conexión"));
        assert!(text.starts_with("Artículo 3."));
    }

    fn ocr_cells(raw: &[&[&str]]) -> Vec<Vec<Option<String>>> {
        raw.iter()
            .map(|row| row.iter().map(|cell| Some(cell.to_string())).collect())
            .collect()
    }

    #[test]
    fn ocr_tables_keep_the_recognized_prose() {
        let pipeline = Pipeline::new(&PipelineConfig::default()).expect("default pipeline");
        let text = [
            "Artículo 1. Las disposiciones de esta Ley son de orden público",
            "y de observancia general en todo el territorio del Estado.",
            "Artículo 2. Corresponde al Ejecutivo la aplicación de esta Ley.",
            "Zona Tarifa Monto",
            "Centro Doméstica 150.00",
            "Periferia Comercial 95.00",
        ]
        .join("\n");
        let mut prose_rows = ocr_cells(&[
            &["Artículo", "1.", "Las", "disposiciones", "de", "esta", "Ley"],
            &["y", "de", "observancia", "general", "en", "todo", "el"],
        ]);
        let mut last = vec![None; 7];
        last[0] = Some("Artículo".to_string());
        last[1] = Some("2.".to_string());
        prose_rows.push(last);
        let document = RawDocument {
            pages: vec![RawPage {
                number: 1,
                text,
                tables: vec![
                    TableCandidate {
                        bbox: None,
                        rows: prose_rows,
                        origin: CandidateOrigin::Ocr,
                    },
                    TableCandidate {
                        bbox: None,
                        rows: ocr_cells(&[
                            &["Zona", "Tarifa", "Monto"],
                            &["Centro", "Doméstica", "150.00"],
                            &["Periferia", "Comercial", "95.00"],
                        ]),
                        origin: CandidateOrigin::Ocr,
                    },
                ],
                ..RawPage::default()
            }],
            is_scanned: true,
            backend: "ocr".to_string(),
            ..RawDocument::default()
        };

        let (text, stats) = pipeline.reconstruct(&document);
        assert!(stats.tables_accepted >= 1);
        assert_eq!(stats.tables_unlocated, 0);
        assert!(text.contains("Artículo 1. Las disposiciones de esta Ley"), "{text}");
        assert!(text.contains("observancia general en todo el territorio"), "{text}");
        let second = text.find("Artículo 2. Corresponde al Ejecutivo").expect("second article kept");
        let table = text.find(r#"{"tabla_"#).expect("table appended");
        assert!(second < table, "{text}");
        assert!(text.contains("Doméstica"));
    }
}
