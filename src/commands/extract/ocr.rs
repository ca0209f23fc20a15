//! OCR collaborator: page rasterization with `pdftoppm`, recognition with
//! `tesseract`, and naive table candidates from token coordinates.

use super::*;

use std::collections::BTreeMap;

use tempfile::TempDir;

#[derive(Debug, Clone)]
pub(crate) struct OcrSettings {
    pub lang: String,
    pub dpi: u32,
    pub max_pages: usize,
    pub min_row_tokens: usize,
    pub min_table_rows: usize,
    pub column_tolerance: f64,
}

impl OcrSettings {
    pub(crate) fn from_config(config: &OcrConfig, lang_override: Option<&str>) -> Self {
        Self {
            lang: lang_override
                .map(str::to_string)
                .or_else(|| config.lang.clone())
                .unwrap_or_else(|| "spa+eng".to_string()),
            dpi: config.dpi,
            max_pages: config.max_pages,
            min_row_tokens: config.min_row_tokens,
            min_table_rows: config.min_table_rows,
            column_tolerance: config.column_tolerance,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct OcrPage {
    pub text: String,
    pub tables: Vec<TableCandidate>,
}

pub(crate) trait OcrEngine {
    fn name(&self) -> &'static str;
    fn page_count(&self, path: &Path) -> ExtractResult<usize>;
    fn recognize_page(&self, path: &Path, page: usize) -> ExtractResult<OcrPage>;
    /// Releases scratch resources; the engine is not used afterwards.
    fn shutdown(&mut self) {}
}

type EngineFactory = Box<dyn Fn(&OcrSettings) -> ExtractResult<Box<dyn OcrEngine>>>;

/// Lazily started OCR engine shared by the whole batch.
pub(crate) struct OcrSession {
    settings: OcrSettings,
    factory: EngineFactory,
    engine: Option<Box<dyn OcrEngine>>,
    pages_recognized: usize,
}

impl OcrSession {
    pub(crate) fn new(settings: OcrSettings) -> Self {
        Self::with_factory(
            settings,
            Box::new(|settings: &OcrSettings| {
                TesseractEngine::start(settings).map(|engine| Box::new(engine) as Box<dyn OcrEngine>)
            }),
        )
    }

    pub(crate) fn with_factory(settings: OcrSettings, factory: EngineFactory) -> Self {
        Self {
            settings,
            factory,
            engine: None,
            pages_recognized: 0,
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.engine.is_some()
    }

    pub(crate) fn pages_recognized(&self) -> usize {
        self.pages_recognized
    }

    fn engine(&mut self) -> ExtractResult<&mut Box<dyn OcrEngine>> {
        if self.engine.is_none() {
            let engine = (self.factory)(&self.settings)?;
            info!(engine = engine.name(), lang = %self.settings.lang, "ocr engine started");
            self.engine = Some(engine);
        }
        self.engine.as_mut().ok_or(ExtractError::ToolUnavailable { tool: "ocr" })
    }

    /// Recognizes up to the configured page limit. A page that fails becomes an
    /// empty page; the document fails only when no page could be read.
    pub(crate) fn recognize_document(
        &mut self,
        path: &Path,
        max_pages: Option<usize>,
    ) -> ExtractResult<Vec<RawPage>> {
        let settings = self.settings.clone();
        let engine = self.engine()?;

        let total = engine.page_count(path)?;
        let limit = max_pages
            .map(|max| max.min(settings.max_pages))
            .unwrap_or(settings.max_pages);
        let count = total.min(limit);
        if count < total {
            warn!(path = %path.display(), total, count, "ocr page limit reached");
        }

        let mut pages = Vec::with_capacity(count);
        let mut last_error = None;
        let mut recognized = 0;
        for number in 1..=count {
            match engine.recognize_page(path, number) {
                Ok(page) => {
                    debug!(page = number, tables = page.tables.len(), "ocr page recognized");
                    recognized += 1;
                    pages.push(RawPage {
                        number,
                        text: page.text,
                        tables: page.tables,
                        ..RawPage::default()
                    });
                }
                Err(err) => {
                    warn!(path = %path.display(), page = number, error = %err, "ocr failed for page");
                    pages.push(RawPage {
                        number,
                        ..RawPage::default()
                    });
                    last_error = Some(err);
                }
            }
        }

        self.pages_recognized += recognized;
        if recognized == 0 {
            return Err(last_error.unwrap_or(ExtractError::Empty("ocr")));
        }
        Ok(pages)
    }

    pub(crate) fn shutdown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.shutdown();
            info!(
                engine = engine.name(),
                pages = self.pages_recognized,
                "ocr engine shut down"
            );
        }
    }
}

/// `pdftoppm` + `tesseract` in a private scratch directory.
pub(crate) struct TesseractEngine {
    scratch: Option<TempDir>,
    settings: OcrSettings,
}

impl TesseractEngine {
    pub(crate) fn start(settings: &OcrSettings) -> ExtractResult<Self> {
        for tool in ["pdftoppm", "tesseract", "pdfinfo"] {
            if !command_available(tool) {
                return Err(ExtractError::ToolUnavailable { tool });
            }
        }
        let scratch = tempfile::Builder::new()
            .prefix("leyesmx_ocr_")
            .tempdir()
            .map_err(|source| ExtractError::io(&std::env::temp_dir(), source))?;

        Ok(Self {
            scratch: Some(scratch),
            settings: settings.clone(),
        })
    }

    fn scratch_dir(&self) -> ExtractResult<&Path> {
        self.scratch
            .as_ref()
            .map(TempDir::path)
            .ok_or(ExtractError::ToolUnavailable { tool: "tesseract" })
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn page_count(&self, path: &Path) -> ExtractResult<usize> {
        let stdout = run_tool("pdfinfo", Command::new("pdfinfo").arg(path), path)?;
        let info = String::from_utf8_lossy(&stdout);
        info.lines()
            .find_map(|line| line.strip_prefix("Pages:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .ok_or_else(|| ExtractError::Parse {
                what: "pdfinfo output",
                detail: "missing Pages field".to_string(),
            })
    }

    fn recognize_page(&self, path: &Path, page: usize) -> ExtractResult<OcrPage> {
        let scratch = self.scratch_dir()?;
        let image_base = scratch.join(format!("page-{page}"));
        let image_path = image_base.with_extension("png");
        let output_base = scratch.join(format!("ocr-{page}"));

        run_tool(
            "pdftoppm",
            Command::new("pdftoppm")
                .arg("-r")
                .arg(self.settings.dpi.to_string())
                .arg("-png")
                .arg("-f")
                .arg(page.to_string())
                .arg("-l")
                .arg(page.to_string())
                .arg("-singlefile")
                .arg(path)
                .arg(&image_base),
            path,
        )?;

        let recognized = run_tool(
            "tesseract",
            Command::new("tesseract")
                .arg(&image_path)
                .arg(&output_base)
                .arg("-l")
                .arg(&self.settings.lang)
                .arg("txt")
                .arg("tsv"),
            &image_path,
        );
        let _ = fs::remove_file(&image_path);
        recognized?;

        let text_path = output_base.with_extension("txt");
        let tsv_path = output_base.with_extension("tsv");
        let text = fs::read_to_string(&text_path).map_err(|source| ExtractError::io(&text_path, source))?;
        let tsv = fs::read_to_string(&tsv_path).map_err(|source| ExtractError::io(&tsv_path, source))?;
        let _ = fs::remove_file(&text_path);
        let _ = fs::remove_file(&tsv_path);

        let tokens = parse_tsv(&tsv);
        Ok(OcrPage {
            text: text.replace('\u{000C}', "").trim_end().to_string(),
            tables: cluster_table_candidates(
                &tokens,
                self.settings.min_row_tokens,
                self.settings.min_table_rows,
                self.settings.column_tolerance,
            ),
        })
    }

    fn shutdown(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            let location = scratch.path().display().to_string();
            if let Err(err) = scratch.close() {
                warn!(path = %location, error = %err, "failed to remove ocr scratch directory");
            }
        }
    }
}

/// One recognized word from tesseract's TSV output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OcrToken {
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
    pub bbox: BBox,
    pub text: String,
}

/// Word-level rows (level 5) with text; header, layout rows and rejected words are skipped.
pub(crate) fn parse_tsv(tsv: &str) -> Vec<OcrToken> {
    tsv.lines()
        .filter_map(|row| {
            let fields = row.split('\t').collect::<Vec<&str>>();
            if fields.len() < 12 || fields[0] != "5" {
                return None;
            }
            let number = |index: usize| fields[index].trim().parse::<f64>().ok();
            let confidence = number(10)?;
            let text = fields[11].trim();
            if confidence < 0.0 || text.is_empty() {
                return None;
            }
            let (left, top, width, height) = (number(6)?, number(7)?, number(8)?, number(9)?);
            Some(OcrToken {
                block: fields[2].parse().ok()?,
                paragraph: fields[3].parse().ok()?,
                line: fields[4].parse().ok()?,
                bbox: BBox::new(left, top, left + width, top + height),
                text: text.to_string(),
            })
        })
        .collect()
}

/// Runs of consecutive visual lines with enough tokens, whose tokens start in the
/// same columns as the run's first line, become table candidates, one cell per token.
pub(crate) fn cluster_table_candidates(
    tokens: &[OcrToken],
    min_row_tokens: usize,
    min_table_rows: usize,
    column_tolerance: f64,
) -> Vec<TableCandidate> {
    let mut lines = BTreeMap::<(u32, u32, u32), Vec<&OcrToken>>::new();
    for token in tokens {
        lines
            .entry((token.block, token.paragraph, token.line))
            .or_default()
            .push(token);
    }

    let mut ordered = lines.into_values().collect::<Vec<Vec<&OcrToken>>>();
    for line in &mut ordered {
        line.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
    }
    ordered.sort_by(|a, b| line_top(a).total_cmp(&line_top(b)));

    let mut candidates = Vec::new();
    let mut run: Vec<Vec<&OcrToken>> = Vec::new();
    for line in ordered {
        let wide = line.len() >= min_row_tokens;
        if wide && run.first().is_none_or(|first| columns_align(first, &line, column_tolerance)) {
            run.push(line);
            continue;
        }
        if run.len() >= min_table_rows {
            candidates.push(candidate_from_rows(&run));
        }
        run.clear();
        if wide {
            run.push(line);
        }
    }
    if run.len() >= min_table_rows {
        candidates.push(candidate_from_rows(&run));
    }

    candidates
}

fn columns_align(first: &[&OcrToken], line: &[&OcrToken], tolerance: f64) -> bool {
    first.len() == line.len()
        && first
            .iter()
            .zip(line)
            .all(|(a, b)| (a.bbox.x0 - b.bbox.x0).abs() <= tolerance)
}

fn line_top(line: &[&OcrToken]) -> f64 {
    line.iter()
        .map(|token| token.bbox.top)
        .fold(f64::MAX, f64::min)
}

fn candidate_from_rows(rows: &[Vec<&OcrToken>]) -> TableCandidate {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let bbox = rows
        .iter()
        .flatten()
        .map(|token| token.bbox)
        .reduce(|acc, bbox| acc.union(&bbox));

    TableCandidate {
        bbox,
        rows: rows
            .iter()
            .map(|row| {
                let mut cells = row
                    .iter()
                    .map(|token| Some(token.text.clone()))
                    .collect::<Vec<Option<String>>>();
                cells.resize(width, None);
                cells
            })
            .collect(),
        origin: CandidateOrigin::Ocr,
    }
}
