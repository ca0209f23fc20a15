use super::*;

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::Utc;

use crate::commands::inventory::{detect_kind, discover_documents};
use crate::model::{
    DocumentProvenance, ExtractCounts, ExtractPaths, ExtractRunManifest, ToolVersions,
};
use crate::util::{
    ensure_directory, now_utc_string, sanitize_filename, utc_compact_string, write_json_pretty,
};

pub(crate) const NO_CONTENT: &str = "No se pudo extraer contenido del documento";

pub fn run(args: ExtractArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let config = load_config(&args)?;
    let pipeline = Pipeline::new(&config)?;
    let reference = args
        .reference_json
        .as_deref()
        .map(|path| ReferenceIndex::load(path, &config.matching))
        .transpose()?;

    let documents = match &args.file {
        Some(file) => {
            if !file.is_file() {
                bail!("document not found: {}", file.display());
            }
            vec![file.clone()]
        }
        None => discover_documents(&args.input_dir)?,
    };
    if documents.is_empty() {
        bail!("no PDF or Word documents found in {}", args.input_dir.display());
    }
    info!(
        run_id = %run_id,
        documents = documents.len(),
        ocr_mode = args.ocr_mode.as_str(),
        "starting extract"
    );

    if args.output_file.is_none() {
        ensure_directory(&args.output_dir)?;
    }

    let sources = PdfSources::system();
    let mut ocr = OcrSession::new(OcrSettings::from_config(&config.ocr, args.ocr_lang.as_deref()));
    let batch = Batch {
        pipeline: &pipeline,
        sources: &sources,
        reference: reference.as_ref(),
        ocr_mode: args.ocr_mode,
        max_pages: args.max_pages,
    };

    let mut counts = ExtractCounts {
        document_count: documents.len(),
        ..ExtractCounts::default()
    };
    let mut provenance = Vec::with_capacity(documents.len());
    let mut records = Vec::new();
    let mut warnings = Vec::new();

    for (index, path) in documents.iter().enumerate() {
        let processed = batch.process(path, &mut ocr);

        let mut write_failure = None;
        let output_path = match &args.output_file {
            Some(_) => None,
            None => match write_record(&args.output_dir, index, &processed.record, &config.output) {
                Ok(path) => Some(path),
                Err(err) => {
                    let failure = format!("failed to write record: {err:#}");
                    warn!(file = %processed.file_name, error = %failure, "record not written");
                    write_failure = Some(failure);
                    None
                }
            },
        };
        processed.tally(&mut counts, write_failure.is_some());

        warnings.extend(
            processed
                .warnings
                .iter()
                .chain(&write_failure)
                .map(|warning| format!("{}: {warning}", processed.file_name)),
        );
        provenance.push(processed.provenance(output_path, write_failure));
        if args.output_file.is_some() {
            records.push(processed.record);
        }
    }

    ocr.shutdown();

    if let Some(output_file) = &args.output_file {
        write_json_pretty(output_file, &records)?;
        info!(path = %output_file.display(), records = records.len(), "wrote records");
    }

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.output_dir
            .join("manifests")
            .join(format!("extract_run_{}.json", utc_compact_string(started_ts)))
    });
    let manifest = ExtractRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_extract_command(&args),
        ocr_mode: args.ocr_mode.as_str().to_string(),
        tool_versions: collect_tool_versions(),
        paths: ExtractPaths {
            input_dir: args.input_dir.display().to_string(),
            output: args
                .output_file
                .as_ref()
                .unwrap_or(&args.output_dir)
                .display()
                .to_string(),
            config_path: args.config.as_ref().map(|path| path.display().to_string()),
            reference_json: args
                .reference_json
                .as_ref()
                .map(|path| path.display().to_string()),
        },
        counts,
        documents: provenance,
        warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote extract run manifest");

    info!(
        processed = manifest.counts.processed_count,
        errors = manifest.counts.error_count,
        scanned = manifest.counts.scanned_count,
        with_tables = manifest.counts.with_tables_count,
        with_reference = manifest.counts.with_reference_count,
        "extract completed"
    );

    Ok(())
}

fn load_config(args: &ExtractArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if args.with_metadata {
        config.metadata.enabled = true;
    }
    Ok(config)
}

/// Shared collaborators for one batch.
pub(crate) struct Batch<'a> {
    pub pipeline: &'a Pipeline,
    pub sources: &'a PdfSources,
    pub reference: Option<&'a ReferenceIndex>,
    pub ocr_mode: OcrMode,
    pub max_pages: Option<usize>,
}

struct Extraction {
    text: String,
    raw_text: String,
    stats: DocumentStats,
    backend: String,
    is_scanned: bool,
    page_count: usize,
    ocr_page_count: usize,
    warnings: Vec<String>,
}

/// One finished document: its output record plus what the manifest reports about it.
#[derive(Debug)]
pub(crate) struct ProcessedDocument {
    pub file_name: String,
    pub kind: DocumentKind,
    pub record: DocumentRecord,
    pub backend: String,
    pub is_scanned: bool,
    pub page_count: usize,
    pub ocr_page_count: usize,
    pub stats: DocumentStats,
    pub warnings: Vec<String>,
}

impl Batch<'_> {
    /// Never fails: extraction errors and panics become an `error` record.
    pub(crate) fn process(&self, path: &Path, ocr: &mut OcrSession) -> ProcessedDocument {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let titulo = self.pipeline.title(&file_name);
        let kind = detect_kind(path).unwrap_or(DocumentKind::Unknown);

        let outcome = catch_unwind(AssertUnwindSafe(|| self.extract(path, kind, ocr)));
        let failure = match outcome {
            Ok(Ok(extraction)) => {
                return self.finish(file_name, kind, titulo, extraction);
            }
            Ok(Err(err)) => format!("{err:#}"),
            Err(payload) => format!("pánico durante la extracción: {}", panic_message(payload.as_ref())),
        };

        warn!(file = %file_name, error = %failure, "document failed");
        let contenido_referencia = self.reference_content(&titulo);
        let metadata = self.record_metadata("", false, false, 0);
        ProcessedDocument {
            file_name,
            kind,
            record: DocumentRecord {
                titulo,
                contenido: format!("Error al procesar: {failure}"),
                contenido_referencia,
                metadata,
                error: Some(failure),
            },
            backend: "none".to_string(),
            is_scanned: false,
            page_count: 0,
            ocr_page_count: 0,
            stats: DocumentStats::default(),
            warnings: Vec::new(),
        }
    }

    fn extract(&self, path: &Path, kind: DocumentKind, ocr: &mut OcrSession) -> Result<Extraction> {
        match kind {
            DocumentKind::Pdf => {
                let document = self
                    .pipeline
                    .extract_pdf(path, self.sources, ocr, self.ocr_mode, self.max_pages)?;
                let (text, stats) = self.pipeline.reconstruct(&document);
                Ok(Extraction {
                    text,
                    raw_text: document.raw_text(),
                    stats,
                    backend: document.backend,
                    is_scanned: document.is_scanned,
                    page_count: document.pages.len(),
                    ocr_page_count: document.ocr_page_count,
                    warnings: document.warnings,
                })
            }
            DocumentKind::Docx => {
                let blocks = self
                    .sources
                    .word
                    .docx(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let raw_text = blocks
                    .iter()
                    .filter_map(|block| match block {
                        WordBlock::Paragraph(text) => Some(text.as_str()),
                        WordBlock::Table(_) => None,
                    })
                    .collect::<Vec<&str>>()
                    .join("\n");
                let (text, stats) = self.pipeline.reconstruct_word(&blocks);
                Ok(Extraction {
                    text,
                    raw_text,
                    stats,
                    backend: "docx".to_string(),
                    is_scanned: false,
                    page_count: 0,
                    ocr_page_count: 0,
                    warnings: Vec::new(),
                })
            }
            DocumentKind::LegacyDoc => {
                let raw_text = self
                    .sources
                    .word
                    .legacy_doc(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let (text, stats) = self.pipeline.reconstruct_plain(&raw_text);
                Ok(Extraction {
                    text,
                    raw_text,
                    stats,
                    backend: "antiword".to_string(),
                    is_scanned: false,
                    page_count: 0,
                    ocr_page_count: 0,
                    warnings: Vec::new(),
                })
            }
            DocumentKind::Rtf => Err(ExtractError::Unsupported("rtf").into()),
            DocumentKind::Unknown => Err(ExtractError::Unsupported("unrecognized file format").into()),
        }
    }

    fn finish(
        &self,
        file_name: String,
        kind: DocumentKind,
        titulo: String,
        extraction: Extraction,
    ) -> ProcessedDocument {
        let has_content = !extraction.text.trim().is_empty();
        let contenido_referencia = self.reference_content(&titulo);
        let metadata = self.record_metadata(
            &extraction.raw_text,
            extraction.is_scanned,
            extraction.stats.tables_accepted > 0,
            extraction.page_count,
        );

        if has_content {
            info!(
                file = %file_name,
                backend = %extraction.backend,
                scanned = extraction.is_scanned,
                tables = extraction.stats.tables_accepted,
                chars = extraction.text.chars().count(),
                "document reconstructed"
            );
        } else {
            warn!(file = %file_name, backend = %extraction.backend, "no content extracted");
        }

        ProcessedDocument {
            file_name,
            kind,
            record: DocumentRecord {
                titulo,
                contenido: if has_content {
                    extraction.text
                } else {
                    NO_CONTENT.to_string()
                },
                contenido_referencia,
                metadata,
                error: (!has_content).then(|| NO_CONTENT.to_string()),
            },
            backend: extraction.backend,
            is_scanned: extraction.is_scanned,
            page_count: extraction.page_count,
            ocr_page_count: extraction.ocr_page_count,
            stats: extraction.stats,
            warnings: extraction.warnings,
        }
    }

    fn reference_content(&self, titulo: &str) -> Option<String> {
        self.reference
            .and_then(|reference| reference.find(titulo))
            .map(|found| found.entry.content.clone())
    }

    /// `None` unless metadata is enabled; an empty `raw_text` yields the defaulted fields.
    fn record_metadata(
        &self,
        raw_text: &str,
        is_scanned: bool,
        has_tables: bool,
        page_count: usize,
    ) -> Option<RecordMetadata> {
        self.pipeline.config().metadata.enabled.then(|| {
            self.pipeline
                .metadata()
                .record_metadata(raw_text, is_scanned, has_tables, page_count)
        })
    }
}

impl ProcessedDocument {
    fn tally(&self, counts: &mut ExtractCounts, write_failed: bool) {
        if self.record.error.is_some() || write_failed {
            counts.error_count += 1;
        } else {
            counts.processed_count += 1;
        }
        counts.scanned_count += usize::from(self.is_scanned);
        counts.with_tables_count += usize::from(self.stats.tables_accepted > 0);
        counts.with_reference_count += usize::from(self.record.contenido_referencia.is_some());
        counts.tables_accepted += self.stats.tables_accepted;
        counts.tables_rejected += self.stats.tables_rejected;
        counts.ocr_page_count += self.ocr_page_count;
        counts.edge_lines_removed += self.stats.edge_lines_removed;
        counts.fragment_lines_removed += self.stats.fragment_lines_removed;
        counts.hyphen_joins += self.stats.hyphen_joins;
    }

    fn provenance(&self, output_path: Option<PathBuf>, write_failure: Option<String>) -> DocumentProvenance {
        DocumentProvenance {
            filename: self.file_name.clone(),
            kind: self.kind,
            output_path: output_path.map(|path| path.display().to_string()),
            backend: self.backend.clone(),
            is_scanned: self.is_scanned,
            page_count: self.page_count,
            tables_accepted: self.stats.tables_accepted,
            tables_rejected: self.stats.tables_rejected,
            content_chars: self.record.contenido.chars().count(),
            error: write_failure.or_else(|| self.record.error.clone()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "sin mensaje".to_string())
}

/// Title-derived file name; falls back to `doc_NNNN.json` when that name cannot be written.
pub(crate) fn write_record(
    output_dir: &Path,
    index: usize,
    record: &DocumentRecord,
    config: &OutputConfig,
) -> Result<PathBuf> {
    let preferred = record_path(output_dir, &record.titulo, config);
    if let Some(path) = preferred {
        match write_json_pretty(&path, record) {
            Ok(()) => return Ok(path),
            Err(err) => {
                warn!(path = %path.display(), error = %format!("{err:#}"), "record write failed; using fallback name");
            }
        }
    }

    let suffix = if record.error.is_some() { "_error" } else { "" };
    let fallback = output_dir.join(format!("doc_{:04}{suffix}.json", index + 1));
    write_json_pretty(&fallback, record)?;
    Ok(fallback)
}

fn record_path(output_dir: &Path, title: &str, config: &OutputConfig) -> Option<PathBuf> {
    let stem = sanitize_filename(title, config.max_filename_len);
    if stem.is_empty() {
        return None;
    }
    let path = output_dir.join(format!("{stem}.json"));
    if path.as_os_str().len() <= config.max_path_len {
        return Some(path);
    }

    let stem = sanitize_filename(title, config.long_path_filename_len);
    (!stem.is_empty()).then(|| output_dir.join(format!("{stem}.json")))
}

fn collect_tool_versions() -> ToolVersions {
    ToolVersions {
        pdftotext: command_version_optional("pdftotext", &["-v"]),
        mutool: command_version_optional("mutool", &["-v"]),
        pdftoppm: command_version_optional("pdftoppm", &["-v"]),
        tesseract: command_version_optional("tesseract", &["--version"]),
        antiword: command_version_optional("antiword", &[]),
    }
}

fn render_extract_command(args: &ExtractArgs) -> String {
    let mut command = vec!["leyesmx".to_string(), "extract".to_string()];

    match &args.file {
        Some(file) => {
            command.push("--file".to_string());
            command.push(file.display().to_string());
        }
        None => {
            command.push("--input-dir".to_string());
            command.push(args.input_dir.display().to_string());
        }
    }
    match &args.output_file {
        Some(path) => {
            command.push("--output-file".to_string());
            command.push(path.display().to_string());
        }
        None => {
            command.push("--output-dir".to_string());
            command.push(args.output_dir.display().to_string());
        }
    }
    if let Some(path) = &args.config {
        command.push("--config".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.reference_json {
        command.push("--reference-json".to_string());
        command.push(path.display().to_string());
    }
    command.push("--ocr-mode".to_string());
    command.push(args.ocr_mode.as_str().to_string());
    if let Some(lang) = &args.ocr_lang {
        command.push("--ocr-lang".to_string());
        command.push(lang.clone());
    }
    if let Some(max_pages) = args.max_pages {
        command.push("--max-pages".to_string());
        command.push(max_pages.to_string());
    }
    if args.with_metadata {
        command.push("--with-metadata".to_string());
    }

    command.join(" ")
}
