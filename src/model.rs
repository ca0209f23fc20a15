use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Docx,
    LegacyDoc,
    Rtf,
    Unknown,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::LegacyDoc => "legacy_doc",
            Self::Rtf => "rtf",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub filename: String,
    pub kind: DocumentKind,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub document_count: usize,
    pub documents: Vec<SourceEntry>,
}

/// The externally visible artifact: one per source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentRecord {
    #[serde(rename = "Titulo")]
    pub titulo: String,
    pub contenido: String,
    #[serde(rename = "Contenido", skip_serializing_if = "Option::is_none")]
    pub contenido_referencia: Option<String>,
    #[serde(flatten)]
    pub metadata: Option<RecordMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordenamiento: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiccion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuente_oficial: Option<String>,
    pub es_escaneado: bool,
    pub tiene_tablas: bool,
    pub numero_paginas: usize,
    pub fecha_publicacion: Option<String>,
    pub ultima_reforma: Option<String>,
    pub texto_vigente: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolVersions {
    pub pdftotext: Option<String>,
    pub mutool: Option<String>,
    pub pdftoppm: Option<String>,
    pub tesseract: Option<String>,
    pub antiword: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractPaths {
    pub input_dir: String,
    pub output: String,
    pub config_path: Option<String>,
    pub reference_json: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractCounts {
    pub document_count: usize,
    pub processed_count: usize,
    pub error_count: usize,
    pub scanned_count: usize,
    pub with_tables_count: usize,
    pub with_reference_count: usize,
    pub tables_accepted: usize,
    pub tables_rejected: usize,
    pub ocr_page_count: usize,
    pub edge_lines_removed: usize,
    pub fragment_lines_removed: usize,
    pub hyphen_joins: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentProvenance {
    pub filename: String,
    pub kind: DocumentKind,
    pub output_path: Option<String>,
    pub backend: String,
    pub is_scanned: bool,
    pub page_count: usize,
    pub tables_accepted: usize,
    pub tables_rejected: usize,
    pub content_chars: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub ocr_mode: String,
    pub tool_versions: ToolVersions,
    pub paths: ExtractPaths,
    pub counts: ExtractCounts,
    pub documents: Vec<DocumentProvenance>,
    pub warnings: Vec<String>,
}
