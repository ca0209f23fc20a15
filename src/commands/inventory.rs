use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::cli::InventoryArgs;
use crate::model::{DocumentKind, SourceEntry, SourceInventoryManifest};
use crate::util::{now_utc_string, read_head, sha256_file, write_json_pretty};

const SOURCE_EXTENSIONS: [&str; 3] = ["pdf", "docx", "doc"];

static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)").expect("leading number regex is valid"));

pub fn run(args: InventoryArgs) -> Result<()> {
    let manifest = build_manifest(&args.input_dir)?;

    if args.dry_run {
        for entry in &manifest.documents {
            info!(file = %entry.filename, kind = entry.kind.as_str(), "source document");
        }
        info!(
            document_count = manifest.document_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| args.input_dir.join("manifests").join("source_inventory.json"));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(document_count = manifest.document_count, "inventory completed");

    Ok(())
}

pub fn build_manifest(input_dir: &Path) -> Result<SourceInventoryManifest> {
    let paths = discover_documents(input_dir)?;
    if paths.is_empty() {
        bail!("no PDF or Word documents found in {}", input_dir.display());
    }

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let filename = file_name_of(&path)?;
        let size_bytes = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();

        documents.push(SourceEntry {
            filename,
            kind: detect_kind(&path)?,
            size_bytes,
            sha256: sha256_file(&path)?,
        });
    }

    Ok(SourceInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: input_dir.display().to_string(),
        document_count: documents.len(),
        documents,
    })
}

/// Lists source documents in processing order.
pub fn discover_documents(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();

    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("failed to read {}", input_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", input_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_source = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                SOURCE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false);

        if is_source {
            documents.push(path);
        }
    }

    documents.sort_by(|a, b| {
        let a_name = a.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let b_name = b.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        compare_processing_order(&a_name, &b_name)
    });

    Ok(documents)
}

/// Numbered files first by their number, then the rest alphabetically (case-insensitive).
pub fn compare_processing_order(a: &str, b: &str) -> Ordering {
    processing_key(a).cmp(&processing_key(b))
}

fn processing_key(filename: &str) -> (u8, u128, String) {
    let lowered = filename.to_lowercase();
    match LEADING_NUMBER
        .captures(filename)
        .and_then(|captures| captures.get(1))
        .and_then(|number| number.as_str().parse::<u128>().ok())
    {
        Some(number) => (0, number, lowered),
        None => (1, 0, lowered),
    }
}

/// Classifies a file by its magic bytes, ignoring the extension.
pub fn detect_kind(path: &Path) -> Result<DocumentKind> {
    let head = read_head(path, 8)?;

    if head.starts_with(b"%PDF") {
        return Ok(DocumentKind::Pdf);
    }
    if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
        return Ok(if zip_is_word_document(path) {
            DocumentKind::Docx
        } else {
            DocumentKind::Unknown
        });
    }
    if head.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return Ok(DocumentKind::LegacyDoc);
    }
    if head.starts_with(b"{\\rtf") {
        return Ok(DocumentKind::Rtf);
    }

    Ok(DocumentKind::Unknown)
}

fn zip_is_word_document(path: &Path) -> bool {
    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let Ok(archive) = zip::ZipArchive::new(file) else {
        warn!(path = %path.display(), "zip signature but unreadable archive");
        return false;
    };

    archive
        .file_names()
        .any(|name| name == "word/document.xml" || name == "[Content_Types].xml")
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))
}
