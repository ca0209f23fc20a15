use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "leyesmx",
    version,
    about = "Reconstruct Mexican legal documents (PDF/Word) into JSON records"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Inventory(InventoryArgs),
    Extract(ExtractArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = "documentos")]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[arg(long, default_value = "documentos")]
    pub input_dir: PathBuf,

    /// Process a single document instead of the whole input directory.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Directory receiving one JSON record per document.
    #[arg(long, default_value = "salida")]
    pub output_dir: PathBuf,

    /// Write every record into a single JSON array instead of one file per document.
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Reference dataset used to fill the `Contenido` field by title match.
    #[arg(long)]
    pub reference_json: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OcrMode::Auto)]
    pub ocr_mode: OcrMode,

    /// Tesseract language list; overrides `[ocr] lang`, which defaults to `spa+eng`.
    #[arg(long)]
    pub ocr_lang: Option<String>,

    #[arg(long)]
    pub max_pages: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub with_metadata: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OcrMode {
    Off,
    Auto,
    Force,
}

impl OcrMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Auto => "auto",
            Self::Force => "force",
        }
    }
}
