//! Heuristic thresholds and pattern catalogs for the reconstruction pipeline.
//!
//! Every field has a default, so a TOML file only needs the values it changes.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scan: ScanConfig,
    pub extraction: ExtractionConfig,
    pub ocr: OcrConfig,
    pub tables: TableConfig,
    pub reassembly: ReassemblyConfig,
    pub edges: EdgeConfig,
    pub fragments: FragmentConfig,
    pub joining: JoinConfig,
    pub title: TitleConfig,
    pub matching: MatchingConfig,
    pub metadata: MetadataConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid pipeline configuration")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPreset {
    /// Five sampled pages; character, word, readable-page and image tests.
    #[default]
    Lenient,
    /// Three sampled pages; only a total-character floor.
    Strict,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub preset: ScanPreset,
    pub sample_pages: Option<usize>,
    pub min_chars: Option<usize>,
    pub min_words: Option<usize>,
    pub readable_page_words: Option<usize>,
    pub min_readable_ratio: Option<f64>,
    pub text_block_chars: Option<usize>,
    pub image_majority: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanThresholds {
    pub sample_pages: usize,
    pub min_chars: usize,
    pub min_words: usize,
    pub readable_page_words: usize,
    pub min_readable_ratio: f64,
    pub text_block_chars: usize,
    pub image_majority: bool,
}

impl ScanConfig {
    pub fn thresholds(&self) -> ScanThresholds {
        let base = match self.preset {
            ScanPreset::Lenient => ScanThresholds {
                sample_pages: 5,
                min_chars: 200,
                min_words: 30,
                readable_page_words: 20,
                min_readable_ratio: 0.40,
                text_block_chars: 100,
                image_majority: true,
            },
            ScanPreset::Strict => ScanThresholds {
                sample_pages: 3,
                min_chars: 50,
                min_words: 0,
                readable_page_words: 0,
                min_readable_ratio: 0.0,
                text_block_chars: 100,
                image_majority: false,
            },
        };

        ScanThresholds {
            sample_pages: self.sample_pages.unwrap_or(base.sample_pages).max(1),
            min_chars: self.min_chars.unwrap_or(base.min_chars),
            min_words: self.min_words.unwrap_or(base.min_words),
            readable_page_words: self.readable_page_words.unwrap_or(base.readable_page_words),
            min_readable_ratio: self.min_readable_ratio.unwrap_or(base.min_readable_ratio),
            text_block_chars: self.text_block_chars.unwrap_or(base.text_block_chars),
            image_majority: self.image_majority.unwrap_or(base.image_majority),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// A text strategy is accepted outright once it yields more than this many characters.
    pub min_accept_chars: usize,
    /// Read rule geometry (`mutool trace`) to find ruled tables.
    pub detect_tables: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_accept_chars: 100,
            detect_tables: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub dpi: u32,
    pub max_pages: usize,
    pub lang: Option<String>,
    /// OCR lines with at least this many tokens count as table rows.
    pub min_row_tokens: usize,
    pub min_table_rows: usize,
    /// Rows of one OCR table start their cells within this many pixels of the first row's.
    pub column_tolerance: f64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            max_pages: 50,
            lang: None,
            min_row_tokens: 3,
            min_table_rows: 2,
            column_tolerance: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub min_rows: usize,
    pub horizontal_rule_min_len: f64,
    pub vertical_rule_min_len: f64,
    pub bbox_padding: f64,
    pub min_horizontal_rules: usize,
    pub min_vertical_rules: usize,
    pub min_rule_ratio: f64,
    pub max_rule_ratio: f64,
    pub intersection_tolerance: f64,
    pub min_intersections: usize,
    pub min_header_cells: usize,
    pub min_filled_cells: usize,
    pub min_fill_density: f64,
    pub signature_keywords: Vec<String>,
    pub signature_min_hits: usize,
    pub signature_max_rows: usize,
    pub short_header_max_cells: usize,
    pub short_header_max_words: usize,
    pub short_data_min_avg_word_len: f64,
    pub min_significant_columns: usize,
    pub empty_header: String,
    pub empty_cell: String,
    pub key_prefix: String,
    pub lattice: LatticeConfig,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            horizontal_rule_min_len: 50.0,
            vertical_rule_min_len: 20.0,
            bbox_padding: 10.0,
            min_horizontal_rules: 3,
            min_vertical_rules: 2,
            min_rule_ratio: 0.15,
            max_rule_ratio: 6.0,
            intersection_tolerance: 15.0,
            min_intersections: 4,
            min_header_cells: 2,
            min_filled_cells: 4,
            min_fill_density: 0.30,
            signature_keywords: [
                "firma",
                "firmó",
                "rubrica",
                "rúbrica",
                "sello",
                "presente",
                "testigo",
                "secretario",
                "presidente",
                "titular",
                "director",
                "fecha:",
                "lugar:",
                "ciudad de méxico",
                "cd. de méxico",
            ]
            .iter()
            .map(|keyword| keyword.to_string())
            .collect(),
            signature_min_hits: 2,
            signature_max_rows: 4,
            short_header_max_cells: 2,
            short_header_max_words: 2,
            short_data_min_avg_word_len: 8.0,
            min_significant_columns: 2,
            empty_header: "(sin encabezado)".to_string(),
            empty_cell: "(sin dato)".to_string(),
            key_prefix: "tabla_".to_string(),
            lattice: LatticeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatticeConfig {
    pub edge_min_length: f64,
    pub snap_tolerance: f64,
    pub join_tolerance: f64,
    pub intersection_tolerance: f64,
    /// Words whose tops differ by less than this share a cell line.
    pub line_tolerance: f64,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            edge_min_length: 3.0,
            snap_tolerance: 3.0,
            join_tolerance: 3.0,
            intersection_tolerance: 3.0,
            line_tolerance: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    pub token_overlap: f64,
    pub overlap_min_line_len: usize,
    pub cell_min_len: usize,
    pub min_cell_hits: usize,
    pub single_cell_coverage: f64,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            token_overlap: 0.70,
            overlap_min_line_len: 10,
            cell_min_len: 4,
            min_cell_hits: 2,
            single_cell_coverage: 0.60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternScope {
    /// Checked on every line of the page.
    Page,
    /// Checked only inside the first/last `edge_window` lines.
    Edge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoilerplateRule {
    pub pattern: String,
    pub scope: PatternScope,
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
    /// Lines that also match this pattern are kept.
    #[serde(default)]
    pub unless: Option<String>,
}

fn default_true() -> bool {
    true
}

impl BoilerplateRule {
    fn new(pattern: &str, scope: PatternScope, case_insensitive: bool) -> Self {
        Self {
            pattern: pattern.to_string(),
            scope,
            case_insensitive,
            unless: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub lines_per_edge: usize,
    pub min_lines_per_page: usize,
    pub min_pages: usize,
    pub repeat_ratio: f64,
    pub min_repeats: usize,
    pub min_line_len: usize,
    pub max_line_len: usize,
    pub edge_window: usize,
    pub margin_ratio: f64,
    pub margin_min_len: usize,
    pub structural_exclusion: String,
    pub boilerplate: Vec<BoilerplateRule>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            lines_per_edge: 3,
            min_lines_per_page: 5,
            min_pages: 2,
            repeat_ratio: 0.30,
            min_repeats: 2,
            min_line_len: 3,
            max_line_len: 199,
            edge_window: 10,
            margin_ratio: 0.10,
            margin_min_len: 4,
            structural_exclusion:
                r"^(TÍTULO|TITULO|CAPÍTULO|CAPITULO|Capítulo|Capitulo|SECCIÓN|SECCION|Sección|Seccion|Artículo\s+\d+|Articulo\s+\d+)"
                    .to_string(),
            boilerplate: default_boilerplate(),
        }
    }
}

fn default_boilerplate() -> Vec<BoilerplateRule> {
    use PatternScope::{Edge, Page};

    let upper = "A-ZÁÉÍÓÚÑ";
    let mut rules = vec![
        // letter-spaced ribbons
        BoilerplateRule::new(&format!(r"^[{upper}]\s+[{upper}]\s+[{upper}]"), Page, false),
        BoilerplateRule {
            unless: Some(r"^[IVXLCDM]+\s*$".to_string()),
            ..BoilerplateRule::new(&format!(r"^[{upper}]{{1,2}}\s*$"), Page, false)
        },
        BoilerplateRule::new(r"CONSTITUCIÓN\s+POLÍTICA\s+DEL\s+ESTADO", Page, false),
        BoilerplateRule::new(r"ESTADO\s+LIBRE\s+Y\s+SOBERANO", Page, false),
        BoilerplateRule::new(r"LIBRE\s+Y\s+SOBERANO\s+DE\s+MÉXICO", Page, false),
        BoilerplateRule::new(r"CC\s+OO\s+N\s+S", Page, false),
        BoilerplateRule::new(r"^\d\s*$", Edge, true),
        BoilerplateRule::new(r"DE\s+MÉXICO", Edge, false),
        BoilerplateRule::new(r"[A-Z]\s+[A-Z]\s+[A-Z]\s+[A-Z]", Edge, false),
        // official gazettes
        BoilerplateRule::new(r"DIARIO OFICIAL", Edge, true),
        BoilerplateRule::new(
            r"(Primera|Segunda|Tercera|Cuarta|Quinta|Sexta|Séptima|Octava)\s+(Sección|Seccion)",
            Edge,
            true,
        ),
        // date stamps
        BoilerplateRule::new(
            r"(Lunes|Martes|Miércoles|Jueves|Viernes|Sábado|Domingo)\s+\d+\s+de\s+\w+\s+de\s+\d{4}",
            Edge,
            true,
        ),
        BoilerplateRule::new(r"DOF\s+\d{2}[-/]\d{2}[-/]\d{4}", Edge, true),
        BoilerplateRule::new(r"\d{2}\s+de\s+\w+\s+de\s+\d{4}", Edge, true),
        BoilerplateRule::new(r"\d{1,2}[-/]\d{1,2}[-/]\d{2,4}", Edge, true),
        BoilerplateRule::new(
            r"(Enero|Febrero|Marzo|Abril|Mayo|Junio|Julio|Agosto|Septiembre|Octubre|Noviembre|Diciembre)\s+de\s+\d{4}",
            Edge,
            true,
        ),
        // page numbers
        BoilerplateRule::new(r"^\d+\s*$", Edge, true),
        BoilerplateRule::new(r"^-\s*\d+\s*-$", Edge, true),
        BoilerplateRule::new(r"^Página\s+\d+", Edge, true),
        BoilerplateRule::new(r"^Page\s+\d+", Edge, true),
        BoilerplateRule::new(r"^Pág\.\s*\d+", Edge, true),
        BoilerplateRule::new(r"^\d+\s+de\s+\d+\s*$", Edge, true),
        BoilerplateRule::new(r"^\d+\s*/\s*\d+\s*$", Edge, true),
        BoilerplateRule::new(r"^\d+\s+\(\w+\s+Sección\)", Edge, true),
        // institutions
        BoilerplateRule::new(r"CÁMARA DE DIPUTADOS", Edge, true),
        BoilerplateRule::new(r"CÁMARA DE SENADORES", Edge, true),
        BoilerplateRule::new(r"CONGRESO DE LA UNIÓN", Edge, true),
        BoilerplateRule::new(r"H\.\s*CONGRESO", Edge, true),
        BoilerplateRule::new(r"HONORABLE CONGRESO", Edge, true),
        BoilerplateRule::new(r"^Secretaría\s+(General|de\s+\w+)", Edge, true),
        BoilerplateRule::new(r"PODER EJECUTIVO", Edge, true),
        BoilerplateRule::new(r"PODER LEGISLATIVO", Edge, true),
        BoilerplateRule::new(r"PODER JUDICIAL", Edge, true),
        BoilerplateRule::new(r"GOBIERNO\s+(FEDERAL|DEL ESTADO|DE\s+)", Edge, true),
        BoilerplateRule::new(r"GACETA\s+(OFICIAL|PARLAMENTARIA)", Edge, true),
        // running titles of laws and regulations
        BoilerplateRule::new(r"^(Nuevo\s+)?Reglamento\s+DOF", Edge, true),
        BoilerplateRule::new(r"REGLAMENTO\s+(DE\s+LA\s+)?LEY", Edge, true),
        BoilerplateRule::new(r"^LEY\s+FEDERAL\s+DE", Edge, true),
        BoilerplateRule::new(r"^CÓDIGO\s+(CIVIL|PENAL|FEDERAL)", Edge, true),
        BoilerplateRule::new(r"GUBERNAMENTAL\s*$", Edge, true),
        BoilerplateRule::new(r"TRANSPARENCIA\s+Y\s+ACCESO", Edge, true),
        BoilerplateRule::new(r"ÚLTIMA\s+REFORMA", Edge, true),
        BoilerplateRule::new(r"PUBLICADA?\s+EN\s+EL\s+DOF", Edge, true),
        BoilerplateRule::new(r"PUBLICADA?\s+EN\s+(LA\s+)?GACETA", Edge, true),
        BoilerplateRule::new(&format!(r"^[{upper}\s]{{45,}}$"), Edge, false),
        // margin strips
        BoilerplateRule::new(&format!(r"^[{upper}]{{1,3}}\s*$"), Edge, false),
        BoilerplateRule::new(r"^\d{1,4}\s*$", Edge, true),
        BoilerplateRule::new(r"^[IVXLCDM]+\s*$", Edge, false),
        // repeated notes
        BoilerplateRule::new(r"^Al margen un sello", Edge, true),
        BoilerplateRule::new(r"^TEXTO VIGENTE", Edge, true),
        BoilerplateRule::new(r"^Nueva Ley publicada", Edge, true),
        BoilerplateRule::new(r"^\d+\s+\(.*?(Sección|Edición)\)", Edge, true),
        // web references
        BoilerplateRule::new(r"www\.", Edge, true),
        BoilerplateRule::new(r"https?://", Edge, true),
        BoilerplateRule::new(r"\.gob\.mx", Edge, true),
        BoilerplateRule::new(r"\.com\.mx", Edge, true),
    ];

    // electronic signatures
    for pattern in [
        r"Firma\s+electrónica",
        r"Sello\s+digital",
        r"Cadena\s+original",
    ] {
        rules.push(BoilerplateRule::new(pattern, Edge, true));
    }

    rules
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentConfig {
    pub ribbon_patterns: Vec<String>,
    pub space_ratio: f64,
    pub short_line_max_chars: usize,
    pub min_tokens: usize,
    pub short_token_len: usize,
    pub short_token_ratio: f64,
    pub spaced_letters_pattern: String,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            ribbon_patterns: [
                r"^CONSTITUCIÓN\s+POLÍTICA",
                r"^POLÍTICA\s+DEL\s+ESTADO",
                r"^DEL\s+ESTADO\s+LIBRE",
                r"^ESTADO\s+LIBRE\s+Y",
                r"^LIBRE\s+Y\s+SOBERANO",
                r"^Y\s+SOBERANO\s+DE",
                r"^SOBERANO\s+DE\s+MÉXICO",
                r"^DE\s+MÉXICO\s*$",
                r"^MÉXICO\s*$",
                r"^C\s+O\s+N\s+S\s+T",
                r"^P\s+O\s+L\s+Í\s+T",
                r"^D\s+E\s+L(\s|$)",
                r"^E\s+S\s+T\s+A\s+D\s+O",
                r"^L\s+I\s+B\s+R\s+E",
            ]
            .iter()
            .map(|pattern| pattern.to_string())
            .collect(),
            space_ratio: 0.4,
            short_line_max_chars: 3,
            min_tokens: 3,
            short_token_len: 2,
            short_token_ratio: 0.8,
            spaced_letters_pattern: r"^([A-ZÁÉÍÓÚÑ]{1,2}\s+){3,}[A-ZÁÉÍÓÚÑ]{1,2}\s*$".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    pub structural_patterns: Vec<String>,
    pub uppercase_ratio: f64,
    pub uppercase_min_len: usize,
    /// Close an ALL-CAPS block as soon as a mixed-case line follows.
    pub flush_uppercase_blocks: bool,
    /// Lines with at most this many words and no trailing comma close eagerly.
    pub short_line_max_words: Option<usize>,
    pub terminal_punctuation: String,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            structural_patterns: [
                r"^(Artículo|ARTÍCULO|Articulo|ARTICULO|Art\.|ART\.)\s+\d+",
                r"^(Fracción|FRACCIÓN|Fraccion|FRACCION|Fracc\.|FRACC\.)\s*[IVX\d]*",
                r"^(Capítulo|CAPÍTULO|Capitulo|CAPITULO|Cap\.|CAP\.)\s+[IVX\d]+",
                r"^(Título|TÍTULO|Titulo|TITULO|Tít\.|TÍT\.)\s+[IVX\d]+",
                r"^(Sección|SECCIÓN|Seccion|SECCION|Secc\.|SECC\.)",
                r"^[IVX]+\.",
                r"^[IVXLCDM]+\)",
                r"^\d+\.",
                r"^\d+\)",
                r"^[a-z]\)",
                r"^[A-Z]\)",
            ]
            .iter()
            .map(|pattern| pattern.to_string())
            .collect(),
            uppercase_ratio: 0.8,
            uppercase_min_len: 3,
            flush_uppercase_blocks: false,
            short_line_max_words: None,
            terminal_punctuation: ".;:!?".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    pub prefix_patterns: Vec<String>,
    pub normalize_capitalization: bool,
    pub connectors: Vec<String>,
    pub min_len: usize,
    pub max_len: usize,
    pub fallback: String,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            prefix_patterns: [
                r"^\d+[_\-\.\s]+",
                r"^\(\d+\)[\s_\-]*",
                r"^\d+\)[\s_\-]*",
                r"^[A-Za-z]\d+[_\-\.\s]+",
                r"^\d+\s*[\-–—]\s*",
            ]
            .iter()
            .map(|pattern| pattern.to_string())
            .collect(),
            normalize_capitalization: true,
            connectors: ["de", "la", "el", "los", "las", "del", "al", "y", "en", "para", "por", "con"]
                .iter()
                .map(|word| word.to_string())
                .collect(),
            min_len: 5,
            max_len: 300,
            fallback: "Documento Legal".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub max_length_diff: f64,
    pub min_similarity: f64,
    pub version_words: Vec<String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_length_diff: 0.25,
            min_similarity: 0.92,
            version_words: [
                "parte", "tomo", "volumen", "seccion", "libro", "i", "ii", "iii", "iv", "v", "1",
                "2", "3", "4", "5",
            ]
            .iter()
            .map(|word| word.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub enabled: bool,
    pub ordenamiento: Option<String>,
    pub jurisdiccion: Option<String>,
    pub fuente_oficial: Option<String>,
    pub publication_window: usize,
    pub reform_window: usize,
    pub vigente_window: usize,
    pub publication_patterns: Vec<String>,
    pub reform_patterns: Vec<String>,
    pub vigente_patterns: Vec<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        let long_date = r"\d{1,2}\s+de\s+\w+\s+de\s+\d{4}";
        let short_date = r"\d{1,2}[-/]\d{1,2}[-/]\d{4}";
        let months = "enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|octubre|noviembre|diciembre";
        let weekdays = r"lunes|martes|mi[eé]rcoles|jueves|viernes|s[aá]bado|domingo";

        Self {
            enabled: false,
            ordenamiento: None,
            jurisdiccion: None,
            fuente_oficial: None,
            publication_window: 15_000,
            reform_window: 10_000,
            vigente_window: 5_000,
            publication_patterns: vec![
                format!(r"Peri[oó]dico\s+Oficial\s+del\s+Estado\s+de\s+\w+,?\s+el\s+(?:{weekdays})\s+({long_date})"),
                format!(r"Peri[oó]dico\s+Oficial\s+del\s+Estado\s+de\s+\w+,?\s+el\s+({long_date})"),
                format!(r"desde\s+su\s+publicaci[oó]n[^\d]{{0,20}}({long_date})"),
                format!(r"desde\s+la\s+publicaci[oó]n[^\d]{{0,50}}({long_date})"),
                format!(r"publicaci[oó]n[^\d]{{0,30}}({long_date})"),
                format!(r"publicad[oa][^\d]{{0,20}}({long_date})"),
                format!(r"vigente[^\d]{{0,20}}({long_date})"),
                format!(r"en\s+vigor[^\d]{{0,20}}({long_date})"),
                format!(r"(\d{{1,2}}\s+de\s+(?:{months})\s+de\s+\d{{4}})"),
            ],
            reform_patterns: vec![
                format!(r"[uú]ltima\s+reforma[^\d]{{0,50}}({long_date})"),
                r"[uú]ltima\s+actualizaci[oó]n[^\d]{0,30}(\d{1,2}/\w+/\d{4})".to_string(),
                format!(r"[uú]ltima\s+reforma[^\d]{{0,30}}(\d{{1,2}}-\d{{1,2}}-\d{{4}})"),
                format!(r"[uú]ltima\s+modificaci[oó]n[^\d]{{0,30}}({short_date})"),
                format!(r"[uú]ltima\s+modificaci[oó]n[^\d]{{0,30}}({long_date})"),
                format!(r"reforma[^\d]{{0,50}}({long_date})"),
                format!(r"reforma[^\d]{{0,30}}({short_date})"),
                format!(r"actualizaci[oó]n[^\d]{{0,30}}({short_date})"),
                format!(r"actualizaci[oó]n[^\d]{{0,30}}({long_date})"),
                format!(r"modificaci[oó]n[^\d]{{0,30}}({short_date})"),
                format!(r"modificaci[oó]n[^\d]{{0,30}}({long_date})"),
                format!(r"(\d{{1,2}}/(?:{months})/\d{{4}})"),
            ],
            vigente_patterns: vec![
                r"texto\s+vigente".to_string(),
                r"texto\s+en\s+vigor".to_string(),
                r"vigente".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub max_filename_len: usize,
    pub long_path_filename_len: usize,
    pub max_path_len: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_filename_len: 150,
            long_path_filename_len: 100,
            max_path_len: 255,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [edges]
            repeat_ratio = 0.4

            [joining]
            short_line_max_words = 6
            flush_uppercase_blocks = true

            [scan]
            preset = "strict"
            "#,
        )
        .expect("config parses");

        assert_eq!(config.edges.repeat_ratio, 0.4);
        assert_eq!(config.edges.edge_window, 10);
        assert_eq!(config.joining.short_line_max_words, Some(6));
        assert_eq!(config.tables.empty_cell, "(sin dato)");

        let scan = config.scan.thresholds();
        assert_eq!(scan.sample_pages, 3);
        assert_eq!(scan.min_chars, 50);
        assert!(!scan.image_majority);
    }

    #[test]
    fn boilerplate_rules_accept_scope_and_case_flags() {
        let config = PipelineConfig::from_toml(
            r#"
            [edges]
            boilerplate = [
                { pattern = "PERIÓDICO OFICIAL", scope = "edge" },
                { pattern = "^R U B R O", scope = "page", case_insensitive = false },
            ]
            "#,
        )
        .expect("config parses");

        assert_eq!(config.edges.boilerplate.len(), 2);
        assert!(config.edges.boilerplate[0].case_insensitive);
        assert_eq!(config.edges.boilerplate[1].scope, PatternScope::Page);
    }

    #[test]
    fn unknown_scan_preset_is_rejected() {
        assert!(PipelineConfig::from_toml("[scan]\npreset = \"aggressive\"\n").is_err());
    }
}
