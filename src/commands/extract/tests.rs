use serde_json::Value;

use super::*;

const PAGE_ONE: &str = "GOBIERNO DEL ESTADO
DISPOSICIONES GENERALES
Artículo 1. Las disposiciones de esta ley regulan la prestación de los servicios de agua
potable, drenaje y saneamiento en todo el territorio estatal, conforme al regla-
mento que expida el Ejecutivo y a los convenios celebrados con los municipios.
Artículo 2. Los organismos operadores administran los sistemas de agua y rinden
cuentas anuales sobre la calidad del servicio prestado a la población usuaria.";

const PAGE_TWO: &str = "GOBIERNO DEL ESTADO
Artículo 3. Las cuotas por los servicios se cobran de acuerdo con la tabla siguiente:
Clave de tarifa Concepto del servicio
Tarifa doméstica Suministro de agua potable
Tarifa comercial Descarga de aguas residuales
Artículo 4. Los usuarios cubren las cuotas dentro de los primeros diez días de cada bimestre.";

const PAGE_THREE: &str = "GOBIERNO DEL ESTADO
Artículo 5. El pago oportuno de las cuotas otorga a los usuarios un descuento sobre el
importe total del bimestre, siempre que no existan adeudos anteriores registrados.
TRANSITORIOS
Primero. La presente ley entra en vigor al día siguiente de su publicación oficial.
Segundo. Se derogan las disposiciones que se opongan al contenido de esta ley.";

struct FixedPages(Vec<String>);

impl TextStrategy for FixedPages {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn extract(&self, _path: &Path, _max_pages: Option<usize>) -> ExtractResult<Vec<String>> {
        Ok(self.0.clone())
    }
}

struct FailingText;

impl TextStrategy for FailingText {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn extract(&self, _path: &Path, _max_pages: Option<usize>) -> ExtractResult<Vec<String>> {
        Err(ExtractError::ToolUnavailable { tool: "pdftotext" })
    }
}

struct PanickingText;

impl TextStrategy for PanickingText {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn extract(&self, _path: &Path, _max_pages: Option<usize>) -> ExtractResult<Vec<String>> {
        panic!("flujo de contenido corrupto")
    }
}

struct FixedLayout(Vec<LayoutPage>);

impl LayoutSource for FixedLayout {
    fn layout(&self, _path: &Path, _max_pages: Option<usize>) -> ExtractResult<Vec<LayoutPage>> {
        Ok(self.0.clone())
    }
}

struct FixedGeometry(Vec<PageGeometry>);

impl GeometrySource for FixedGeometry {
    fn geometry(&self, _path: &Path, _max_pages: Option<usize>) -> ExtractResult<Vec<PageGeometry>> {
        Ok(self.0.clone())
    }
}

fn word(text: &str, x0: f64, top: f64) -> PositionedWord {
    PositionedWord {
        text: text.to_string(),
        bbox: BBox::new(x0, top, x0 + 6.0 * text.chars().count() as f64, top + 10.0),
    }
}

/// Words of one cell line, laid out left to right from `x0`.
fn cell_words(text: &str, x0: f64, top: f64) -> Vec<PositionedWord> {
    let mut x = x0;
    text.split_whitespace()
        .map(|token| {
            let placed = word(token, x, top);
            x = placed.bbox.x1 + 6.0;
            placed
        })
        .collect()
}

fn ruled_table_page() -> (LayoutPage, PageGeometry) {
    let rows = [
        ("Clave de tarifa", "Concepto del servicio"),
        ("Tarifa doméstica", "Suministro de agua potable"),
        ("Tarifa comercial", "Descarga de aguas residuales"),
    ];
    let mut words = Vec::new();
    for (index, (left, right)) in rows.iter().enumerate() {
        let top = 210.0 + 30.0 * index as f64;
        words.extend(cell_words(left, 110.0, top));
        words.extend(cell_words(right, 310.0, top));
    }

    let mut edges = [200.0, 230.0, 260.0, 290.0]
        .iter()
        .map(|y| Segment::horizontal(100.0, 500.0, *y))
        .collect::<Vec<Segment>>();
    edges.extend([100.0, 300.0, 500.0].iter().map(|x| Segment::vertical(*x, 200.0, 290.0)));

    (
        LayoutPage {
            width: 612.0,
            height: 792.0,
            words,
            block_chars: vec![80, 140],
        },
        PageGeometry {
            edges,
            image_count: 0,
        },
    )
}

fn plain_page() -> (LayoutPage, PageGeometry) {
    (
        LayoutPage {
            width: 612.0,
            height: 792.0,
            words: Vec::new(),
            block_chars: vec![320],
        },
        PageGeometry::default(),
    )
}

fn three_page_sources() -> PdfSources {
    let (layout_one, geometry_one) = plain_page();
    let (layout_two, geometry_two) = ruled_table_page();
    let (layout_three, geometry_three) = plain_page();

    PdfSources {
        text: vec![Box::new(FixedPages(
            [PAGE_ONE, PAGE_TWO, PAGE_THREE].iter().map(|page| page.to_string()).collect(),
        ))],
        layout: Some(Box::new(FixedLayout(vec![layout_one, layout_two, layout_three]))),
        geometry: Some(Box::new(FixedGeometry(vec![
            geometry_one,
            geometry_two,
            geometry_three,
        ]))),
        word: Box::new(SystemWordSource),
    }
}

fn unavailable_ocr() -> OcrSession {
    OcrSession::with_factory(
        OcrSettings::from_config(&OcrConfig::default(), None),
        Box::new(|_settings: &OcrSettings| Err(ExtractError::ToolUnavailable { tool: "tesseract" })),
    )
}

fn pdf_fixture(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"%PDF-1.7\n%fixture\n").expect("write pdf fixture");
    path
}

fn first_table(text: &str, key: &str) -> Value {
    let start = text
        .find(&format!("{{\"{key}\":"))
        .unwrap_or_else(|| panic!("{key} missing from {text}"));
    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()
        .expect("one json value")
        .expect("embedded table parses")
}

#[test]
fn three_page_law_is_reconstructed_end_to_end() {
    let pipeline = Pipeline::new(&PipelineConfig::default()).expect("default pipeline");
    let sources = three_page_sources();
    let mut ocr = unavailable_ocr();

    let document = pipeline
        .extract_pdf(Path::new("ley.pdf"), &sources, &mut ocr, OcrMode::Auto, None)
        .expect("digital extraction");
    assert!(!document.is_scanned);
    assert_eq!(document.pages.len(), 3);
    assert_eq!(document.pages[1].tables.len(), 1);
    assert!(!ocr.is_started());

    let (text, stats) = pipeline.reconstruct(&document);

    assert!(text.contains("conforme al reglamento que expida"), "{text}");
    assert!(!text.contains("GOBIERNO DEL ESTADO"), "{text}");
    assert_eq!(text.matches("tabla_").count(), 1, "{text}");
    assert_eq!(stats.tables_accepted, 1);
    assert_eq!(stats.tables_unlocated, 0);
    assert_eq!(stats.hyphen_joins, 1);

    let table = first_table(&text, "tabla_1");
    let body = &table["tabla_1"];
    assert_eq!(
        body["columnas"],
        serde_json::json!(["Clave de tarifa", "Concepto del servicio"])
    );
    let filas = body["filas"].as_array().expect("rows array");
    assert_eq!(filas.len(), 2);
    assert_eq!(filas[0]["columna_2"], "Suministro de agua potable");

    let article_three = text.find("Artículo 3.").expect("article 3");
    let table_start = text.find("{\"tabla_1\"").expect("table");
    let article_four = text.find("Artículo 4.").expect("article 4");
    assert!(article_three < table_start && table_start < article_four);
    assert!(!text.contains("Tarifa doméstica Suministro"));
}

#[test]
fn reconstruction_is_idempotent() {
    let pipeline = Pipeline::new(&PipelineConfig::default()).expect("default pipeline");
    let sources = three_page_sources();
    let temp = tempfile::tempdir().expect("tempdir");
    let path = pdf_fixture(temp.path(), "01_LEY_DE_AGUAS_DEL_ESTADO.pdf");

    let batch = Batch {
        pipeline: &pipeline,
        sources: &sources,
        reference: None,
        ocr_mode: OcrMode::Auto,
        max_pages: None,
    };
    let mut ocr = unavailable_ocr();
    let first = batch.process(&path, &mut ocr);
    let second = batch.process(&path, &mut ocr);

    assert_eq!(first.record.titulo, "Ley de Aguas del Estado");
    assert_eq!(first.record.error, None);
    assert_eq!(first.record, second.record);
    assert_eq!(
        serde_json::to_string(&first.record).expect("serialize"),
        serde_json::to_string(&second.record).expect("serialize")
    );
}

#[test]
fn record_fields_follow_the_published_order() {
    let mut config = PipelineConfig::default();
    config.metadata.enabled = true;
    config.metadata.jurisdiccion = Some("Estatal".to_string());
    let pipeline = Pipeline::new(&config).expect("pipeline");
    let sources = three_page_sources();
    let reference = ReferenceIndex::from_value(
        &serde_json::json!([
            {"TITULO": "LEY DE AGUAS DEL ESTADO", "contenido": "Texto compilado de referencia."},
            {"titulo": "Ley de Ingresos", "contenido": "Otro texto."}
        ]),
        &config.matching,
    )
    .expect("reference index");

    let temp = tempfile::tempdir().expect("tempdir");
    let path = pdf_fixture(temp.path(), "3_Ley_de_Aguas_del_Estado.pdf");
    let batch = Batch {
        pipeline: &pipeline,
        sources: &sources,
        reference: Some(&reference),
        ocr_mode: OcrMode::Off,
        max_pages: None,
    };
    let processed = batch.process(&path, &mut unavailable_ocr());

    let record = &processed.record;
    assert_eq!(
        record.contenido_referencia.as_deref(),
        Some("Texto compilado de referencia.")
    );
    let metadata = record.metadata.as_ref().expect("metadata enabled");
    assert!(metadata.tiene_tablas);
    assert!(!metadata.es_escaneado);
    assert_eq!(metadata.numero_paginas, 3);

    let json = serde_json::to_string(record).expect("serialize");
    let positions = ["\"Titulo\"", "\"contenido\"", "\"Contenido\"", "\"jurisdiccion\"", "\"texto_vigente\""]
        .iter()
        .map(|key| json.find(key).unwrap_or_else(|| panic!("{key} missing from {json}")))
        .collect::<Vec<usize>>();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "{json}");
    assert!(!json.contains("\"error\""));
    assert!(json.contains("doméstica"));
}

#[test]
fn failing_documents_still_produce_records() {
    let pipeline = Pipeline::new(&PipelineConfig::default()).expect("default pipeline");
    let temp = tempfile::tempdir().expect("tempdir");

    let failing = PdfSources {
        text: vec![Box::new(FailingText)],
        layout: None,
        geometry: None,
        word: Box::new(SystemWordSource),
    };
    let batch = Batch {
        pipeline: &pipeline,
        sources: &failing,
        reference: None,
        ocr_mode: OcrMode::Auto,
        max_pages: None,
    };
    let path = pdf_fixture(temp.path(), "02_Reglamento_Interior.pdf");
    let processed = batch.process(&path, &mut unavailable_ocr());
    assert_eq!(processed.record.titulo, "Reglamento Interior");
    assert!(processed.record.contenido.starts_with("Error al procesar: "));
    assert!(processed.record.error.as_deref().is_some_and(|error| error.contains("tesseract")));

    let panicking = PdfSources {
        text: vec![Box::new(PanickingText)],
        layout: None,
        geometry: None,
        word: Box::new(SystemWordSource),
    };
    let batch = Batch {
        sources: &panicking,
        ..batch
    };
    let processed = batch.process(&path, &mut unavailable_ocr());
    assert!(
        processed
            .record
            .error
            .as_deref()
            .is_some_and(|error| error.contains("flujo de contenido corrupto"))
    );

    let unknown = temp.path().join("04_Acuerdo.pdf");
    fs::write(&unknown, b"no es un pdf").expect("write");
    let processed = batch.process(&unknown, &mut unavailable_ocr());
    assert_eq!(processed.kind, DocumentKind::Unknown);
    assert!(processed.record.error.is_some());
}

#[test]
fn scanned_documents_switch_to_ocr() {
    struct SinglePage;

    impl OcrEngine for SinglePage {
        fn name(&self) -> &'static str {
            "single"
        }

        fn page_count(&self, _path: &Path) -> ExtractResult<usize> {
            Ok(1)
        }

        fn recognize_page(&self, _path: &Path, _page: usize) -> ExtractResult<OcrPage> {
            Ok(OcrPage {
                text: "Artículo 1. Texto reconocido de una página digitalizada.".to_string(),
                tables: Vec::new(),
            })
        }
    }

    let pipeline = Pipeline::new(&PipelineConfig::default()).expect("default pipeline");
    let sources = PdfSources {
        text: vec![Box::new(FixedPages(vec!["12".to_string()]))],
        layout: None,
        geometry: None,
        word: Box::new(SystemWordSource),
    };
    let mut ocr = OcrSession::with_factory(
        OcrSettings::from_config(&OcrConfig::default(), None),
        Box::new(|_settings: &OcrSettings| Ok(Box::new(SinglePage) as Box<dyn OcrEngine>)),
    );

    let document = pipeline
        .extract_pdf(Path::new("escaneo.pdf"), &sources, &mut ocr, OcrMode::Auto, None)
        .expect("ocr fallback");
    assert!(document.is_scanned);
    assert_eq!(document.backend, "ocr");
    assert_eq!(document.ocr_page_count, 1);

    let off = pipeline
        .extract_pdf(Path::new("escaneo.pdf"), &sources, &mut ocr, OcrMode::Off, None)
        .expect("text layer kept");
    assert!(off.is_scanned);
    assert_eq!(off.backend, "fixed");
    assert_eq!(ocr.pages_recognized(), 1);
}

#[test]
fn records_fall_back_to_numbered_names() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = OutputConfig::default();
    let record = DocumentRecord {
        titulo: "Ley: de Aguas?".to_string(),
        contenido: "Artículo 1.".to_string(),
        ..DocumentRecord::default()
    };

    let path = write_record(temp.path(), 0, &record, &config).expect("written");
    assert_eq!(path, temp.path().join("Ley de Aguas.json"));

    let unnamed = DocumentRecord {
        titulo: "???".to_string(),
        error: Some(NO_CONTENT.to_string()),
        ..DocumentRecord::default()
    };
    let path = write_record(temp.path(), 6, &unnamed, &config).expect("written");
    assert_eq!(path, temp.path().join("doc_0007_error.json"));

    let written = fs::read_to_string(&path).expect("read back");
    assert!(written.contains("\"Titulo\": \"???\""));
}

#[test]
fn error_records_keep_reference_and_default_metadata() {
    let mut config = PipelineConfig::default();
    config.metadata.enabled = true;
    config.metadata.jurisdiccion = Some("Estatal".to_string());
    let pipeline = Pipeline::new(&config).expect("pipeline");
    let reference = ReferenceIndex::from_value(
        &serde_json::json!([{"titulo": "Reglamento Interior", "contenido": "Texto de referencia."}]),
        &config.matching,
    )
    .expect("reference index");
    let failing = PdfSources {
        text: vec![Box::new(FailingText)],
        layout: None,
        geometry: None,
        word: Box::new(SystemWordSource),
    };
    let batch = Batch {
        pipeline: &pipeline,
        sources: &failing,
        reference: Some(&reference),
        ocr_mode: OcrMode::Off,
        max_pages: None,
    };

    let temp = tempfile::tempdir().expect("tempdir");
    let path = pdf_fixture(temp.path(), "02_Reglamento_Interior.pdf");
    let processed = batch.process(&path, &mut unavailable_ocr());

    let record = &processed.record;
    assert!(record.error.is_some());
    assert_eq!(record.contenido_referencia.as_deref(), Some("Texto de referencia."));
    let metadata = record.metadata.as_ref().expect("metadata enabled");
    assert_eq!(metadata.jurisdiccion.as_deref(), Some("Estatal"));
    assert!(!metadata.es_escaneado);
    assert!(!metadata.tiene_tablas);
    assert_eq!(metadata.numero_paginas, 0);
    assert_eq!(metadata.fecha_publicacion, None);
}

#[test]
fn an_unwritable_record_does_not_stop_the_batch() {
    let temp = tempfile::tempdir().expect("tempdir");
    let input_dir = temp.path().join("entrada");
    let output_dir = temp.path().join("salida");
    fs::create_dir_all(&input_dir).expect("input dir");
    fs::write(input_dir.join("01_Ley_de_Prueba.pdf"), b"no es un pdf").expect("write");
    fs::write(input_dir.join("02_Ley_de_Otra.pdf"), b"tampoco es un pdf").expect("write");

    // directories squat on both names the first record could take
    fs::create_dir_all(output_dir.join("Ley de Prueba.json")).expect("block preferred name");
    fs::create_dir_all(output_dir.join("doc_0001_error.json")).expect("block fallback name");

    let manifest_path = temp.path().join("manifest.json");
    run(ExtractArgs {
        input_dir,
        file: None,
        output_dir: output_dir.clone(),
        output_file: None,
        config: None,
        reference_json: None,
        manifest_path: Some(manifest_path.clone()),
        ocr_mode: OcrMode::Off,
        ocr_lang: None,
        max_pages: None,
        with_metadata: false,
    })
    .expect("batch completes");

    assert!(output_dir.join("Ley de Otra.json").is_file());

    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(&manifest_path).expect("manifest written"))
            .expect("manifest json");
    assert_eq!(manifest["counts"]["document_count"], 2);
    assert_eq!(manifest["counts"]["error_count"], 2);
    let first = &manifest["documents"][0];
    assert!(first["output_path"].is_null());
    assert!(
        first["error"]
            .as_str()
            .is_some_and(|error| error.starts_with("failed to write record"))
    );
    assert!(
        manifest["warnings"]
            .as_array()
            .is_some_and(|warnings| warnings.iter().any(|warning| warning
                .as_str()
                .is_some_and(|text| text.contains("failed to write record"))))
    );
}
