//! Word documents: DOCX body read straight from the package XML, legacy
//! `.doc` through `antiword`.

use super::*;

use std::io::Read;

use quick_xml::Reader;
use quick_xml::events::Event;

const DOCUMENT_PART: &str = "word/document.xml";

/// Body content in document order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WordBlock {
    Paragraph(String),
    Table(Vec<Vec<Option<String>>>),
}

pub(crate) trait WordSource {
    fn docx(&self, path: &Path) -> ExtractResult<Vec<WordBlock>>;
    fn legacy_doc(&self, path: &Path) -> ExtractResult<String>;
}

pub(crate) struct SystemWordSource;

impl WordSource for SystemWordSource {
    fn docx(&self, path: &Path) -> ExtractResult<Vec<WordBlock>> {
        let file = fs::File::open(path).map_err(|source| ExtractError::io(path, source))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|err| ExtractError::Parse {
            what: "docx package",
            detail: err.to_string(),
        })?;
        let mut part = archive.by_name(DOCUMENT_PART).map_err(|err| ExtractError::Parse {
            what: "docx package",
            detail: format!("{DOCUMENT_PART}: {err}"),
        })?;

        let mut xml = String::new();
        part.read_to_string(&mut xml)
            .map_err(|source| ExtractError::io(path, source))?;
        parse_document_xml(&xml)
    }

    fn legacy_doc(&self, path: &Path) -> ExtractResult<String> {
        let stdout = run_tool(
            "antiword",
            Command::new("antiword").arg("-w").arg("0").arg(path),
            path,
        )?;
        let text = String::from_utf8_lossy(&stdout).into_owned();
        if text.trim().is_empty() {
            return Err(ExtractError::Empty("antiword"));
        }
        Ok(text)
    }
}

#[derive(Default)]
struct BodyState {
    blocks: Vec<WordBlock>,
    table_depth: usize,
    rows: Vec<Vec<Option<String>>>,
    row: Vec<Option<String>>,
    cell: Vec<String>,
    paragraph: String,
    in_text: bool,
}

impl BodyState {
    fn end_paragraph(&mut self) {
        let paragraph = std::mem::take(&mut self.paragraph);
        if self.table_depth == 0 {
            self.blocks.push(WordBlock::Paragraph(paragraph));
        } else {
            self.cell.push(paragraph);
        }
    }

    fn end_cell(&mut self) {
        let text = std::mem::take(&mut self.cell)
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect::<Vec<&str>>()
            .join("\n");
        self.row.push((!text.is_empty()).then_some(text));
    }
}

/// Walks `w:body`; cells of nested tables fold into the enclosing cell text.
pub(crate) fn parse_document_xml(xml: &str) -> ExtractResult<Vec<WordBlock>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut state = BodyState::default();

    loop {
        let event = reader.read_event().map_err(|err| ExtractError::Parse {
            what: DOCUMENT_PART,
            detail: format!("at byte {}: {err}", reader.buffer_position()),
        })?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => state.paragraph.clear(),
                b"t" => state.in_text = true,
                b"tbl" => {
                    state.table_depth += 1;
                    if state.table_depth == 1 {
                        state.rows.clear();
                    }
                }
                b"tr" if state.table_depth == 1 => state.row.clear(),
                b"tc" if state.table_depth == 1 => state.cell.clear(),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => state.paragraph.push('\t'),
                b"br" | b"cr" => state.paragraph.push('\n'),
                // Self-closing paragraphs are blank lines.
                b"p" => state.end_paragraph(),
                _ => {}
            },
            Event::Text(text) if state.in_text => {
                let value = text.unescape().map_err(|err| ExtractError::Parse {
                    what: DOCUMENT_PART,
                    detail: err.to_string(),
                })?;
                state.paragraph.push_str(&value);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => state.in_text = false,
                b"p" => state.end_paragraph(),
                b"tc" if state.table_depth == 1 => state.end_cell(),
                b"tr" if state.table_depth == 1 => {
                    let row = std::mem::take(&mut state.row);
                    if !row.is_empty() {
                        state.rows.push(row);
                    }
                }
                b"tbl" => {
                    state.table_depth = state.table_depth.saturating_sub(1);
                    if state.table_depth == 0 {
                        let rows = std::mem::take(&mut state.rows);
                        state.blocks.push(WordBlock::Table(rows));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(state.blocks)
}
