//! Digital PDF collaborators: poppler text strategies, positioned words and
//! `mutool trace` rule geometry.

use super::*;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

const FORM_FEED: char = '\u{000C}';

pub(crate) trait TextStrategy {
    fn name(&self) -> &'static str;
    fn extract(&self, path: &Path, max_pages: Option<usize>) -> ExtractResult<Vec<String>>;
}

pub(crate) trait LayoutSource {
    fn layout(&self, path: &Path, max_pages: Option<usize>) -> ExtractResult<Vec<LayoutPage>>;
}

pub(crate) trait GeometrySource {
    fn geometry(&self, path: &Path, max_pages: Option<usize>) -> ExtractResult<Vec<PageGeometry>>;
}

/// Collaborators used for one batch; `system()` wires the real command-line tools.
pub(crate) struct PdfSources {
    pub text: Vec<Box<dyn TextStrategy>>,
    pub layout: Option<Box<dyn LayoutSource>>,
    pub geometry: Option<Box<dyn GeometrySource>>,
    pub word: Box<dyn WordSource>,
}

impl PdfSources {
    pub(crate) fn system() -> Self {
        Self {
            text: vec![
                Box::new(Pdftotext::Raw),
                Box::new(Pdftotext::Layout),
                Box::new(Pdftotext::BboxLayout),
            ],
            layout: Some(Box::new(Pdftotext::BboxLayout)),
            geometry: Some(Box::new(MutoolTrace)),
            word: Box::new(SystemWordSource),
        }
    }
}

/// Runs a prepared command, mapping spawn and exit failures onto [`ExtractError`].
pub(crate) fn run_tool(tool: &'static str, command: &mut Command, path: &Path) -> ExtractResult<Vec<u8>> {
    let output = command.output().map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ExtractError::ToolUnavailable { tool }
        } else {
            ExtractError::io(path, source)
        }
    })?;

    if !output.status.success() {
        return Err(ExtractError::ToolFailed {
            tool,
            path: path.display().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

pub(crate) fn command_available(program: &str) -> bool {
    Command::new(program).arg("--version").output().is_ok()
}

pub(crate) fn command_version_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}

/// Splits form-feed separated output into pages, dropping trailing empty pages.
pub(crate) fn split_pages(raw: &str) -> Vec<String> {
    let mut pages = raw
        .split(FORM_FEED)
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect::<Vec<String>>();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }
    pages
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pdftotext {
    /// Content-stream order; the fastest and usually cleanest.
    Raw,
    /// Physical layout preserved with spaces.
    Layout,
    /// XHTML with block, line and word boxes.
    BboxLayout,
}

impl Pdftotext {
    fn run(self, path: &Path, max_pages: Option<usize>) -> ExtractResult<String> {
        let mut command = Command::new("pdftotext");
        command.arg("-enc").arg("UTF-8").arg("-f").arg("1");
        if let Some(max_pages) = max_pages {
            command.arg("-l").arg(max_pages.to_string());
        }
        match self {
            Self::Raw => command.arg("-raw"),
            Self::Layout => command.arg("-layout"),
            Self::BboxLayout => command.arg("-bbox-layout"),
        };
        command.arg(path).arg("-");

        let stdout = run_tool("pdftotext", &mut command, path)?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

impl TextStrategy for Pdftotext {
    fn name(&self) -> &'static str {
        match self {
            Self::Raw => "pdftotext-raw",
            Self::Layout => "pdftotext-layout",
            Self::BboxLayout => "pdftotext-bbox",
        }
    }

    fn extract(&self, path: &Path, max_pages: Option<usize>) -> ExtractResult<Vec<String>> {
        let raw = self.run(path, max_pages)?;
        match self {
            Self::BboxLayout => Ok(parse_bbox_layout(&raw)?
                .into_iter()
                .map(|page| page.text)
                .collect()),
            _ => Ok(split_pages(&raw)),
        }
    }
}

impl LayoutSource for Pdftotext {
    fn layout(&self, path: &Path, max_pages: Option<usize>) -> ExtractResult<Vec<LayoutPage>> {
        let raw = Self::BboxLayout.run(path, max_pages)?;
        Ok(parse_bbox_layout(&raw)?
            .into_iter()
            .map(|page| page.layout)
            .collect())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TextSelection {
    pub strategy: &'static str,
    pub pages: Vec<String>,
}

/// Tries each strategy in order: the first one over `min_accept_chars` wins,
/// otherwise the longest non-empty result.
pub(crate) fn select_text(
    strategies: &[Box<dyn TextStrategy>],
    path: &Path,
    max_pages: Option<usize>,
    min_accept_chars: usize,
) -> ExtractResult<TextSelection> {
    let mut best: Option<(usize, TextSelection)> = None;
    let mut last_error = None;

    for strategy in strategies {
        match strategy.extract(path, max_pages) {
            Ok(pages) => {
                let chars = pages
                    .iter()
                    .map(|page| non_whitespace_char_count(page))
                    .sum::<usize>();
                debug!(strategy = strategy.name(), chars, "text strategy finished");

                let selection = TextSelection {
                    strategy: strategy.name(),
                    pages,
                };
                if chars > min_accept_chars {
                    return Ok(selection);
                }
                if best.as_ref().is_none_or(|(best_chars, _)| chars > *best_chars) {
                    best = Some((chars, selection));
                }
            }
            Err(err) => {
                warn!(
                    strategy = strategy.name(),
                    path = %path.display(),
                    error = %err,
                    "text strategy failed; trying next"
                );
                last_error = Some(err);
            }
        }
    }

    match best {
        Some((chars, selection)) if chars > 0 => Ok(selection),
        _ => Err(last_error.unwrap_or(ExtractError::Empty("pdf text strategies"))),
    }
}

fn attr(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attribute| attribute.key.as_ref() == key)
        .map(|attribute| String::from_utf8_lossy(&attribute.value).into_owned())
}

fn attr_f64(element: &BytesStart<'_>, key: &[u8]) -> Option<f64> {
    attr(element, key).and_then(|value| value.trim().parse::<f64>().ok())
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BboxPage {
    pub layout: LayoutPage,
    pub text: String,
}

/// Parses `pdftotext -bbox-layout` XHTML into positioned words and plain page text.
pub(crate) fn parse_bbox_layout(xml: &str) -> ExtractResult<Vec<BboxPage>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut pages = Vec::new();
    let mut page: Option<BboxPage> = None;
    let mut lines: Vec<String> = Vec::new();
    let mut line_words: Vec<String> = Vec::new();
    let mut block_chars = 0;
    let mut word: Option<(BBox, String)> = None;

    loop {
        let event = reader.read_event().map_err(|err| ExtractError::Parse {
            what: "pdftotext bbox output",
            detail: format!("at byte {}: {err}", reader.buffer_position()),
        })?;

        match event {
            Event::Start(ref element) => match element.local_name().as_ref() {
                b"page" => {
                    page = Some(BboxPage {
                        layout: LayoutPage {
                            width: attr_f64(element, b"width").unwrap_or_default(),
                            height: attr_f64(element, b"height").unwrap_or_default(),
                            ..LayoutPage::default()
                        },
                        text: String::new(),
                    });
                    lines.clear();
                }
                b"block" => block_chars = 0,
                b"line" => line_words.clear(),
                b"word" => {
                    let bbox = BBox::new(
                        attr_f64(element, b"xMin").unwrap_or_default(),
                        attr_f64(element, b"yMin").unwrap_or_default(),
                        attr_f64(element, b"xMax").unwrap_or_default(),
                        attr_f64(element, b"yMax").unwrap_or_default(),
                    );
                    word = Some((bbox, String::new()));
                }
                _ => {}
            },
            Event::Text(ref text) => {
                if let Some((_, buffer)) = word.as_mut() {
                    let unescaped = text.unescape().map_err(|err| ExtractError::Parse {
                        what: "pdftotext bbox output",
                        detail: err.to_string(),
                    })?;
                    buffer.push_str(&unescaped);
                }
            }
            Event::End(ref element) => match element.local_name().as_ref() {
                b"word" => {
                    if let (Some((bbox, text)), Some(current)) = (word.take(), page.as_mut()) {
                        let text = text.trim().to_string();
                        if !text.is_empty() {
                            block_chars += text.chars().count();
                            line_words.push(text.clone());
                            current.layout.words.push(PositionedWord { text, bbox });
                        }
                    }
                }
                b"line" => {
                    if !line_words.is_empty() {
                        lines.push(line_words.join(" "));
                        line_words.clear();
                    }
                }
                b"block" => {
                    if let Some(current) = page.as_mut() {
                        current.layout.block_chars.push(block_chars);
                    }
                }
                b"page" => {
                    if let Some(mut finished) = page.take() {
                        finished.text = lines.join("\n");
                        pages.push(finished);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(pages)
}

/// `mutool trace` device output read as rule segments and image draws.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MutoolTrace;

impl GeometrySource for MutoolTrace {
    fn geometry(&self, path: &Path, max_pages: Option<usize>) -> ExtractResult<Vec<PageGeometry>> {
        let mut command = Command::new("mutool");
        command.arg("trace").arg(path);
        if let Some(max_pages) = max_pages {
            command.arg(format!("1-{max_pages}"));
        }
        let stdout = run_tool("mutool", &mut command, path)?;
        parse_trace(&String::from_utf8_lossy(&stdout))
    }
}

/// Affine matrix `a b c d e f` as printed by the trace device.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Transform([f64; 6]);

impl Transform {
    const IDENTITY: Transform = Transform([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn parse(raw: Option<String>) -> Self {
        let values = raw
            .map(|raw| {
                raw.split_whitespace()
                    .filter_map(|value| value.parse::<f64>().ok())
                    .collect::<Vec<f64>>()
            })
            .unwrap_or_default();
        match <[f64; 6]>::try_from(values) {
            Ok(matrix) => Transform(matrix),
            Err(_) => Self::IDENTITY,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }
}

#[derive(Debug, Default)]
struct PathBuilder {
    transform: Option<Transform>,
    start: Option<(f64, f64)>,
    cursor: Option<(f64, f64)>,
    edges: Vec<Segment>,
}

impl PathBuilder {
    fn point(&self, element: &BytesStart<'_>, x: &[u8], y: &[u8]) -> Option<(f64, f64)> {
        let transform = self.transform.unwrap_or(Transform::IDENTITY);
        Some(transform.apply(attr_f64(element, x)?, attr_f64(element, y)?))
    }

    fn line_to(&mut self, to: (f64, f64)) {
        if let Some(from) = self.cursor {
            if let Some(segment) = axis_segment(from, to) {
                self.edges.push(segment);
            }
        }
        self.cursor = Some(to);
    }

    fn handle(&mut self, element: &BytesStart<'_>) {
        match element.local_name().as_ref() {
            b"moveto" => {
                let point = self.point(element, b"x", b"y");
                self.start = point;
                self.cursor = point;
            }
            b"lineto" => {
                if let Some(point) = self.point(element, b"x", b"y") {
                    self.line_to(point);
                }
            }
            b"curveto" => {
                // curves are never table rules; only the end point moves the cursor
                self.cursor = self.point(element, b"x3", b"y3").or(self.cursor);
            }
            b"closepath" => {
                if let Some(start) = self.start {
                    self.line_to(start);
                }
            }
            b"rect" => {
                let corners = (
                    self.point(element, b"x1", b"y1"),
                    self.point(element, b"x2", b"y1"),
                    self.point(element, b"x2", b"y2"),
                    self.point(element, b"x1", b"y2"),
                );
                if let (Some(a), Some(b), Some(c), Some(d)) = corners {
                    for (from, to) in [(a, b), (b, c), (c, d), (d, a)] {
                        if let Some(segment) = axis_segment(from, to) {
                            self.edges.push(segment);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn axis_segment(from: (f64, f64), to: (f64, f64)) -> Option<Segment> {
    const AXIS_TOLERANCE: f64 = 1.0;
    let (x0, y0) = from;
    let (x1, y1) = to;
    if (y1 - y0).abs() <= AXIS_TOLERANCE && (x1 - x0).abs() > AXIS_TOLERANCE {
        Some(Segment::horizontal(x0, x1, (y0 + y1) / 2.0))
    } else if (x1 - x0).abs() <= AXIS_TOLERANCE && (y1 - y0).abs() > AXIS_TOLERANCE {
        Some(Segment::vertical((x0 + x1) / 2.0, y0, y1))
    } else {
        None
    }
}

pub(crate) fn parse_trace(xml: &str) -> ExtractResult<Vec<PageGeometry>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut pages = Vec::new();
    let mut page: Option<PageGeometry> = None;
    let mut path: Option<PathBuilder> = None;

    loop {
        let event = reader.read_event().map_err(|err| ExtractError::Parse {
            what: "mutool trace output",
            detail: format!("at byte {}: {err}", reader.buffer_position()),
        })?;

        match event {
            Event::Start(ref element) | Event::Empty(ref element) => {
                let name = element.local_name();
                match name.as_ref() {
                    b"page" => page = Some(PageGeometry::default()),
                    b"fill_path" | b"stroke_path" | b"clip_path" | b"clip_stroke_path" => {
                        path = Some(PathBuilder {
                            transform: Some(Transform::parse(attr(element, b"transform"))),
                            ..PathBuilder::default()
                        });
                    }
                    b"fill_image" | b"fill_image_mask" => {
                        if let Some(current) = page.as_mut() {
                            current.image_count += 1;
                        }
                    }
                    _ => {
                        if let Some(builder) = path.as_mut() {
                            builder.handle(element);
                        }
                    }
                }
            }
            Event::End(ref element) => match element.local_name().as_ref() {
                b"fill_path" | b"stroke_path" => {
                    if let (Some(builder), Some(current)) = (path.take(), page.as_mut()) {
                        current.edges.extend(builder.edges);
                    }
                }
                b"clip_path" | b"clip_stroke_path" => path = None,
                b"page" => {
                    if let Some(finished) = page.take() {
                        pages.push(finished);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedText {
        name: &'static str,
        result: fn() -> ExtractResult<Vec<String>>,
    }

    impl TextStrategy for FixedText {
        fn name(&self) -> &'static str {
            self.name
        }

        fn extract(&self, _path: &Path, _max_pages: Option<usize>) -> ExtractResult<Vec<String>> {
            (self.result)()
        }
    }

    fn strategy(name: &'static str, result: fn() -> ExtractResult<Vec<String>>) -> Box<dyn TextStrategy> {
        Box::new(FixedText { name, result })
    }

    #[test]
    fn first_strategy_over_the_threshold_wins() {
        let strategies = vec![
            strategy("broken", || Err(ExtractError::ToolUnavailable { tool: "pdftotext" })),
            strategy("short", || Ok(vec!["Ley".to_string()])),
            strategy("long", || Ok(vec!["Artículo 1. Texto completo del artículo.".to_string()])),
            strategy("never", || Ok(vec!["x".repeat(500)])),
        ];
        let selection = select_text(&strategies, Path::new("doc.pdf"), None, 20).expect("text");
        assert_eq!(selection.strategy, "long");
    }

    #[test]
    fn longest_result_is_kept_when_none_is_accepted() {
        let strategies = vec![
            strategy("short", || Ok(vec!["Ley".to_string()])),
            strategy("longer", || Ok(vec!["Ley de".to_string(), "Aguas".to_string()])),
            strategy("broken", || Err(ExtractError::Empty("fake"))),
        ];
        let selection = select_text(&strategies, Path::new("doc.pdf"), None, 100).expect("text");
        assert_eq!(selection.strategy, "longer");
        assert_eq!(selection.pages.len(), 2);
    }

    #[test]
    fn all_empty_strategies_fail_with_the_last_error() {
        let strategies = vec![
            strategy("blank", || Ok(vec!["   ".to_string()])),
            strategy("broken", || {
                Err(ExtractError::ToolFailed {
                    tool: "pdftotext",
                    path: "doc.pdf".to_string(),
                    stderr: "Syntax Error".to_string(),
                })
            }),
        ];
        let error = select_text(&strategies, Path::new("doc.pdf"), None, 100).expect_err("no text");
        assert!(matches!(error, ExtractError::ToolFailed { .. }));
    }

    #[test]
    fn form_feed_pages_drop_trailing_blank_pages() {
        let pages = split_pages("uno\u{000C}dos\u{0000}\u{000C}\n\u{000C}");
        assert_eq!(pages, vec!["uno".to_string(), "dos".to_string()]);
    }

    #[test]
    fn bbox_layout_yields_words_blocks_and_text() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title></title><meta name="Producer" content="poppler"/></head>
<body>
<doc>
  <page width="612.000000" height="792.000000">
    <flow>
      <block xMin="72" yMin="90" xMax="300" yMax="120">
        <line xMin="72" yMin="90" xMax="300" yMax="102">
          <word xMin="72.0" yMin="90.0" xMax="120.0" yMax="102.0">Artículo</word>
          <word xMin="124.0" yMin="90.0" xMax="130.0" yMax="102.0">1.</word>
        </line>
        <line xMin="72" yMin="104" xMax="300" yMax="116">
          <word xMin="72.0" yMin="104.0" xMax="150.0" yMax="116.0">Usos &amp; costumbres</word>
        </line>
      </block>
    </flow>
  </page>
  <page width="595.0" height="842.0">
  </page>
</doc>
</body>
</html>"#;

        let pages = parse_bbox_layout(xml).expect("bbox parses");
        assert_eq!(pages.len(), 2);

        let first = &pages[0];
        assert_eq!(first.layout.width, 612.0);
        assert_eq!(first.layout.words.len(), 3);
        assert_eq!(first.layout.words[2].text, "Usos & costumbres");
        assert_eq!(first.layout.words[1].bbox, BBox::new(124.0, 90.0, 130.0, 102.0));
        assert_eq!(first.layout.block_chars, vec![27]);
        assert_eq!(first.text, "Artículo 1.\nUsos & costumbres");

        assert_eq!(pages[1].layout.height, 842.0);
        assert!(pages[1].text.is_empty());
    }

    #[test]
    fn trace_paths_become_rules_in_top_down_space() {
        let xml = r#"<document filename="tabla.pdf">
<page number="1" mediabox="0 0 612 792">
<stroke_path linewidth="1" colorspace="DeviceGray" color="0" transform="1 0 0 -1 0 792">
<moveto x="72" y="692"/>
<lineto x="472" y="692"/>
<lineto x="472" y="602"/>
<lineto x="72" y="602"/>
<closepath/>
</stroke_path>
<fill_path winding="nonzero" colorspace="DeviceGray" color="0" transform="1 0 0 1 0 0">
<moveto x="10" y="10"/>
<curveto x1="20" y1="30" x2="40" y2="30" x3="50" y3="10"/>
</fill_path>
<clip_path winding="nonzero" transform="1 0 0 1 0 0">
<moveto x="0" y="0"/>
<lineto x="612" y="0"/>
</clip_path>
<fill_image alpha="1" transform="100 0 0 100 0 0"/>
</page>
<page number="2" mediabox="0 0 612 792">
</page>
</document>"#;

        let pages = parse_trace(xml).expect("trace parses");
        assert_eq!(pages.len(), 2);

        let first = &pages[0];
        assert_eq!(first.image_count, 1);
        assert_eq!(first.edges.len(), 4);
        assert!(first.edges.contains(&Segment::horizontal(72.0, 472.0, 100.0)));
        assert!(first.edges.contains(&Segment::horizontal(72.0, 472.0, 190.0)));
        assert!(first.edges.contains(&Segment::vertical(472.0, 100.0, 190.0)));
        assert!(first.edges.contains(&Segment::vertical(72.0, 100.0, 190.0)));

        assert!(pages[1].edges.is_empty());
    }
}
