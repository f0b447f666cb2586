
use std::io::Read;
use std::path::Path;

use calamine::{Data, Range, Reader as CalamineReader, Xls, Xlsx};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::extractor::layout::{PageLayout, TableRegion, TextFragment};
use crate::{QadocsError, Result};

/// Opaque conversion boundary: given a file, produce positioned page
/// layouts. Implementations may fail with a conversion error; they never
/// interpret content beyond geometry.
pub trait PageConverter: Send + Sync {
    fn convert(&self, path: &Path, max_pages: Option<usize>) -> Result<Vec<PageLayout>>;
}

const LINE_HEIGHT: f32 = 14.0;
const TOP_OFFSET: f32 = 72.0;
const BOTTOM_OFFSET: f32 = 72.0;
const PAGE_WIDTH: f32 = 612.0;
const MIN_PAGE_HEIGHT: f32 = 792.0;
const TEXT_X0: f32 = 72.0;
const TEXT_X1: f32 = 540.0;
const TABLE_X0: f32 = 36.0;
const TABLE_X1: f32 = 576.0;

/// PDF converter backed by `pdf-extract`.
///
/// The library yields flat per-page text, so line positions are synthesized
/// from line order and table regions are recovered from runs of
/// column-separated lines. A layout-aware converter can replace this
/// implementation behind the same trait without touching the extraction
/// core.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfConverter;

impl PageConverter for PdfConverter {
    #[inline]
    fn convert(&self, path: &Path, max_pages: Option<usize>) -> Result<Vec<PageLayout>> {
        let bytes = std::fs::read(path)?;
        let mut pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .map_err(|e| QadocsError::Extraction(format!("PDF extraction failed: {}", e)))?;

        if let Some(limit) = max_pages {
            pages.truncate(limit);
        }

        debug!("Converted PDF {} into {} pages", path.display(), pages.len());
        Ok(pages.iter().map(|text| synthesize_page(text)).collect())
    }
}

/// Build a synthetic layout for one page of flat text. Each line becomes a
/// fragment; blank lines advance the cursor so the gap heuristic still sees
/// paragraph breaks; column-separated runs become table regions.
fn synthesize_page(text: &str) -> PageLayout {
    let lines: Vec<&str> = text.lines().collect();
    let height = MIN_PAGE_HEIGHT.max(TOP_OFFSET + lines.len() as f32 * LINE_HEIGHT + BOTTOM_OFFSET);

    let line_top = |idx: usize| TOP_OFFSET + idx as f32 * LINE_HEIGHT;
    let line_bottom = |idx: usize| line_top(idx) + LINE_HEIGHT - 2.0;

    let mut tables = Vec::new();
    let mut run_start: Option<usize> = None;
    for (idx, line) in lines.iter().enumerate() {
        if looks_like_table_row(line) {
            run_start.get_or_insert(idx);
        } else if let Some(start) = run_start.take() {
            if idx - start >= 2 {
                tables.push(table_region(&lines[start..idx], line_top(start), line_bottom(idx - 1)));
            }
        }
    }
    if let Some(start) = run_start {
        if lines.len() - start >= 2 {
            tables.push(table_region(
                &lines[start..],
                line_top(start),
                line_bottom(lines.len() - 1),
            ));
        }
    }

    let fragments = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| TextFragment {
            text: line.trim().to_string(),
            x0: TEXT_X0,
            top: line_top(idx),
            x1: TEXT_X1,
            bottom: line_bottom(idx),
            font_size: 10.0,
            font_name: String::new(),
        })
        .collect();

    PageLayout {
        width: PAGE_WIDTH,
        height,
        fragments,
        tables,
    }
}

fn table_region(lines: &[&str], top: f32, bottom: f32) -> TableRegion {
    TableRegion {
        x0: TABLE_X0,
        top,
        x1: TABLE_X1,
        bottom,
        rows: lines.iter().map(|line| split_table_row(line)).collect(),
    }
}

/// A line reads as a table row when column separators (tabs or 2+ spaces)
/// split it into three or more cells, or two tab-separated cells.
#[inline]
pub fn looks_like_table_row(line: &str) -> bool {
    let cells = split_table_row(line);
    cells.len() >= 3 || (cells.len() == 2 && line.contains('\t'))
}

/// Split a line into cells on tabs or runs of two or more spaces.
#[inline]
pub fn split_table_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut space_run = 0usize;

    for ch in line.trim().chars() {
        match ch {
            '\t' => {
                cells.push(current.trim().to_string());
                current.clear();
                space_run = 0;
            }
            ' ' => {
                space_run += 1;
                current.push(' ');
            }
            c => {
                if space_run >= 2 {
                    let cell = current.trim().to_string();
                    cells.push(cell);
                    current.clear();
                }
                space_run = 0;
                current.push(c);
            }
        }
    }
    if !current.trim().is_empty() {
        cells.push(current.trim().to_string());
    }

    cells.retain(|c| !c.is_empty());
    cells
}

/// One structural block parsed out of a DOCX body.
#[derive(Debug, Clone, PartialEq)]
enum DocxBlock {
    Paragraph {
        text: String,
        heading: bool,
        bold: bool,
    },
    Table {
        rows: Vec<Vec<String>>,
    },
}

/// DOCX converter: unzips `word/document.xml`, streams it with `quick-xml`,
/// and flows the resulting blocks onto fixed-capacity synthetic pages so the
/// paginated extraction path applies unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocxConverter;

const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
const DOCX_PAGE_CAPACITY: f32 = 600.0;
const BLOCK_GAP: f32 = 10.0;

impl PageConverter for DocxConverter {
    #[inline]
    fn convert(&self, path: &Path, max_pages: Option<usize>) -> Result<Vec<PageLayout>> {
        let bytes = std::fs::read(path)?;
        let document_xml = read_document_xml(&bytes)?;
        let blocks = parse_docx_blocks(&document_xml)?;
        let mut pages = flow_blocks_to_pages(&blocks);

        if let Some(limit) = max_pages {
            pages.truncate(limit);
        }

        debug!(
            "Converted DOCX {} into {} pages ({} blocks)",
            path.display(),
            pages.len(),
            blocks.len()
        );
        Ok(pages)
    }
}

fn read_document_xml(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| QadocsError::Extraction(format!("DOCX is not a valid archive: {}", e)))?;

    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| QadocsError::Extraction(format!("word/document.xml not found: {}", e)))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| QadocsError::Extraction(format!("Failed to read document.xml: {}", e)))?;

    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(QadocsError::Extraction(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    Ok(xml)
}

fn parse_docx_blocks(xml: &[u8]) -> Result<Vec<DocxBlock>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut blocks = Vec::new();
    let mut buf = Vec::new();

    let mut table_depth = 0u32;
    let mut table_rows: Vec<Vec<String>> = Vec::new();
    let mut row_cells: Vec<String> = Vec::new();
    let mut cell_text = String::new();

    let mut paragraph_text = String::new();
    let mut in_paragraph = false;
    let mut heading = false;
    let mut bold = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        table_rows.clear();
                    }
                }
                b"tr" if table_depth == 1 => row_cells.clear(),
                b"tc" if table_depth == 1 => cell_text.clear(),
                b"p" if table_depth == 0 => {
                    in_paragraph = true;
                    paragraph_text.clear();
                    heading = false;
                    bold = false;
                }
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"pStyle" if in_paragraph => {
                    if let Some(style) = attribute_value(&e, b"val") {
                        if style.starts_with("Heading") || style == "Title" {
                            heading = true;
                        }
                    }
                }
                b"b" if in_paragraph => bold = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| QadocsError::Extraction(format!("Invalid DOCX text: {}", e)))?;
                if table_depth > 0 {
                    if !cell_text.is_empty() {
                        cell_text.push(' ');
                    }
                    cell_text.push_str(&text);
                } else if in_paragraph {
                    if !paragraph_text.is_empty() {
                        paragraph_text.push(' ');
                    }
                    paragraph_text.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 && !table_rows.is_empty() {
                        blocks.push(DocxBlock::Table {
                            rows: std::mem::take(&mut table_rows),
                        });
                    }
                }
                b"tr" if table_depth == 1 => {
                    if !row_cells.is_empty() {
                        table_rows.push(std::mem::take(&mut row_cells));
                    }
                }
                b"tc" if table_depth == 1 => {
                    row_cells.push(cell_text.trim().to_string());
                }
                b"p" if table_depth == 0 => {
                    if in_paragraph && !paragraph_text.trim().is_empty() {
                        blocks.push(DocxBlock::Paragraph {
                            text: paragraph_text.trim().to_string(),
                            heading,
                            bold,
                        });
                    }
                    in_paragraph = false;
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(QadocsError::Extraction(format!(
                    "Failed to parse document.xml: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(blocks)
}

fn attribute_value(element: &quick_xml::events::BytesStart<'_>, name: &[u8]) -> Option<String> {
    element.attributes().find_map(|attr| {
        let attr = attr.ok()?;
        (attr.key.local_name().as_ref() == name)
            .then(|| String::from_utf8_lossy(&attr.value).into_owned())
    })
}

fn block_height(block: &DocxBlock) -> f32 {
    match block {
        DocxBlock::Paragraph { text, .. } => {
            let lines = (text.len() / 90 + 1) as f32;
            lines * LINE_HEIGHT
        }
        DocxBlock::Table { rows } => (rows.len() as f32 + 1.0) * LINE_HEIGHT,
    }
}

fn flow_blocks_to_pages(blocks: &[DocxBlock]) -> Vec<PageLayout> {
    let height = TOP_OFFSET + DOCX_PAGE_CAPACITY + BOTTOM_OFFSET;
    let mut pages = Vec::new();
    let mut current = PageLayout {
        width: PAGE_WIDTH,
        height,
        fragments: Vec::new(),
        tables: Vec::new(),
    };
    let mut cursor = TOP_OFFSET;

    for block in blocks {
        let block_h = block_height(block);
        let page_used = !current.fragments.is_empty() || !current.tables.is_empty();
        if page_used && cursor + block_h > TOP_OFFSET + DOCX_PAGE_CAPACITY {
            pages.push(std::mem::replace(
                &mut current,
                PageLayout {
                    width: PAGE_WIDTH,
                    height,
                    fragments: Vec::new(),
                    tables: Vec::new(),
                },
            ));
            cursor = TOP_OFFSET;
        }

        match block {
            DocxBlock::Paragraph { text, heading, bold } => {
                current.fragments.push(TextFragment {
                    text: text.clone(),
                    x0: TEXT_X0,
                    top: cursor,
                    x1: TEXT_X1,
                    bottom: cursor + block_h - 2.0,
                    font_size: if *heading { 14.0 } else { 10.0 },
                    font_name: if *bold {
                        "Calibri-Bold".to_string()
                    } else {
                        "Calibri".to_string()
                    },
                });
            }
            DocxBlock::Table { rows } => {
                current.tables.push(TableRegion {
                    x0: TABLE_X0,
                    top: cursor,
                    x1: TABLE_X1,
                    bottom: cursor + block_h,
                    rows: rows.clone(),
                });
            }
        }

        cursor += block_h + BLOCK_GAP;
    }

    if !current.fragments.is_empty() || !current.tables.is_empty() {
        pages.push(current);
    }

    pages
}

/// Reads whole spreadsheet files (xlsx, xls, csv) into a single
/// string-coerced table: header row followed by every data row.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetReader;

impl SpreadsheetReader {
    #[inline]
    pub fn read_table(&self, path: &Path) -> Result<Vec<Vec<String>>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => self.read_csv(path),
            "xlsx" => {
                let mut workbook: Xlsx<_> = calamine::open_workbook(path).map_err(|e| {
                    QadocsError::Extraction(format!("Failed to open XLSX: {}", e))
                })?;
                self.read_first_sheet(&mut workbook)
            }
            "xls" => {
                let mut workbook: Xls<_> = calamine::open_workbook(path).map_err(|e| {
                    QadocsError::Extraction(format!("Failed to open XLS: {}", e))
                })?;
                self.read_first_sheet(&mut workbook)
            }
            other => Err(QadocsError::Validation(format!(
                "Unsupported spreadsheet extension: {}",
                other
            ))),
        }
    }

    fn read_first_sheet<R>(&self, workbook: &mut R) -> Result<Vec<Vec<String>>>
    where
        R: CalamineReader<std::io::BufReader<std::fs::File>>,
        R::Error: std::fmt::Display,
    {
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| QadocsError::Extraction("Workbook has no sheets".to_string()))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| QadocsError::Extraction(format!("Failed to read sheet: {}", e)))?;

        Ok(range_to_rows(&range))
    }

    fn read_csv(&self, path: &Path) -> Result<Vec<Vec<String>>> {
        let content = std::fs::read_to_string(path)?;
        let rows = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_csv_row)
            .collect();
        Ok(rows)
    }
}

fn range_to_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    other => other.to_string().trim().to_string(),
                })
                .collect()
        })
        .filter(|row: &Vec<String>| row.iter().any(|cell| !cell.is_empty()))
        .collect()
}

/// Quote-aware CSV row parsing; handles embedded commas and doubled quotes.
#[inline]
pub fn parse_csv_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                cells.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    cells.push(current.trim().to_string());

    cells
}
