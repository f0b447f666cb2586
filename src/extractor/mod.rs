#[cfg(test)]
mod tests;

pub mod convert;
pub mod layout;

use std::path::Path;

use tracing::{debug, info};

use crate::database::models::ContentElement;
use crate::normalizer::clean_text;
use crate::{QadocsError, Result};

use convert::{DocxConverter, PageConverter, PdfConverter, SpreadsheetReader};
use layout::{LayoutExtractor, PageContent};

pub use layout::{
    ExtractionConfig, FontHeadingClassifier, HeadingClassifier, PageLayout, TableRegion,
    TextFragment,
};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "xlsx", "xls", "csv"];

/// One extracted page, normalized and ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub page_no: i64,
    pub elements: Vec<ContentElement>,
    pub original_filename: String,
}

/// Extracts ordered content elements from supported document formats.
///
/// Paginated formats run through a [`PageConverter`] and the positional
/// layout algorithm; spreadsheet formats collapse to a single page holding
/// one table.
pub struct DocumentExtractor {
    layout: LayoutExtractor,
    pdf: PdfConverter,
    docx: DocxConverter,
    spreadsheet: SpreadsheetReader,
}

impl DocumentExtractor {
    #[inline]
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            layout: LayoutExtractor::new(config),
            pdf: PdfConverter,
            docx: DocxConverter,
            spreadsheet: SpreadsheetReader,
        }
    }

    /// Extract every page of a file into normalized content elements.
    ///
    /// Unsupported extensions are a validation error surfaced to the caller,
    /// never silently skipped.
    #[inline]
    pub fn extract(&self, path: &Path, max_pages: Option<usize>) -> Result<Vec<ExtractedPage>> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        info!("Extracting {} ({})", filename, extension);

        let pages = match extension.as_str() {
            "pdf" => self.extract_paginated(&self.pdf, path, max_pages, &filename)?,
            "docx" => self.extract_paginated(&self.docx, path, max_pages, &filename)?,
            "doc" => {
                return Err(QadocsError::Validation(
                    "Legacy .doc files are not supported; convert to .docx first".to_string(),
                ));
            }
            "xlsx" | "xls" | "csv" => self.extract_spreadsheet(path, &filename)?,
            other => {
                return Err(QadocsError::Validation(format!(
                    "Unsupported file type: .{} (supported: {})",
                    other,
                    SUPPORTED_EXTENSIONS.join(", ")
                )));
            }
        };

        debug!("Extracted {} pages from {}", pages.len(), filename);
        Ok(pages)
    }

    fn extract_paginated(
        &self,
        converter: &dyn PageConverter,
        path: &Path,
        max_pages: Option<usize>,
        filename: &str,
    ) -> Result<Vec<ExtractedPage>> {
        let layouts = converter.convert(path, max_pages)?;
        let pages = self.layout.extract(&layouts);

        Ok(pages
            .into_iter()
            .map(|page| normalize_page(page, filename))
            .filter(|page| !page.elements.is_empty())
            .collect())
    }

    fn extract_spreadsheet(&self, path: &Path, filename: &str) -> Result<Vec<ExtractedPage>> {
        let rows = self.spreadsheet.read_table(path)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let record_count = rows.len() - 1;
        let mut feature = format!("Data from {}", filename);
        if record_count > 0 {
            feature.push_str(&format!(" showing {} records", record_count));
        }

        let content: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|cell| clean_text(&cell)).collect())
            .collect();

        Ok(vec![ExtractedPage {
            page_no: 1,
            elements: vec![ContentElement::Table { content, feature }],
            original_filename: filename.to_string(),
        }])
    }
}

fn normalize_page(page: PageContent, filename: &str) -> ExtractedPage {
    let elements = page
        .elements
        .into_iter()
        .filter_map(|element| match element {
            ContentElement::Text {
                content,
                is_heading,
            } => {
                let cleaned = clean_text(&content);
                (!cleaned.is_empty()).then_some(ContentElement::Text {
                    content: cleaned,
                    is_heading,
                })
            }
            ContentElement::Table { content, feature } => Some(ContentElement::Table {
                content: content
                    .into_iter()
                    .map(|row| row.into_iter().map(|cell| clean_text(&cell)).collect())
                    .collect(),
                feature: clean_text(&feature),
            }),
        })
        .collect();

    ExtractedPage {
        page_no: page.page_no,
        elements,
        original_filename: filename.to_string(),
    }
}
