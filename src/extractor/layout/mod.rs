
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::models::ContentElement;

/// A positioned run of text on a page, as produced by a page converter.
/// Coordinates grow downward from the top of the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub x0: f32,
    pub top: f32,
    pub x1: f32,
    pub bottom: f32,
    pub font_size: f32,
    pub font_name: String,
}

/// A detected table: its bounding region plus extracted cell data.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRegion {
    pub x0: f32,
    pub top: f32,
    pub x1: f32,
    pub bottom: f32,
    pub rows: Vec<Vec<String>>,
}

/// One page of positioned content handed over by a converter.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub fragments: Vec<TextFragment>,
    pub tables: Vec<TableRegion>,
}

/// Content elements extracted from one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    pub page_no: i64,
    pub elements: Vec<ContentElement>,
}

/// Tunable extraction thresholds. The values are empirical, not physically
/// meaningful; they are expected to be revisited per document corpus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Band (in layout units) at the top and bottom of each page treated as
    /// header/footer and excluded from text extraction.
    pub header_footer_margin: f32,
    /// Vertical gap between the bottom of one fragment and the top of the
    /// next that starts a new paragraph.
    pub paragraph_gap: f32,
    /// Font size above which a paragraph is considered a heading.
    pub min_heading_font_size: f32,
}

impl Default for ExtractionConfig {
    #[inline]
    fn default() -> Self {
        Self {
            header_footer_margin: 50.0,
            paragraph_gap: 5.0,
            min_heading_font_size: 10.0,
        }
    }
}

/// Strategy seam for deciding whether a grouped paragraph is a heading.
pub trait HeadingClassifier: Send + Sync {
    fn is_heading(&self, paragraph: &str, fragments: &[TextFragment]) -> bool;
}

/// Default heuristic: oversized font, bold-looking font name, or an
/// all-uppercase paragraph.
#[derive(Debug, Clone, Copy)]
pub struct FontHeadingClassifier {
    pub min_font_size: f32,
}

impl HeadingClassifier for FontHeadingClassifier {
    #[inline]
    fn is_heading(&self, paragraph: &str, fragments: &[TextFragment]) -> bool {
        let oversized = fragments.iter().any(|f| f.font_size > self.min_font_size);
        let bold = fragments
            .iter()
            .any(|f| f.font_name.to_lowercase().contains("bold"));
        let uppercase = paragraph.chars().any(|c| c.is_alphabetic())
            && paragraph == paragraph.to_uppercase();

        oversized || bold || uppercase
    }
}

/// A paragraph located in the document, used for table-feature association.
#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    pub text: String,
    pub page: i64,
    pub position: f32,
    pub is_heading: bool,
}

/// Extracts ordered content elements from converter-produced page layouts.
pub struct LayoutExtractor {
    config: ExtractionConfig,
    classifier: Box<dyn HeadingClassifier>,
}

impl LayoutExtractor {
    #[inline]
    pub fn new(config: ExtractionConfig) -> Self {
        let classifier = FontHeadingClassifier {
            min_font_size: config.min_heading_font_size,
        };
        Self {
            config,
            classifier: Box::new(classifier),
        }
    }

    #[inline]
    pub fn with_classifier(
        config: ExtractionConfig,
        classifier: Box<dyn HeadingClassifier>,
    ) -> Self {
        Self { config, classifier }
    }

    /// Run the two-pass extraction over a sequence of page layouts.
    ///
    /// First pass collects every meaningful paragraph across all pages so
    /// that table-feature association can fall back to earlier and later
    /// pages. Second pass emits per-page elements: tables (with assigned
    /// features) first, then text, matching upload order downstream.
    #[inline]
    pub fn extract(&self, layouts: &[PageLayout]) -> Vec<PageContent> {
        let elements = self.collect_text_elements(layouts);
        debug!("Collected {} text elements across {} pages", elements.len(), layouts.len());

        let mut pages = Vec::new();
        for (idx, layout) in layouts.iter().enumerate() {
            let page_no = idx as i64 + 1;
            let mut page_elements = Vec::new();

            for table in &layout.tables {
                if table.rows.is_empty() {
                    continue;
                }
                let feature = find_feature_for_table(&elements, page_no, table.top);
                page_elements.push(ContentElement::Table {
                    content: table.rows.clone(),
                    feature,
                });
            }

            for element in elements.iter().filter(|e| e.page == page_no) {
                page_elements.push(ContentElement::Text {
                    content: element.text.clone(),
                    is_heading: element.is_heading,
                });
            }

            if !page_elements.is_empty() {
                pages.push(PageContent {
                    page_no,
                    elements: page_elements,
                });
            }
        }

        pages
    }

    /// First pass: group fragments into paragraphs, skipping header/footer
    /// bands and any text inside a table region.
    fn collect_text_elements(&self, layouts: &[PageLayout]) -> Vec<TextElement> {
        let mut elements = Vec::new();

        for (idx, layout) in layouts.iter().enumerate() {
            let page_no = idx as i64 + 1;
            let mut paragraph = String::new();
            let mut paragraph_fragments: Vec<TextFragment> = Vec::new();
            let mut prev_bottom = 0.0f32;

            for fragment in &layout.fragments {
                if self.in_header_footer(fragment, layout.height)
                    || inside_any_table(fragment, &layout.tables)
                {
                    continue;
                }

                let breaks = paragraph.is_empty()
                    || fragment.top - prev_bottom > self.config.paragraph_gap;

                if breaks {
                    self.flush_paragraph(
                        &mut elements,
                        &mut paragraph,
                        &mut paragraph_fragments,
                        page_no,
                        prev_bottom,
                    );
                    paragraph = fragment.text.clone();
                    paragraph_fragments = vec![fragment.clone()];
                } else {
                    paragraph.push(' ');
                    paragraph.push_str(&fragment.text);
                    paragraph_fragments.push(fragment.clone());
                }

                prev_bottom = fragment.bottom;
            }

            self.flush_paragraph(
                &mut elements,
                &mut paragraph,
                &mut paragraph_fragments,
                page_no,
                prev_bottom,
            );
        }

        elements
    }

    fn flush_paragraph(
        &self,
        elements: &mut Vec<TextElement>,
        paragraph: &mut String,
        fragments: &mut Vec<TextFragment>,
        page_no: i64,
        position: f32,
    ) {
        if !paragraph.is_empty() {
            let is_heading = self.classifier.is_heading(paragraph, fragments);
            // Headings are often shorter than the meaningful-text floor
            // ("VOLTAGE SETTINGS") but must survive to label tables.
            let keep =
                is_meaningful_text(paragraph) || (is_heading && paragraph.trim().len() >= 4);
            if keep {
                elements.push(TextElement {
                    text: std::mem::take(paragraph),
                    page: page_no,
                    position,
                    is_heading,
                });
            } else {
                paragraph.clear();
            }
        }
        fragments.clear();
    }

    fn in_header_footer(&self, fragment: &TextFragment, page_height: f32) -> bool {
        fragment.top < self.config.header_footer_margin
            || fragment.bottom > page_height - self.config.header_footer_margin
    }
}

fn inside_any_table(fragment: &TextFragment, tables: &[TableRegion]) -> bool {
    tables.iter().any(|t| {
        fragment.x0 >= t.x0 && fragment.top >= t.top && fragment.x1 <= t.x1 && fragment.bottom <= t.bottom
    })
}

/// Filter out page numbers, stray labels and other fragments too small to
/// serve as a feature.
#[inline]
pub fn is_meaningful_text(text: &str) -> bool {
    let text = text.trim();
    if text.len() < 10 {
        return false;
    }
    if text.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if text.split_whitespace().count() < 3 {
        return false;
    }
    !matches!(
        text.to_lowercase().as_str(),
        "table of contents" | "page" | "header" | "footer"
    )
}

fn cmp_position(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn cmp_page_position(a: &TextElement, b: &TextElement) -> Ordering {
    a.page.cmp(&b.page).then(cmp_position(a.position, b.position))
}

/// Assign a feature label to a table at (`table_page`, `table_top`).
///
/// The fallback order is deliberate and page-local first: tables are
/// usually captioned by the nearest heading on their own page:
/// 1. closest heading above the table on the same page
/// 2. closest text above the table on the same page
/// 3. first text anywhere on the same page
/// 4. latest text from any earlier page, by (page, position)
/// 5. earliest text from any later page, by (page, position)
/// 6. the literal "N/A"
#[inline]
pub fn find_feature_for_table(
    elements: &[TextElement],
    table_page: i64,
    table_top: f32,
) -> String {
    let same_page: Vec<&TextElement> =
        elements.iter().filter(|e| e.page == table_page).collect();

    if let Some(heading) = same_page
        .iter()
        .filter(|e| e.is_heading && e.position < table_top)
        .max_by(|a, b| cmp_position(a.position, b.position))
    {
        return heading.text.clone();
    }

    if let Some(text) = same_page
        .iter()
        .filter(|e| e.position < table_top)
        .max_by(|a, b| cmp_position(a.position, b.position))
    {
        return text.text.clone();
    }

    if let Some(first) = same_page.first() {
        return first.text.clone();
    }

    if let Some(latest) = elements
        .iter()
        .filter(|e| e.page < table_page)
        .max_by(|a, b| cmp_page_position(a, b))
    {
        return latest.text.clone();
    }

    if let Some(earliest) = elements
        .iter()
        .filter(|e| e.page > table_page)
        .min_by(|a, b| cmp_page_position(a, b))
    {
        return earliest.text.clone();
    }

    "N/A".to_string()
}
