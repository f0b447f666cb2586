#[cfg(test)]
mod tests;

use unicode_normalization::UnicodeNormalization;

use crate::database::models::ContentElement;

/// Clean extracted text for storage and retrieval.
///
/// Guarantees: NFKC-normalized, control characters stripped (newlines and
/// tabs survive as structure), runs of spaces/tabs collapsed to one space,
/// and three or more consecutive newlines collapsed to exactly two.
#[inline]
pub fn clean_text(text: &str) -> String {
    let normalized: String = text.nfkc().collect();

    let mut out = String::with_capacity(normalized.len());
    let mut pending_space = false;
    let mut newline_run = 0u32;

    for ch in normalized.chars() {
        match ch {
            '\r' => {}
            '\n' => {
                pending_space = false;
                newline_run += 1;
                if newline_run <= 2 {
                    out.push('\n');
                }
            }
            ' ' | '\t' => {
                pending_space = true;
            }
            c if c.is_control() => {}
            c => {
                if pending_space && !out.is_empty() && !out.ends_with('\n') {
                    out.push(' ');
                }
                pending_space = false;
                newline_run = 0;
                out.push(c);
            }
        }
    }

    out.trim_matches('\n').trim().to_string()
}

/// Render a table for the retrieval corpus.
///
/// The exact padding is not significant; what matters is that the same table
/// always renders to the same bytes, since this text feeds embedding inputs
/// and cache keys.
#[inline]
pub fn format_table(feature: &str, rows: &[Vec<String>]) -> String {
    let body = rows
        .iter()
        .map(|row| row.join("\t"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("Feature: {}\nTable:\n{}", feature, body)
}

/// Render a content element as retrieval-corpus text.
#[inline]
pub fn element_text(element: &ContentElement) -> String {
    match element {
        ContentElement::Text { content, .. } => content.clone(),
        ContentElement::Table { content, feature } => format_table(feature, content),
    }
}
