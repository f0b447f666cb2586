use super::*;
use tempfile::TempDir;

#[test]
fn unsupported_extension_is_validation_error() {
    let extractor = DocumentExtractor::new(ExtractionConfig::default());
    let err = extractor
        .extract(Path::new("manual.pptx"), None)
        .unwrap_err();
    assert!(matches!(err, QadocsError::Validation(_)));
}

#[test]
fn legacy_doc_is_rejected_with_guidance() {
    let extractor = DocumentExtractor::new(ExtractionConfig::default());
    let err = extractor.extract(Path::new("manual.doc"), None).unwrap_err();
    match err {
        QadocsError::Validation(message) => assert!(message.contains(".docx")),
        _ => unreachable!("expected a validation error"),
    }
}

#[test]
fn csv_becomes_single_page_table() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let csv_path = temp_dir.path().join("measurements.csv");
    std::fs::write(
        &csv_path,
        "device,nominal_voltage\nrelay,400\nbreaker,690\n",
    )
    .expect("should write csv");

    let extractor = DocumentExtractor::new(ExtractionConfig::default());
    let pages = extractor
        .extract(&csv_path, None)
        .expect("extraction should succeed");

    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].page_no, 1);
    assert_eq!(pages[0].original_filename, "measurements.csv");
    assert_eq!(pages[0].elements.len(), 1);

    match &pages[0].elements[0] {
        ContentElement::Table { content, feature } => {
            assert_eq!(content.len(), 3);
            assert_eq!(content[0], vec!["device", "nominal_voltage"]);
            assert_eq!(feature, "Data from measurements.csv showing 2 records");
        }
        ContentElement::Text { .. } => unreachable!("expected a table element"),
    }
}

#[test]
fn header_only_csv_omits_record_count() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let csv_path = temp_dir.path().join("empty.csv");
    std::fs::write(&csv_path, "device,voltage\n").expect("should write csv");

    let extractor = DocumentExtractor::new(ExtractionConfig::default());
    let pages = extractor
        .extract(&csv_path, None)
        .expect("extraction should succeed");

    match &pages[0].elements[0] {
        ContentElement::Table { feature, .. } => {
            assert_eq!(feature, "Data from empty.csv");
        }
        ContentElement::Text { .. } => unreachable!("expected a table element"),
    }
}

#[test]
fn case_insensitive_extension_dispatch() {
    let extractor = DocumentExtractor::new(ExtractionConfig::default());

    let temp_dir = TempDir::new().expect("should create temp dir");
    let csv_path = temp_dir.path().join("DATA.CSV");
    std::fs::write(&csv_path, "a,b\n1,2\n").expect("should write csv");

    let pages = extractor
        .extract(&csv_path, None)
        .expect("uppercase extension should dispatch");
    assert_eq!(pages.len(), 1);
}

#[test]
fn normalization_applied_to_extracted_text() {
    use crate::extractor::layout::PageContent;

    let page = PageContent {
        page_no: 1,
        elements: vec![
            ContentElement::Text {
                content: "messy   \u{0003}text   here".to_string(),
                is_heading: false,
            },
            ContentElement::Table {
                content: vec![vec!["  cell\u{0000}one  ".to_string()]],
                feature: "  FEATURE   NAME ".to_string(),
            },
        ],
    };

    let normalized = normalize_page(page, "file.pdf");
    assert_eq!(
        normalized.elements[0],
        ContentElement::Text {
            content: "messy text here".to_string(),
            is_heading: false,
        }
    );
    match &normalized.elements[1] {
        ContentElement::Table { content, feature } => {
            assert_eq!(content[0][0], "cellone");
            assert_eq!(feature, "FEATURE NAME");
        }
        ContentElement::Text { .. } => unreachable!("expected a table element"),
    }
}
