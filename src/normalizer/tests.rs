use super::*;

#[test]
fn collapses_whitespace_runs() {
    assert_eq!(clean_text("foo   bar\t\tbaz"), "foo bar baz");
}

#[test]
fn preserves_single_and_double_newlines() {
    assert_eq!(clean_text("line one\nline two"), "line one\nline two");
    assert_eq!(clean_text("para one\n\npara two"), "para one\n\npara two");
}

#[test]
fn collapses_newline_runs_to_two() {
    assert_eq!(clean_text("a\n\n\n\n\nb"), "a\n\nb");
}

#[test]
fn strips_control_characters() {
    assert_eq!(clean_text("he\u{0000}llo\u{0007} wor\u{001b}ld"), "hello world");
}

#[test]
fn strips_carriage_returns() {
    assert_eq!(clean_text("one\r\ntwo\r\nthree"), "one\ntwo\nthree");
}

#[test]
fn applies_compatibility_normalization() {
    // Ligature ﬁ decomposes to "fi" under NFKC
    assert_eq!(clean_text("con\u{FB01}guration"), "configuration");
    // Full-width characters fold to ASCII
    assert_eq!(clean_text("\u{FF28}\u{FF29}"), "HI");
}

#[test]
fn trims_surrounding_whitespace() {
    assert_eq!(clean_text("  \n padded text \n "), "padded text");
}

#[test]
fn clean_text_is_idempotent() {
    let messy = "  Voltage\u{0003}  settings\r\n\r\n\r\n\r\nnominal   400V  ";
    let once = clean_text(messy);
    assert_eq!(clean_text(&once), once);
}

#[test]
fn format_table_shape() {
    let rows = vec![
        vec!["Parameter".to_string(), "Value".to_string()],
        vec!["Nominal voltage".to_string(), "400V".to_string()],
    ];
    let rendered = format_table("VOLTAGE SETTINGS", &rows);
    assert_eq!(
        rendered,
        "Feature: VOLTAGE SETTINGS\nTable:\nParameter\tValue\nNominal voltage\t400V"
    );
}

#[test]
fn format_table_is_deterministic() {
    let rows = vec![
        vec!["a".to_string(), "b".to_string()],
        vec!["c".to_string()],
    ];
    assert_eq!(format_table("F", &rows), format_table("F", &rows));
}

#[test]
fn format_table_handles_ragged_rows() {
    let rows = vec![
        vec!["h1".to_string(), "h2".to_string(), "h3".to_string()],
        vec!["only one".to_string()],
    ];
    let rendered = format_table("N/A", &rows);
    assert!(rendered.ends_with("h1\th2\th3\nonly one"));
}

#[test]
fn element_text_for_text_and_table() {
    use crate::database::models::ContentElement;

    let text = ContentElement::Text {
        content: "plain body".to_string(),
        is_heading: false,
    };
    assert_eq!(element_text(&text), "plain body");

    let table = ContentElement::Table {
        content: vec![vec!["x".to_string(), "y".to_string()]],
        feature: "COORDS".to_string(),
    };
    assert_eq!(element_text(&table), "Feature: COORDS\nTable:\nx\ty");
}
