//! Marker-delimited template document codec.
//!
//! A template document is one string subdivided by uppercase markers of the
//! form `___NAME___` (e.g. `___SANDBOXED_JS_FOR_WEB_TEMPLATE___`,
//! `___TEMPLATE_PARAMETERS___`, `___INFO___`). Each section's content runs
//! from the end of its marker to the start of the next marker, or to the end
//! of the document. Markers are order-preserving: rebuilding never re-sorts.

use tracing::warn;

/// One named section of a template document. `name` is the bare marker name
/// without the `___` fences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub content: String,
}

struct MarkerSpan {
    name: String,
    start: usize,
    end: usize,
}

fn is_marker_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('_')
        && !name.ends_with('_')
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Scan for `___NAME___` tokens in document order.
fn scan_markers(document: &str) -> Vec<MarkerSpan> {
    let mut spans = Vec::new();
    let mut at = 0;
    while let Some(rel) = document[at..].find("___") {
        let start = at + rel;
        let name_start = start + 3;
        let Some(close_rel) = document[name_start..].find("___") else {
            break;
        };
        let name = &document[name_start..name_start + close_rel];
        if is_marker_name(name) {
            let end = name_start + close_rel + 3;
            spans.push(MarkerSpan {
                name: name.to_string(),
                start,
                end,
            });
            at = end;
        } else {
            at = start + 3;
        }
    }
    spans
}

/// Split a template document into its ordered sections.
///
/// A document with no markers yields no sections.
pub fn parse_sections(document: &str) -> Vec<Section> {
    let spans = scan_markers(document);
    spans
        .iter()
        .enumerate()
        .map(|(i, span)| {
            let content_end = spans.get(i + 1).map(|n| n.start).unwrap_or(document.len());
            Section {
                name: span.name.clone(),
                content: document[span.end..content_end].trim().to_string(),
            }
        })
        .collect()
}

/// Recombine sections into one document, in the order supplied.
pub fn rebuild_document(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| format!("___{}___\n{}\n", s.name, s.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the content of the section named `name` and rebuild.
///
/// A missing marker leaves the document unchanged; partially-formed templates
/// are tolerated rather than rejected, so the miss is logged instead of
/// raised.
pub fn replace_section(document: &str, name: &str, new_content: &str) -> String {
    let mut sections = parse_sections(document);
    let Some(section) = sections.iter_mut().find(|s| s.name == name) else {
        warn!(marker = name, "marker not present in template, document left unchanged");
        return document.to_string();
    };
    section.content = new_content.trim().to_string();
    rebuild_document(&sections)
}

/// File extension for a section, derived from its marker name: script
/// sections get the code extension, structured sections the data extension,
/// everything else plain text.
pub fn section_extension(name: &str) -> &'static str {
    if name.contains("JS") || name == "TESTS" {
        "js"
    } else if name.contains("PARAMETERS") || name.contains("PERMISSIONS") || name == "INFO" {
        "json"
    } else {
        "txt"
    }
}

/// Section file name as it appears in the virtual tree.
pub fn section_file_name(name: &str) -> String {
    format!("{}.{}", name, section_extension(name))
}
