use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::step::{Entity, Graph};

/// Reads and tokenises a STEP physical file into an entity [`Graph`].
///
/// Only the `DATA;...ENDSEC;` section is parsed; the `HEADER;` section is
/// located but otherwise ignored, since splitting never needs to inspect
/// or preserve the source header.
pub struct StepParser;

impl StepParser {
    /// Reads `path` from disk and parses it.
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Graph> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            Error::InputRead(Arc::new(e), path.display().to_string())
        })?;
        let text = String::from_utf8_lossy(&bytes);
        Self::parse_str(&text)
    }

    /// Parses an in-memory STEP document.
    pub fn parse_str(text: &str) -> Result<Graph> {
        let data_section = find_section(text, "DATA;", "ENDSEC;")
            .ok_or_else(|| Error::MalformedStepFile("DATA section not found".into()))?;

        let mut graph = Graph::new();
        let mut malformed = 0usize;

        for record in split_records(data_section) {
            match parse_record(record) {
                Some(entity) => graph.insert(entity),
                None => {
                    malformed += 1;
                    warn!("skipping malformed STEP record: {record:?}");
                }
            }
        }

        debug!(
            "parsed {} entities ({} malformed records skipped)",
            graph.len(),
            malformed
        );

        Ok(graph)
    }
}

/// Finds the text strictly between the first `start` marker and the
/// following `end` marker, both exclusive. STEP is line-oriented but the
/// markers themselves may be surrounded by arbitrary whitespace, so this
/// operates on the raw text rather than a line iterator.
fn find_section<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let start_idx = text.find(start)? + start.len();
    let rest = &text[start_idx..];
    let end_idx = rest.find(end)?;
    Some(&rest[..end_idx])
}

/// Splits a DATA section into whole entity records. A record begins on a
/// line whose first non-blank character is `#`, and continues across
/// lines until the running parenthesis depth returns to zero (or below)
/// on a line that also contains a `;`. Lines are joined with a single
/// space.
fn split_records(data: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut depth: i64 = 0;
    let mut in_record = false;

    for line in data.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if !in_record {
            if !trimmed.starts_with('#') {
                continue;
            }
            in_record = true;
            depth = 0;
        } else {
            current.push(' ');
        }

        current.push_str(trimmed);
        depth += paren_delta(trimmed);

        if depth <= 0 && trimmed.contains(';') {
            records.push(std::mem::take(&mut current));
            in_record = false;
        }
    }

    if in_record {
        trace!("dropping unterminated trailing record: {current:?}");
    }

    records
}

/// Net change in parenthesis depth for a line. Quoted-string contents are
/// not given special treatment: conformant ISO-10303-21 text never embeds
/// unescaped parentheses inside a string, so raw counting is safe.
fn paren_delta(line: &str) -> i64 {
    let mut delta = 0i64;

    for ch in line.chars() {
        match ch {
            '(' => delta += 1,
            ')' => delta -= 1,
            _ => {}
        }
    }

    delta
}

/// Parses one whole record of the form `#<id>=<TYPE>(<payload>);` (simple)
/// or `#<id>=(<payload>);` (complex). Returns `None` if the record does
/// not match this shape.
fn parse_record(record: &str) -> Option<Entity> {
    let record = record.trim().trim_end_matches(';').trim();

    let rest = record.strip_prefix('#')?;
    let (id_str, rest) = rest.split_once('=')?;
    let id: u64 = id_str.trim().parse().ok()?;
    let rest = rest.trim();

    let open = rest.find('(')?;
    if !rest.ends_with(')') {
        return None;
    }
    let type_name = rest[..open].trim();
    let payload = &rest[open + 1..rest.len() - 1];

    let type_name = if type_name.is_empty() {
        first_identifier(payload).unwrap_or_else(|| "COMPLEX".to_string())
    } else {
        type_name.to_uppercase()
    };

    let source = format!("{};", record);
    Some(Entity::new(id, type_name, payload.to_string(), source))
}

/// The first uppercase-led identifier token in a complex record's
/// payload, used as a type-name stand-in since complex records wrap
/// several simple records without one overall type.
fn first_identifier(payload: &str) -> Option<String> {
    let mut chars = payload.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c.is_ascii_uppercase() {
            let start = i;
            let mut end = i + c.len_utf8();
            while let Some(&(j, c2)) = chars.peek() {
                if c2.is_ascii_alphanumeric() || c2 == '_' {
                    end = j + c2.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            return Some(payload[start..end].to_string());
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    const SIMPLE_FILE: &str = "ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION((''),'2;1');\nENDSEC;\nDATA;\n#1=CARTESIAN_POINT('',(0.,0.,0.));\n#2=DIRECTION('',(0.,0.,1.));\nENDSEC;\nEND-ISO-10303-21;\n";

    #[test]
    fn parses_simple_records() {
        let graph = StepParser::parse_str(SIMPLE_FILE).unwrap();
        assert_eq!(graph.len(), 2);
        let e1 = graph.lookup(1).unwrap();
        assert_eq!(e1.type_name(), "CARTESIAN_POINT");
        assert_eq!(e1.payload(), "'',(0.,0.,0.)");
    }

    #[test]
    fn missing_data_section_is_fatal() {
        let err = StepParser::parse_str("ISO-10303-21;\nHEADER;\nENDSEC;\nEND-ISO-10303-21;\n");
        assert!(matches!(err, Err(Error::MalformedStepFile(_))));
    }

    #[test]
    fn parses_record_spanning_multiple_lines() {
        let text = "DATA;\n#1=FOO('a',\n#2,\n#3);\nENDSEC;\n";
        let graph = StepParser::parse_str(text).unwrap();
        let entity = graph.lookup(1).unwrap();
        assert_eq!(entity.out_refs(), &[2, 3]);
    }

    #[test]
    fn parses_complex_record_type_from_first_identifier() {
        let text = "DATA;\n#1=(REPRESENTATION_ITEM('')SOLID_MODEL());\nENDSEC;\n";
        let graph = StepParser::parse_str(text).unwrap();
        assert_eq!(graph.lookup(1).unwrap().type_name(), "REPRESENTATION_ITEM");
    }

    #[test]
    fn skips_malformed_record_without_failing() {
        let text = "DATA;\n#1=CARTESIAN_POINT('',(0.,0.,0.));\n#not-a-record;\n#2=DIRECTION('',(0.,0.,1.));\nENDSEC;\n";
        let graph = StepParser::parse_str(text).unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn counts_balanced_parens_inside_quoted_strings_like_anywhere_else() {
        // Quoted-string contents get no special treatment (§4.1); this
        // still splits correctly because the parens inside the string
        // are themselves balanced.
        let text = "DATA;\n#1=FOO('has (parens) inside',#2);\nENDSEC;\n";
        let graph = StepParser::parse_str(text).unwrap();
        let entity = graph.lookup(1).unwrap();
        assert_eq!(entity.out_refs(), &[2]);
    }

    #[test]
    fn record_keeps_single_hash_and_terminating_semicolon_in_source() {
        let text = "DATA;\n#1=CARTESIAN_POINT('',(0.,0.,0.));\nENDSEC;\n";
        let graph = StepParser::parse_str(text).unwrap();
        let entity = graph.lookup(1).unwrap();
        assert_eq!(entity.source(), "#1=CARTESIAN_POINT('',(0.,0.,0.));");
    }
}
