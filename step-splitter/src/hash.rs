//! Geometry fingerprinting: a renumbering-invariant, precision-tolerant
//! structural hash of a body's geometric sub-graph, used to detect
//! duplicate bodies.

use crate::step::Graph;

const WHITELIST: &[&str] = &[
    "CARTESIAN_POINT",
    "DIRECTION",
    "VECTOR",
    "LINE",
    "CIRCLE",
    "ELLIPSE",
    "B_SPLINE_CURVE",
    "B_SPLINE_SURFACE",
    "PLANE",
    "CYLINDRICAL_SURFACE",
    "CONICAL_SURFACE",
    "SPHERICAL_SURFACE",
    "TOROIDAL_SURFACE",
    "AXIS2_PLACEMENT_3D",
    "AXIS1_PLACEMENT",
    "VERTEX_POINT",
    "EDGE_CURVE",
    "ORIENTED_EDGE",
    "EDGE_LOOP",
    "FACE_OUTER_BOUND",
    "FACE_BOUND",
    "ADVANCED_FACE",
    "CLOSED_SHELL",
    "OPEN_SHELL",
    "MANIFOLD_SOLID_BREP",
];

/// Computes a 128-bit hex structural fingerprint for the body at `body`.
///
/// Reference numbers are stripped (renumbering-invariance) and numeric
/// literals are rounded to 6 significant digits (representation-drift
/// tolerance) before the normalised strings are sorted and hashed, so the
/// fingerprint depends only on the multiset of geometric primitives, not
/// on their original ids or traversal order.
pub fn fingerprint(graph: &Graph, body: u64) -> String {
    let mut normalised: Vec<String> = graph
        .reachable(body)
        .into_iter()
        .filter_map(|id| graph.lookup(id))
        .filter(|e| WHITELIST.contains(&e.type_name()))
        .map(|e| format!("{}({})", e.type_name(), normalise_payload(e.payload())))
        .collect();

    normalised.sort_unstable();
    let joined = normalised.join("\n");

    format!("{:x}", md5::compute(joined.as_bytes()))
}

/// Replaces every `#<digits>` reference with the literal `#REF` and
/// rounds every numeric literal to 6 significant digits.
fn normalise_payload(payload: &str) -> String {
    let stripped = strip_references(payload);
    round_numbers(&stripped)
}

fn strip_references(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());
    let mut chars = payload.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if c == '\'' {
            in_string = !in_string;
            out.push(c);
            continue;
        }
        if !in_string && c == '#' {
            out.push('#');
            out.push_str("REF");
            while matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
                chars.next();
            }
            continue;
        }
        out.push(c);
    }

    out
}

/// Scans `text` for numeric literals (`[+-]?digits[.digits]?([eE][+-]?digits)?`)
/// outside quoted strings and rewrites each to 6 significant digits.
fn round_numbers(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut in_string = false;

    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            in_string = !in_string;
            out.push(c);
            i += 1;
            continue;
        }

        if in_string {
            out.push(c);
            i += 1;
            continue;
        }

        if is_number_start(&chars, i) {
            let (literal, next) = scan_number(&chars, i);
            out.push_str(&format_significant(literal));
            i = next;
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

fn is_number_start(chars: &[char], i: usize) -> bool {
    let c = chars[i];
    if c.is_ascii_digit() {
        return true;
    }
    if (c == '+' || c == '-') && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) {
        let prev_is_digit_boundary = i == 0
            || !matches!(
                chars[i - 1],
                c if c.is_ascii_alphanumeric() || c == '_' || c == '.'
            );
        return prev_is_digit_boundary;
    }
    false
}

fn scan_number(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    let mut s = String::new();

    if chars[i] == '+' || chars[i] == '-' {
        s.push(chars[i]);
        i += 1;
    }
    while i < chars.len() && chars[i].is_ascii_digit() {
        s.push(chars[i]);
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        s.push('.');
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            s.push(chars[i]);
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        let mut exp = String::new();
        exp.push(chars[i]);
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            exp.push(chars[j]);
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            while j < chars.len() && chars[j].is_ascii_digit() {
                exp.push(chars[j]);
                j += 1;
            }
            s.push_str(&exp);
            i = j;
        }
    }

    (s, i)
}

/// Formats `literal` to 6 significant digits, matching the source's
/// `%.6g`-style rounding. Exact canonical form (scientific threshold,
/// exponent padding) need only be internally consistent, not match any
/// other implementation.
fn format_significant(literal: String) -> String {
    let Ok(value) = literal.parse::<f64>() else {
        return literal;
    };
    if value == 0.0 {
        return "0.".to_string();
    }

    let sci = format!("{:.5e}", value);
    let Some((mantissa_str, exp_str)) = sci.split_once('e') else {
        return literal;
    };
    let Ok(exp) = exp_str.parse::<i32>() else {
        return literal;
    };
    let Ok(mantissa) = mantissa_str.parse::<f64>() else {
        return literal;
    };

    if (-4..6).contains(&exp) {
        let decimals = (5 - exp).max(0) as usize;
        let rounded = mantissa * 10f64.powi(exp);
        trim_trailing_zeros(&format!("{:.*}", decimals, rounded))
    } else {
        let mantissa = trim_trailing_zeros(mantissa_str);
        format!("{mantissa}e{}{:02}", if exp < 0 { "-" } else { "+" }, exp.abs())
    }
}

fn trim_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::step::StepParser;

    #[test]
    fn identical_bodies_produce_identical_fingerprints() {
        let text = "DATA;
#1=MANIFOLD_SOLID_BREP('a',#2);
#2=CLOSED_SHELL('',(#3));
#3=CARTESIAN_POINT('',(1.,2.,3.));
#10=MANIFOLD_SOLID_BREP('b',#11);
#11=CLOSED_SHELL('',(#12));
#12=CARTESIAN_POINT('',(1.,2.,3.));
ENDSEC;
";
        let graph = StepParser::parse_str(text).unwrap();
        assert_eq!(fingerprint(&graph, 1), fingerprint(&graph, 10));
    }

    #[test]
    fn different_geometry_produces_different_fingerprints() {
        let text = "DATA;
#1=MANIFOLD_SOLID_BREP('a',#2);
#2=CLOSED_SHELL('',(#3));
#3=CARTESIAN_POINT('',(1.,2.,3.));
#10=MANIFOLD_SOLID_BREP('b',#11);
#11=CLOSED_SHELL('',(#12));
#12=CARTESIAN_POINT('',(9.,9.,9.));
ENDSEC;
";
        let graph = StepParser::parse_str(text).unwrap();
        assert_ne!(fingerprint(&graph, 1), fingerprint(&graph, 10));
    }

    #[test]
    fn fingerprint_is_stable_across_different_ids() {
        let text = "DATA;
#1=MANIFOLD_SOLID_BREP('a',#2);
#2=CLOSED_SHELL('',(#3));
#3=CARTESIAN_POINT('',(1.,2.,3.));
#100=MANIFOLD_SOLID_BREP('b',#200);
#200=CLOSED_SHELL('',(#300));
#300=CARTESIAN_POINT('',(1.,2.,3.));
ENDSEC;
";
        let graph = StepParser::parse_str(text).unwrap();
        assert_eq!(fingerprint(&graph, 1), fingerprint(&graph, 100));
    }

    #[test]
    fn normalise_payload_strips_references_and_rounds_numbers() {
        let normalised = normalise_payload("'',#12,(1.23456789,2.0)");
        assert_eq!(normalised, "'',#REF,(1.23457,2.)");
    }

    #[test]
    fn round_numbers_tolerates_representation_noise() {
        assert_eq!(round_numbers("0.10000000000000001"), "0.1");
    }

    #[test]
    fn round_numbers_handles_scientific_notation() {
        assert_eq!(round_numbers("1.234567E-07"), "1.23457e-07");
    }
}
