// src/address.rs
//
// Free-text address parsing into USPS-style components. Pure, no I/O, and
// never errors: unparseable input degrades to an all-None result with zero
// confidence.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::models::NormalizedAddress;

static STREET_SUFFIXES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("avenue", "Ave"),
        ("ave", "Ave"),
        ("boulevard", "Blvd"),
        ("blvd", "Blvd"),
        ("circle", "Cir"),
        ("cir", "Cir"),
        ("court", "Ct"),
        ("ct", "Ct"),
        ("drive", "Dr"),
        ("dr", "Dr"),
        ("highway", "Hwy"),
        ("hwy", "Hwy"),
        ("lane", "Ln"),
        ("ln", "Ln"),
        ("parkway", "Pkwy"),
        ("pkwy", "Pkwy"),
        ("place", "Pl"),
        ("pl", "Pl"),
        ("road", "Rd"),
        ("rd", "Rd"),
        ("street", "St"),
        ("st", "St"),
        ("terrace", "Ter"),
        ("ter", "Ter"),
        ("trail", "Trl"),
        ("trl", "Trl"),
        ("way", "Way"),
    ])
});

static DIRECTIONALS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("north", "N"),
        ("n", "N"),
        ("south", "S"),
        ("s", "S"),
        ("east", "E"),
        ("e", "E"),
        ("west", "W"),
        ("w", "W"),
        ("northeast", "NE"),
        ("ne", "NE"),
        ("northwest", "NW"),
        ("nw", "NW"),
        ("southeast", "SE"),
        ("se", "SE"),
        ("southwest", "SW"),
        ("sw", "SW"),
    ])
});

static UNIT_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("apartment", "Apt"),
        ("apt", "Apt"),
        ("suite", "Ste"),
        ("ste", "Ste"),
        ("unit", "Unit"),
        ("floor", "Fl"),
        ("fl", "Fl"),
        ("#", "Apt"),
    ])
});

static STATE_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("alabama", "AL"),
        ("alaska", "AK"),
        ("arizona", "AZ"),
        ("arkansas", "AR"),
        ("california", "CA"),
        ("colorado", "CO"),
        ("connecticut", "CT"),
        ("delaware", "DE"),
        ("florida", "FL"),
        ("georgia", "GA"),
        ("hawaii", "HI"),
        ("idaho", "ID"),
        ("illinois", "IL"),
        ("indiana", "IN"),
        ("iowa", "IA"),
        ("kansas", "KS"),
        ("kentucky", "KY"),
        ("louisiana", "LA"),
        ("maine", "ME"),
        ("maryland", "MD"),
        ("massachusetts", "MA"),
        ("michigan", "MI"),
        ("minnesota", "MN"),
        ("mississippi", "MS"),
        ("missouri", "MO"),
        ("montana", "MT"),
        ("nebraska", "NE"),
        ("nevada", "NV"),
        ("new hampshire", "NH"),
        ("new jersey", "NJ"),
        ("new mexico", "NM"),
        ("new york", "NY"),
        ("north carolina", "NC"),
        ("north dakota", "ND"),
        ("ohio", "OH"),
        ("oklahoma", "OK"),
        ("oregon", "OR"),
        ("pennsylvania", "PA"),
        ("rhode island", "RI"),
        ("south carolina", "SC"),
        ("south dakota", "SD"),
        ("tennessee", "TN"),
        ("texas", "TX"),
        ("utah", "UT"),
        ("vermont", "VT"),
        ("virginia", "VA"),
        ("washington", "WA"),
        ("west virginia", "WV"),
        ("wisconsin", "WI"),
        ("wyoming", "WY"),
    ])
});

static STATE_CODES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
        "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
        "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
        "VT", "VA", "WA", "WV", "WI", "WY",
    ])
});

static ZIP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{5})(?:-(\d{4}))?\s*$").expect("zip regex is valid"));

/// Normalize a free-form address string to USPS-style components.
///
/// Confidence is additive over the components that parsed: +0.2 street
/// number, +0.3 street name, +0.2 city, +0.2 state, +0.1 zip, capped at 1.0.
pub fn normalize(raw_address: &str) -> NormalizedAddress {
    let trimmed = raw_address.trim();
    if trimmed.is_empty() {
        return NormalizedAddress::default();
    }

    // Peel the zip (and optional +4) off the tail first.
    let mut working = trimmed.to_string();
    let mut zip_code: Option<String> = None;
    let mut zip4: Option<String> = None;
    if let Some(caps) = ZIP_RE.captures(&working) {
        zip_code = Some(caps[1].to_string());
        zip4 = caps.get(2).map(|m| m.as_str().to_string());
        let start = caps.get(0).map(|m| m.start()).unwrap_or(working.len());
        working.truncate(start);
    }

    let mut segments: Vec<Vec<String>> = working
        .split(',')
        .map(|seg| {
            seg.split_whitespace()
                .map(|t| t.trim_matches(|c| c == ',' || c == '.').to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|seg: &Vec<String>| !seg.is_empty())
        .collect();

    if segments.is_empty() {
        let confidence = if zip_code.is_some() { 0.1 } else { 0.0 };
        return NormalizedAddress {
            zip_code,
            zip4,
            confidence,
            ..Default::default()
        };
    }

    let state = take_trailing_state(&mut segments);

    // First segment is the street; the last remaining one is the city when
    // the address was comma-delimited.
    let street_tokens = segments.remove(0);
    let mut city: Option<String> = if !segments.is_empty() {
        let last = segments.pop().unwrap_or_default();
        Some(title_case_words(&last))
    } else {
        None
    };

    let mut parsed = parse_street_tokens(&street_tokens);

    // Intermediate comma segments may carry the unit ("Suite 200").
    for seg in &segments {
        if parsed.unit_type.is_none() {
            if let Some((ut, un)) = parse_unit_tokens(seg) {
                parsed.unit_type = Some(ut);
                parsed.unit_number = un;
            }
        }
    }

    // Comma-less input: tokens left over after the street parse are the city.
    if city.is_none() && !parsed.leftover.is_empty() {
        city = Some(title_case_words(&parsed.leftover));
    }

    let street_address = build_street_address(&parsed);
    let formatted_address =
        build_formatted_address(street_address.as_deref(), city.as_deref(), state.as_deref(), zip_code.as_deref());

    let mut confidence: f64 = 0.0;
    if parsed.street_number.is_some() {
        confidence += 0.2;
    }
    if parsed.street_name.is_some() {
        confidence += 0.3;
    }
    if city.is_some() {
        confidence += 0.2;
    }
    if state.is_some() {
        confidence += 0.2;
    }
    if zip_code.is_some() {
        confidence += 0.1;
    }

    NormalizedAddress {
        street_number: parsed.street_number,
        street_name: parsed.street_name,
        street_suffix: parsed.street_suffix,
        direction: parsed.direction,
        unit_type: parsed.unit_type,
        unit_number: parsed.unit_number,
        city,
        state,
        zip_code,
        zip4,
        street_address,
        formatted_address,
        confidence: confidence.min(1.0),
    }
}

/// Pull a trailing state code or state name (one or two words, e.g. "North
/// Carolina") off the end of the segment list. For single-segment
/// (comma-less) input the street parse must keep at least three tokens, so
/// "100 Main Ct" is not read as Connecticut.
fn take_trailing_state(segments: &mut Vec<Vec<String>>) -> Option<String> {
    if segments.len() == 1 && segments[0].len() < 4 {
        return None;
    }
    let seg_idx = segments.len() - 1;
    let seg = &mut segments[seg_idx];
    let last = seg.last().cloned()?;
    let upper = last.to_uppercase();
    let lower = last.to_lowercase();

    let (code, consumed) = if last.len() == 2
        && last.chars().all(|c| c.is_ascii_alphabetic())
        && STATE_CODES.contains(upper.as_str())
    {
        (Some(upper), 1)
    } else if let Some(code) = STATE_NAMES.get(lower.as_str()) {
        (Some(code.to_string()), 1)
    } else if seg.len() >= 2 {
        let two_word = format!("{} {}", seg[seg.len() - 2].to_lowercase(), lower);
        (
            STATE_NAMES.get(two_word.as_str()).map(|c| c.to_string()),
            2,
        )
    } else {
        (None, 0)
    };

    let code = code?;
    for _ in 0..consumed {
        seg.pop();
    }
    if seg.is_empty() {
        segments.remove(seg_idx);
    }
    Some(code)
}

#[derive(Debug, Default)]
struct ParsedStreet {
    street_number: Option<String>,
    street_name: Option<String>,
    street_suffix: Option<String>,
    direction: Option<String>,
    unit_type: Option<String>,
    unit_number: Option<String>,
    leftover: Vec<String>,
}

fn parse_street_tokens(tokens: &[String]) -> ParsedStreet {
    let mut parsed = ParsedStreet::default();
    let mut rest: &[String] = tokens;

    if let Some(first) = rest.first() {
        if first.chars().any(|c| c.is_ascii_digit()) && !first.starts_with('#') {
            parsed.street_number = Some(first.clone());
            rest = &rest[1..];
        }
    }

    // Rightmost suffix token with at least one name token before it. Scanning
    // from the right keeps "Avenue B" intact as a street name.
    let mut suffix_idx: Option<usize> = None;
    for (i, tok) in rest.iter().enumerate().rev() {
        if i >= 1 && STREET_SUFFIXES.contains_key(tok.to_lowercase().as_str()) {
            suffix_idx = Some(i);
            break;
        }
    }

    let (name_tokens, mut tail): (&[String], &[String]) = match suffix_idx {
        Some(i) => {
            parsed.street_suffix = STREET_SUFFIXES
                .get(rest[i].to_lowercase().as_str())
                .map(|s| s.to_string());
            (&rest[..i], &rest[i + 1..])
        }
        None => (rest, &[]),
    };

    if !name_tokens.is_empty() {
        let mut parts: Vec<String> = Vec::with_capacity(name_tokens.len());
        for (i, tok) in name_tokens.iter().enumerate() {
            let lower = tok.to_lowercase();
            // Canonicalize a pre-directional only when a name token follows it.
            if i == 0 && name_tokens.len() > 1 {
                if let Some(dir) = DIRECTIONALS.get(lower.as_str()) {
                    parts.push(dir.to_string());
                    continue;
                }
            }
            parts.push(title_case(tok));
        }
        parsed.street_name = Some(parts.join(" "));
    }

    if let Some(first) = tail.first() {
        if let Some(dir) = DIRECTIONALS.get(first.to_lowercase().as_str()) {
            parsed.direction = Some(dir.to_string());
            tail = &tail[1..];
        }
    }

    if let Some((ut, un)) = parse_unit_tokens(tail) {
        parsed.unit_type = Some(ut);
        parsed.unit_number = un;
        // The unit consumes at most two tokens from the front of the tail.
        let consumed = if tail.first().map_or(false, |t| t.len() > 1 && t.starts_with('#')) {
            1
        } else {
            2.min(tail.len())
        };
        tail = &tail[consumed..];
    }

    parsed.leftover = tail.to_vec();
    parsed
}

/// Parse "[Apt|Suite|Unit|#] <ident>" (or "#<ident>") from the front of a
/// token slice.
fn parse_unit_tokens(tokens: &[String]) -> Option<(String, Option<String>)> {
    let first = tokens.first()?;
    if first.len() > 1 && first.starts_with('#') {
        return Some(("Apt".to_string(), Some(first[1..].to_string())));
    }
    let unit_type = UNIT_TYPES.get(first.to_lowercase().as_str())?;
    let unit_number = tokens.get(1).map(|t| t.trim_start_matches('#').to_string());
    Some((unit_type.to_string(), unit_number))
}

fn build_street_address(parsed: &ParsedStreet) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(n) = &parsed.street_number {
        parts.push(n);
    }
    if let Some(n) = &parsed.street_name {
        parts.push(n);
    }
    if let Some(s) = &parsed.street_suffix {
        parts.push(s);
    }
    if let Some(d) = &parsed.direction {
        parts.push(d);
    }
    if parts.is_empty() {
        return None;
    }
    let mut out = parts.join(" ");
    if let (Some(ut), Some(un)) = (&parsed.unit_type, &parsed.unit_number) {
        out.push(' ');
        out.push_str(ut);
        out.push(' ');
        out.push_str(un);
    }
    Some(out)
}

fn build_formatted_address(
    street: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
    zip: Option<&str>,
) -> Option<String> {
    let mut out = String::new();
    for part in [street, city].into_iter().flatten() {
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(part);
    }
    if let Some(state) = state {
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(state);
    }
    if let Some(zip) = zip {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(zip);
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn title_case_words(tokens: &[String]) -> String {
    tokens.iter().map(|t| title_case(t)).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_null_fields_and_zero_confidence() {
        for input in ["", "   ", "\t\n"] {
            let addr = normalize(input);
            assert_eq!(addr.street_number, None);
            assert_eq!(addr.street_name, None);
            assert_eq!(addr.city, None);
            assert_eq!(addr.state, None);
            assert_eq!(addr.zip_code, None);
            assert_eq!(addr.formatted_address, None);
            assert_eq!(addr.confidence, 0.0);
        }
    }

    #[test]
    fn test_full_address_parse() {
        let addr = normalize("100 Congress Ave, Austin, TX 78701");
        assert_eq!(addr.street_number.as_deref(), Some("100"));
        assert_eq!(addr.street_name.as_deref(), Some("Congress"));
        assert_eq!(addr.street_suffix.as_deref(), Some("Ave"));
        assert_eq!(addr.city.as_deref(), Some("Austin"));
        assert_eq!(addr.state.as_deref(), Some("TX"));
        assert_eq!(addr.zip_code.as_deref(), Some("78701"));
        assert_eq!(
            addr.formatted_address.as_deref(),
            Some("100 Congress Ave, Austin, TX 78701")
        );
        assert!((addr.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_suffix_and_state_name_expansion_converges() {
        let a = normalize("100 Congress Ave, Austin, TX 78701");
        let b = normalize("100 Congress Avenue, Austin, Texas 78701");
        assert_eq!(a.formatted_address, b.formatted_address);
        assert_eq!(b.state.as_deref(), Some("TX"));
        assert_eq!(b.street_suffix.as_deref(), Some("Ave"));
    }

    #[test]
    fn test_two_word_state_name_converges_with_code_form() {
        let a = normalize("1 Main St, Charlotte, NC 28202");
        let b = normalize("1 Main Street, Charlotte, North Carolina 28202");
        assert_eq!(b.state.as_deref(), Some("NC"));
        assert_eq!(b.city.as_deref(), Some("Charlotte"));
        assert_eq!(a.formatted_address, b.formatted_address);

        let ny = normalize("350 Fifth Ave, New York, New York 10118");
        assert_eq!(ny.state.as_deref(), Some("NY"));
        assert_eq!(ny.city.as_deref(), Some("New York"));
    }

    #[test]
    fn test_directional_and_unit() {
        let addr = normalize("221 Baker St NE Apt 4B, Atlanta, GA 30301");
        assert_eq!(addr.direction.as_deref(), Some("NE"));
        assert_eq!(addr.unit_type.as_deref(), Some("Apt"));
        assert_eq!(addr.unit_number.as_deref(), Some("4B"));
        assert_eq!(
            addr.street_address.as_deref(),
            Some("221 Baker St NE Apt 4B")
        );
    }

    #[test]
    fn test_hash_unit_form() {
        let addr = normalize("900 Lavaca St #12, Austin, TX 78701");
        assert_eq!(addr.unit_type.as_deref(), Some("Apt"));
        assert_eq!(addr.unit_number.as_deref(), Some("12"));
    }

    #[test]
    fn test_zip4_split() {
        let addr = normalize("100 Congress Ave, Austin, TX 78701-2345");
        assert_eq!(addr.zip_code.as_deref(), Some("78701"));
        assert_eq!(addr.zip4.as_deref(), Some("2345"));
    }

    #[test]
    fn test_comma_less_input() {
        let addr = normalize("100 Congress Ave Austin TX 78701");
        assert_eq!(addr.state.as_deref(), Some("TX"));
        assert_eq!(addr.city.as_deref(), Some("Austin"));
        assert_eq!(addr.street_suffix.as_deref(), Some("Ave"));
    }

    #[test]
    fn test_short_address_does_not_eat_suffix_as_state() {
        // "Ct" is both a suffix and Connecticut; a short comma-less address
        // must keep it as the suffix.
        let addr = normalize("100 Main Ct");
        assert_eq!(addr.state, None);
        assert_eq!(addr.street_suffix.as_deref(), Some("Ct"));
    }

    #[test]
    fn test_avenue_b_stays_a_name() {
        let addr = normalize("100 Avenue B, New York, NY 10009");
        assert_eq!(addr.street_name.as_deref(), Some("Avenue B"));
        assert_eq!(addr.street_suffix, None);
    }

    #[test]
    fn test_confidence_always_in_unit_interval() {
        let samples = [
            "",
            "garbage",
            "100",
            "100 Congress Ave",
            "100 Congress Ave, Austin, TX 78701",
            "Austin, TX",
            "78701",
            "Suite 200",
        ];
        for s in samples {
            let c = normalize(s).confidence;
            assert!((0.0..=1.0).contains(&c), "confidence {} out of range for {:?}", c, s);
        }
    }

    #[test]
    fn test_partial_confidence_is_additive() {
        // Number + name + suffix only: 0.2 + 0.3.
        let addr = normalize("100 Congress Ave");
        assert!((addr.confidence - 0.5).abs() < 1e-9);
    }
}
