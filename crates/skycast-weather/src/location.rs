//! Location query candidates for geocoding and provider search endpoints.
//!
//! Endpoints differ in how much street-level detail or postal noise they
//! tolerate, so a raw address is expanded into variants ordered from most to
//! least specific and tried in that order.

/// Collapse runs of whitespace to single spaces and trim.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cache key form of a query: lowercased, whitespace collapsed.
pub fn normalize_query(s: &str) -> String {
    collapse_whitespace(s).to_lowercase()
}

/// `12345` or `12345-6789`
fn is_postal_code(token: &str) -> bool {
    let bytes = token.as_bytes();
    let digits = |b: &[u8]| b.iter().all(u8::is_ascii_digit);
    match bytes.len() {
        5 => digits(bytes),
        10 => bytes[5] == b'-' && digits(&bytes[..5]) && digits(&bytes[6..]),
        _ => false,
    }
}

fn is_numeric_token(token: &str) -> bool {
    is_postal_code(token) || token.bytes().all(|b| b.is_ascii_digit())
}

/// Drop postal codes and bare numbers from every comma segment.
fn strip_numeric_tokens(s: &str) -> String {
    let has_commas = s.contains(',');
    let segments: Vec<String> = s
        .split(',')
        .map(|segment| {
            segment
                .split_whitespace()
                .filter(|token| !is_numeric_token(token))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|segment| !segment.is_empty())
        .collect();

    if has_commas {
        segments.join(", ")
    } else {
        segments.concat()
    }
}

fn push_unique(queries: &mut Vec<String>, candidate: String) {
    if !candidate.is_empty() && !queries.contains(&candidate) {
        queries.push(candidate);
    }
}

/// Expand a raw address into ordered, de-duplicated query candidates.
///
/// `"123 Main St, Springfield, IL 62704"` yields the original, then
/// `"Main St, Springfield, IL"`, `"Springfield, IL"`, `"Main St"`,
/// `"Springfield"` and `"IL"`.
pub fn build_location_queries(raw: &str) -> Vec<String> {
    let mut queries = Vec::new();

    let original = collapse_whitespace(raw);
    if original.is_empty() {
        return queries;
    }
    push_unique(&mut queries, original.clone());

    let base = strip_numeric_tokens(&original);
    // Nothing but numbers: no structural variants to derive
    if base.is_empty() {
        return queries;
    }
    push_unique(&mut queries, base.clone());

    if base.contains(',') {
        let segments: Vec<&str> = base
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let tail_start = segments.len().saturating_sub(2);
        push_unique(&mut queries, segments[tail_start..].join(", "));

        for segment in segments {
            push_unique(&mut queries, segment.to_string());
        }
    } else {
        let tokens: Vec<&str> = base.split_whitespace().collect();
        if tokens.len() > 2 {
            push_unique(&mut queries, tokens[tokens.len() - 2..].join(" "));
        }
    }

    queries
}
