//! Syntactic clean-up of generated SPARQL.
//!
//! Seq2seq models trained on other knowledge bases emit Wikidata prefixes,
//! bracketed blocks, dangling triples and unbalanced braces. Every pass here
//! is purely textual; nothing is resolved against the endpoint.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static BRACKET_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\[(.*?)\]").unwrap());
static CURIE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_-]*):([^\s.,;)}{]+)").unwrap()
});
static WDT_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bwdt:").unwrap());
static P_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bp:").unwrap());
static WD_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bwd:").unwrap());
static WHERE_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)where\s*\{(.*)\}\s*").unwrap());
static ANY_BODY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{(.*)\}\s*").unwrap());
static DOUBLE_DOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.\s*\.").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static SELECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bselect\b").unwrap());
static ASK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bask\b").unwrap());
static ORDER_BY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\border\s+by\b").unwrap());
static LIMIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\blimit\b").unwrap());
static OPEN_BRACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\{\s*").unwrap());
static CLOSE_BRACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\}\s*").unwrap());
static ORDER_BY_DESC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ORDER BY\s*DESC\s*\(").unwrap());

/// Apply every repair pass to one query
pub fn repair_query(query: &str) -> String {
    let mut q = BRACKET_BLOCK.replace_all(query, "{$1}").into_owned();
    q = clean_bad_tokens(&q);
    q = map_prefixes(&q);
    q = sanitize_curie_local_parts(&q);

    if let Some((head, body, tail)) = split_where_body(&q) {
        q = format!("{}{}{}", head, repair_where_body(body), tail);
    }

    let mut q = normalize_query_text(&q);
    let opens = q.matches('{').count();
    let closes = q.matches('}').count();
    for _ in closes..opens {
        q.push_str(" }");
    }
    q
}

/// Drop characters the endpoint's parser rejects outright
fn clean_bad_tokens(text: &str) -> String {
    let text = text.replace('&', " ");
    let text = strip_stray_angle_brackets(&text);
    text.replace('\'', "")
}

/// Remove `>` that neither closes an IRI nor takes part in a comparison
fn strip_stray_angle_brackets(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_iri = false;
    let mut filter_depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '<' if !in_iri => {
                in_iri = next.is_some_and(|n| !n.is_whitespace() && n != '=');
                out.push(c);
            }
            '>' if in_iri => {
                in_iri = false;
                out.push(c);
            }
            '>' => {
                let prev = if i > 0 { Some(chars[i - 1]) } else { None };
                let comparison = filter_depth > 0
                    || next == Some('=')
                    || prev.is_some_and(|p| "<>=!".contains(p));
                if comparison {
                    out.push(c);
                } else {
                    while chars.get(i + 1) == Some(&'>') {
                        i += 1;
                    }
                    out.push(' ');
                }
            }
            '(' => {
                if filter_depth > 0 {
                    filter_depth += 1;
                } else if out.trim_end().to_ascii_uppercase().ends_with("FILTER") {
                    filter_depth = 1;
                }
                out.push(c);
            }
            ')' => {
                filter_depth = filter_depth.saturating_sub(1);
                out.push(c);
            }
            c if c.is_whitespace() => {
                in_iri = false;
                out.push(c);
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

/// Rewrite Wikidata prefixes to their closest DBpedia counterparts
fn map_prefixes(text: &str) -> String {
    let text = WDT_PREFIX.replace_all(text, "dbo:");
    let text = P_PREFIX.replace_all(&text, "dbo:");
    WD_PREFIX.replace_all(&text, "dbr:").into_owned()
}

/// `dbr:Star_Wars:_Episode_IV` is not a valid prefixed name
fn sanitize_curie_local_parts(text: &str) -> String {
    CURIE
        .replace_all(text, |caps: &Captures| {
            let local = caps[2].replace([':', ' '], "_");
            format!("{}:{}", &caps[1], local)
        })
        .into_owned()
}

/// Split into (head, body, tail) around the outermost group pattern
fn split_where_body(query: &str) -> Option<(&str, &str, &str)> {
    let caps = WHERE_BODY
        .captures(query)
        .or_else(|| ANY_BODY.captures(query))?;
    let body = caps.get(1)?;
    Some((
        &query[..body.start()],
        body.as_str(),
        &query[body.end()..],
    ))
}

/// Split a group body at top-level dots
fn split_clauses(body: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut buf = String::new();
    let mut depth = 0usize;
    let mut in_iri = false;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '<' if !in_iri => {
                in_iri = chars
                    .peek()
                    .is_some_and(|n| !n.is_whitespace() && *n != '=');
            }
            '>' => in_iri = false,
            c if c.is_whitespace() => in_iri = false,
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }

        if c == '.' && depth == 0 && !in_iri {
            let clause = buf.trim();
            if !clause.is_empty() {
                clauses.push(clause.to_string());
            }
            buf.clear();
        } else {
            buf.push(c);
        }
    }

    let tail = buf.trim();
    if !tail.is_empty() {
        clauses.push(tail.to_string());
    }
    clauses
}

/// Fix triple patterns with missing or extra terms
fn repair_where_body(body: &str) -> String {
    let mut fresh = 0;
    let mut fresh_var = || {
        fresh += 1;
        format!("?v{}", fresh)
    };

    let mut repaired = Vec::new();
    for clause in split_clauses(body) {
        let tokens: Vec<&str> = clause.split_whitespace().collect();
        match tokens.as_slice() {
            [] => {}
            [only] if !only.starts_with('?') => {}
            [subject, predicate] => {
                repaired.push(format!("{} {} {}", subject, predicate, fresh_var()));
            }
            [subject, first, second, object] => {
                let mid = fresh_var();
                repaired.push(format!("{} {} {}", subject, first, mid));
                repaired.push(format!("{} {} {}", mid, second, object));
            }
            _ => repaired.push(tokens.join(" ")),
        }
    }

    let joined = repaired.join(" . ");
    DOUBLE_DOT.replace_all(&joined, ".").trim().to_string()
}

/// Collapse whitespace and canonicalize keywords and brace spacing
fn normalize_query_text(query: &str) -> String {
    let q = WHITESPACE.replace_all(query.trim(), " ");
    let q = SELECT.replace_all(&q, "SELECT");
    let q = ASK.replace_all(&q, "ASK");
    let q = ORDER_BY.replace_all(&q, "ORDER BY");
    let q = LIMIT.replace_all(&q, "LIMIT");
    let q = OPEN_BRACE.replace_all(&q, " { ");
    let q = CLOSE_BRACE.replace_all(&q, " } ");
    let q = ORDER_BY_DESC.replace_all(&q, "ORDER BY DESC(");
    q.trim().to_string()
}
