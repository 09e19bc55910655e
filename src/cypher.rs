//! Rewrites a match-by-id pattern query whose `RETURN` embeds relation
//! sub-queries into a chain of `MATCH ... WITH ...` clauses.
//!
//! ```text
//! MATCH (n:`L`) WHERE n.`uuid` = { id } WITH n
//! RETURN n, [ [ (n)-[r1:`E`]->(a1:`T`) | [ r1, a1 ] ] ]
//! ```
//!
//! becomes
//!
//! ```text
//! MATCH (n:`L`) WHERE n.`uuid` = '123' WITH n
//! MATCH (n)-[r1:`E`]->(a1:`T`) WITH n, r1, a1 RETURN n, r1, a1
//! ```
//!
//! Queries of any other shape are returned unchanged. A relation list that is
//! present but malformed is an error; no partial rewrite is ever produced.

use tracing::trace;

use crate::EntityGraphError;

const MATCH: &str = "MATCH";
const WHERE: &str = "WHERE";
const WITH: &str = "WITH";
const RETURN: &str = "RETURN";
const ID_PLACEHOLDER: &str = "{ id }";

/// A query split into its four clauses, each including its keyword.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryClauseSet {
    pub match_clause: String,
    pub where_clause: String,
    pub with_clause: String,
    pub return_clause: String,
    /// Plain aliases listed before the relation list.
    pub return_tokens: Vec<String>,
    /// Binding list text (`"r1, a1"`) to relation pattern text, first-seen
    /// order. A repeated binding list replaces the earlier pattern.
    pub relation_bindings: Vec<(String, String)>,
}

impl QueryClauseSet {
    /// `Ok(None)` when the query is not of the supported shape.
    pub fn parse(query: &str) -> Result<Option<Self>, EntityGraphError> {
        parse_query(query)
    }

    /// Reassembles the chained form, quoting `id` into the predicate.
    pub fn render(&self, id: &str) -> String {
        let mut aliases = self.return_tokens.clone();
        let mut parts = vec![
            self.match_clause.clone(),
            self.where_clause
                .replace(ID_PLACEHOLDER, &quote_literal(id)),
            self.with_clause.clone(),
        ];
        for (bindings, pattern) in &self.relation_bindings {
            aliases.extend(bindings.split(", ").map(str::to_string));
            parts.push(format!("{MATCH} {pattern} {WITH} {}", aliases.join(", ")));
        }
        parts.push(format!("{RETURN} {}", aliases.join(", ")));
        parts.join(" ")
    }
}

/// Single-quoted literal; backslashes are escaped before quotes.
fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

pub fn normalize(query: &str, id: &str) -> Result<String, EntityGraphError> {
    match QueryClauseSet::parse(query)? {
        Some(clauses) => {
            let normalized = clauses.render(id);
            trace!(%normalized, "normalized relation query");
            Ok(normalized)
        }
        None => Ok(query.to_string()),
    }
}

fn parse_query(query: &str) -> Result<Option<QueryClauseSet>, EntityGraphError> {
    let lexer = Lexer::lenient(query);
    if lexer.keyword(MATCH) != Some(0) {
        return Ok(None);
    }
    let (Some(where_at), Some(with_at), Some(return_at)) = (
        lexer.keyword(WHERE),
        lexer.keyword(WITH),
        lexer.keyword(RETURN),
    ) else {
        return Ok(None);
    };
    if !(where_at < with_at && with_at < return_at) {
        return Ok(None);
    }
    let return_clause = query[return_at..].trim();
    let Some((return_tokens, relation_list)) = parse_return(&return_clause[RETURN.len()..])?
    else {
        trace!("return clause without relations");
        return Ok(None);
    };
    if return_tokens.is_empty() {
        return Ok(None);
    }
    let relation_bindings = parse_relation_list(relation_list)?;
    Ok(Some(QueryClauseSet {
        match_clause: query[..where_at].trim().to_string(),
        where_clause: query[where_at..with_at].trim().to_string(),
        with_clause: query[with_at..return_at].trim().to_string(),
        return_clause: return_clause.to_string(),
        return_tokens,
        relation_bindings,
    }))
}

/// `RETURN` body: plain aliases, then the bracketed relation list, which
/// must be the last item.
fn parse_return(body: &str) -> Result<Option<(Vec<String>, &str)>, EntityGraphError> {
    let tokens = Lexer::lenient(body).split(',');
    let mut aliases = Vec::new();
    for (position, token) in tokens.iter().enumerate() {
        let token = token.trim();
        if token.starts_with('[') {
            if position + 1 != tokens.len() {
                return Err(EntityGraphError::malformed_pattern(
                    "relation list must be the last RETURN item",
                ));
            }
            return Ok(Some((aliases, token)));
        }
        aliases.push(token.to_string());
    }
    Ok(None)
}

fn parse_relation_list(list: &str) -> Result<Vec<(String, String)>, EntityGraphError> {
    let inner = strip_brackets(list, "relation list")?;
    if inner.is_empty() {
        return Err(EntityGraphError::malformed_pattern("relation list is empty"));
    }
    let mut bindings: Vec<(String, String)> = Vec::new();
    for element in Lexer::strict(inner)?.split(',') {
        let (binding, pattern) = parse_relation(element.trim())?;
        match bindings.iter_mut().find(|(existing, _)| *existing == binding) {
            Some(slot) => slot.1 = pattern,
            None => bindings.push((binding, pattern)),
        }
    }
    Ok(bindings)
}

/// `[ <pattern> | [ <bindings> ] ]`
fn parse_relation(element: &str) -> Result<(String, String), EntityGraphError> {
    let inner = strip_brackets(element, "relation sub-pattern")?;
    let parts = Lexer::strict(inner)?.split('|');
    let [pattern, bindings] = parts.as_slice() else {
        return Err(EntityGraphError::malformed_pattern(format!(
            "expected exactly one '|' in {element}"
        )));
    };
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Err(EntityGraphError::malformed_pattern(format!(
            "missing pattern in {element}"
        )));
    }
    Ok((parse_bindings(bindings.trim())?, pattern.to_string()))
}

fn parse_bindings(bindings: &str) -> Result<String, EntityGraphError> {
    let inner = strip_brackets(bindings, "binding list")?;
    let names: Vec<&str> = inner.split(',').map(str::trim).collect();
    if names.iter().any(|name| name.is_empty()) {
        return Err(EntityGraphError::malformed_pattern(format!(
            "empty binding in [{inner}]"
        )));
    }
    Ok(names.join(", "))
}

fn strip_brackets<'a>(text: &'a str, what: &str) -> Result<&'a str, EntityGraphError> {
    text.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
        .ok_or_else(|| EntityGraphError::malformed_pattern(format!("{what} is not bracketed: {text}")))
}

/// Byte offsets of the characters outside any bracket, parenthesis, brace or
/// quoted section.
struct Lexer<'a> {
    text: &'a str,
    top_level: Vec<usize>,
}

impl<'a> Lexer<'a> {
    /// Tolerates unbalanced input; used to locate clauses.
    fn lenient(text: &'a str) -> Self {
        let top_level = scan(text, false).unwrap_or_default();
        Self { text, top_level }
    }

    fn strict(text: &'a str) -> Result<Self, EntityGraphError> {
        let top_level = scan(text, true).map_err(EntityGraphError::malformed_pattern)?;
        Ok(Self { text, top_level })
    }

    /// First top-level occurrence of `keyword` as a whole word.
    fn keyword(&self, keyword: &str) -> Option<usize> {
        self.top_level.iter().copied().find(|&at| {
            self.text[at..].starts_with(keyword)
                && !self.text[..at].chars().next_back().is_some_and(is_word_char)
                && !self.text[at + keyword.len()..]
                    .chars()
                    .next()
                    .is_some_and(is_word_char)
        })
    }

    fn split(&self, separator: char) -> Vec<&'a str> {
        let mut parts = Vec::new();
        let mut start = 0;
        for &at in &self.top_level {
            if self.text[at..].starts_with(separator) {
                parts.push(&self.text[start..at]);
                start = at + separator.len_utf8();
            }
        }
        parts.push(&self.text[start..]);
        parts
    }
}

fn scan(text: &str, strict: bool) -> Result<Vec<usize>, String> {
    let mut top_level = Vec::new();
    let mut closers: Vec<char> = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some((at, ch)) = chars.next() {
        match ch {
            '\'' | '"' | '`' => {
                if closers.is_empty() {
                    top_level.push(at);
                }
                let mut closed = false;
                while let Some((_, next)) = chars.next() {
                    if next == '\\' && ch != '`' {
                        chars.next();
                    } else if next == ch {
                        // doubled backticks escape themselves
                        if ch == '`' && chars.peek().is_some_and(|(_, c)| *c == '`') {
                            chars.next();
                            continue;
                        }
                        closed = true;
                        break;
                    }
                }
                if !closed && strict {
                    return Err(format!("unterminated {ch} at offset {at}"));
                }
            }
            '[' | '(' | '{' => {
                if closers.is_empty() {
                    top_level.push(at);
                }
                closers.push(match ch {
                    '[' => ']',
                    '(' => ')',
                    _ => '}',
                });
            }
            ']' | ')' | '}' => match closers.last() {
                Some(expected) if *expected == ch => {
                    closers.pop();
                }
                _ if strict => return Err(format!("unbalanced {ch} at offset {at}")),
                _ => {}
            },
            _ if closers.is_empty() => top_level.push(at),
            _ => {}
        }
    }
    if strict && !closers.is_empty() {
        return Err(format!("unclosed bracket, expected {:?}", closers));
    }
    Ok(top_level)
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}
