//! Kubernetes label-selector grammar: equality, inequality, set `in`/`notin`, and
//! existence (spec.md §4.1). Parsed by hand with a small recursive-descent parser
//! rather than delegated to a crate — none of the teacher/pack dependencies carry one.

use std::collections::BTreeMap;

use crate::errors::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    NotExists(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(k, v) => labels.get(k).map(|lv| lv == v).unwrap_or(false),
            Requirement::NotEquals(k, v) => labels.get(k).map(|lv| lv != v).unwrap_or(true),
            Requirement::In(k, vs) => labels.get(k).map(|lv| vs.contains(lv)).unwrap_or(false),
            Requirement::NotIn(k, vs) => labels.get(k).map(|lv| !vs.contains(lv)).unwrap_or(true),
            Requirement::Exists(k) => labels.contains_key(k),
            Requirement::NotExists(k) => !labels.contains_key(k),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Parses the Kubernetes label-selector grammar:
    /// `k=v`, `k==v`, `k!=v`, `k in (a,b)`, `k notin (a,b)`, `k`, `!k`, comma-joined.
    pub fn parse(input: &str) -> Result<Self, StoreError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::everything());
        }
        let mut requirements = Vec::new();
        for raw_term in split_top_level_commas(input) {
            let term = raw_term.trim();
            if term.is_empty() {
                continue;
            }
            requirements.push(parse_term(term)?);
        }
        Ok(Self { requirements })
    }
}

/// Splits on commas that are not inside `(...)` (set-based selector value lists).
fn split_top_level_commas(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn parse_term(term: &str) -> Result<Requirement, StoreError> {
    if let Some(rest) = term.strip_prefix('!') {
        let key = rest.trim();
        validate_key(key)?;
        return Ok(Requirement::NotExists(key.to_string()));
    }
    if let Some(idx) = term.find("!=") {
        let (k, v) = (term[..idx].trim(), term[idx + 2..].trim());
        validate_key(k)?;
        return Ok(Requirement::NotEquals(k.to_string(), v.to_string()));
    }
    if let Some(idx) = term.find("==") {
        let (k, v) = (term[..idx].trim(), term[idx + 2..].trim());
        validate_key(k)?;
        return Ok(Requirement::Equals(k.to_string(), v.to_string()));
    }
    if let Some(idx) = term.find('=') {
        let (k, v) = (term[..idx].trim(), term[idx + 1..].trim());
        validate_key(k)?;
        return Ok(Requirement::Equals(k.to_string(), v.to_string()));
    }
    if let Some(idx) = find_word(term, "notin") {
        let (k, set) = (term[..idx].trim(), term[idx + 5..].trim());
        validate_key(k)?;
        return Ok(Requirement::NotIn(k.to_string(), parse_set(set)?));
    }
    if let Some(idx) = find_word(term, "in") {
        let (k, set) = (term[..idx].trim(), term[idx + 2..].trim());
        validate_key(k)?;
        return Ok(Requirement::In(k.to_string(), parse_set(set)?));
    }
    validate_key(term)?;
    Ok(Requirement::Exists(term.to_string()))
}

fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let wlen = word.len();
    let mut i = 0;
    while i + wlen <= bytes.len() {
        if &haystack[i..i + wlen] == word {
            let before_ok = i == 0 || haystack.as_bytes()[i - 1] == b' ';
            let after_ok = i + wlen == bytes.len() || haystack.as_bytes()[i + wlen] == b' ' || haystack.as_bytes()[i + wlen] == b'(';
            if before_ok && after_ok {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

fn parse_set(raw: &str) -> Result<Vec<String>, StoreError> {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| StoreError::BadRequest(format!("expected parenthesized set in selector, got {:?}", raw)))?;
    Ok(inner.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect())
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::BadRequest("empty label key in selector".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn equality_matches() {
        let sel = LabelSelector::parse("env=prod").unwrap();
        assert!(sel.matches(&labels(&[("env", "prod")])));
        assert!(!sel.matches(&labels(&[("env", "dev")])));
    }

    #[test]
    fn inequality_matches() {
        let sel = LabelSelector::parse("env!=prod").unwrap();
        assert!(sel.matches(&labels(&[("env", "dev")])));
        assert!(!sel.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn set_based_in() {
        let sel = LabelSelector::parse("zone in (a,b,c)").unwrap();
        assert!(sel.matches(&labels(&[("zone", "b")])));
        assert!(!sel.matches(&labels(&[("zone", "z")])));
    }

    #[test]
    fn set_based_notin() {
        let sel = LabelSelector::parse("zone notin (a,b,c)").unwrap();
        assert!(sel.matches(&labels(&[("zone", "z")])));
        assert!(!sel.matches(&labels(&[("zone", "b")])));
    }

    #[test]
    fn existence() {
        let sel = LabelSelector::parse("tier").unwrap();
        assert!(sel.matches(&labels(&[("tier", "anything")])));
        assert!(!sel.matches(&labels(&[("other", "x")])));
    }

    #[test]
    fn non_existence() {
        let sel = LabelSelector::parse("!tier").unwrap();
        assert!(!sel.matches(&labels(&[("tier", "x")])));
        assert!(sel.matches(&labels(&[("other", "x")])));
    }

    #[test]
    fn conjunction() {
        let sel = LabelSelector::parse("env=prod,zone in (a,b)").unwrap();
        assert!(sel.matches(&labels(&[("env", "prod"), ("zone", "a")])));
        assert!(!sel.matches(&labels(&[("env", "prod"), ("zone", "z")])));
    }
}
