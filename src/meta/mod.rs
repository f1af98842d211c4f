//! PxWeb table metadata: variable models, matcher dispatch, value pairs.

use regex::Regex;
use serde::Deserialize;

/// One dimension descriptor from the metadata endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Variable {
    pub code: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default, rename = "valueTexts")]
    pub value_texts: Vec<String>,
    #[serde(default, rename = "time")]
    pub is_time: bool,
}

/// The ordered collection of variables a table exposes.
#[derive(Debug, Clone, Deserialize)]
pub struct TableMeta {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl TableMeta {
    pub fn variable(&self, code: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.code == code)
    }
}

/// A value code paired with its display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePair {
    pub code: String,
    pub label: String,
}

/// One way of locating a variable in table metadata.
///
/// Matchers are evaluated strictly in declared order: the first matcher that
/// is satisfied by *any* variable wins, even if a later matcher would also
/// match a different variable.
pub enum Matcher {
    /// Case-insensitive equality against `Variable::code`.
    ByCode(String),
    /// Case-insensitive equality against `Variable::text`.
    ByText(String),
    /// Regex tested against both code and text.
    ByRegex(Regex),
    /// Arbitrary predicate over the variable.
    ByPredicate(Box<dyn Fn(&Variable) -> bool + Send + Sync>),
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Matcher::ByCode(s) => write!(f, "ByCode({:?})", s),
            Matcher::ByText(s) => write!(f, "ByText({:?})", s),
            Matcher::ByRegex(r) => write!(f, "ByRegex({:?})", r.as_str()),
            Matcher::ByPredicate(_) => write!(f, "ByPredicate(..)"),
        }
    }
}

impl Matcher {
    pub fn code(s: impl Into<String>) -> Self {
        Matcher::ByCode(s.into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Matcher::ByText(s.into())
    }

    pub fn regex(pattern: &str) -> Self {
        Matcher::ByRegex(Regex::new(pattern).expect("matcher regex must be valid"))
    }

    pub fn predicate(p: impl Fn(&Variable) -> bool + Send + Sync + 'static) -> Self {
        Matcher::ByPredicate(Box::new(p))
    }

    fn matches(&self, var: &Variable) -> bool {
        match self {
            Matcher::ByCode(s) => var.code.eq_ignore_ascii_case(s),
            Matcher::ByText(s) => var.text.eq_ignore_ascii_case(s),
            Matcher::ByRegex(re) => re.is_match(&var.code) || re.is_match(&var.text),
            Matcher::ByPredicate(p) => p(var),
        }
    }
}

/// Find a variable code by trying each matcher in order against every
/// variable, returning on the first matcher that matches anything.
pub fn find_variable_code(meta: &TableMeta, matchers: &[Matcher]) -> Option<String> {
    for matcher in matchers {
        if let Some(var) = meta.variables.iter().find(|v| matcher.matches(v)) {
            return Some(var.code.clone());
        }
    }
    None
}

/// Align `values` with `valueTexts`, defaulting the label to the code when
/// the label array is missing or misaligned.
pub fn build_value_pairs(var: &Variable) -> Vec<ValuePair> {
    var.values
        .iter()
        .enumerate()
        .map(|(i, code)| ValuePair {
            code: code.clone(),
            label: var
                .value_texts
                .get(i)
                .cloned()
                .unwrap_or_else(|| code.clone()),
        })
        .collect()
}

/// Reverse a pair list to ascending-by-code when it arrives descending.
/// PxWeb orders some time dimensions newest-first.
pub fn ascending_by_code(mut pairs: Vec<ValuePair>) -> Vec<ValuePair> {
    if pairs.len() >= 2 && pairs.first().map(|p| &p.code) > pairs.last().map(|p| &p.code) {
        pairs.reverse();
    }
    pairs
}

/// Value pairs for a variable, reversed to ascending-by-period when the
/// variable is flagged as a time axis.
pub fn base_value_pairs(var: &Variable) -> Vec<ValuePair> {
    let pairs = build_value_pairs(var);
    if var.is_time {
        ascending_by_code(pairs)
    } else {
        pairs
    }
}
