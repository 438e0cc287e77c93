//! Predicate trees: the filter wire contract sent to the remote query endpoint
//!
//! A filter list is an ordered sequence of [`Node`]s. Each node is an
//! AND-group, an OR-group or a leaf comparison:
//!
//! ```json
//! [
//!   {"and": [
//!     {"or": [
//!       {"field": "transactions.type", "op": "eq", "value": "deposit"},
//!       {"field": "transactions.type", "op": "eq", "value": "withdrawal"}
//!     ]},
//!     {"field": "profiles.level", "op": "eq", "value": "3"}
//!   ]}
//! ]
//! ```
//!
//! Edits never mutate a tree that is already owned by a published
//! `QueryOptions`: callers clone, edit the clone with the functions below, and
//! publish the result. The remove functions cascade: a group left without
//! children is dropped, so no empty `{"or": []}` or `{"and": []}` ever
//! reaches a backend query translator.

use crate::core::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Comparison operator of a leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Eq,
    Like,
    Ilike,
    In,
    Gte,
    Lte,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "eq",
            Op::Like => "like",
            Op::Ilike => "ilike",
            Op::In => "in",
            Op::Gte => "gte",
            Op::Lte => "lte",
        }
    }

    /// `like` when the search is case sensitive, `ilike` otherwise
    pub fn text_search(case_sensitive: bool) -> Self {
        if case_sensitive { Op::Like } else { Op::Ilike }
    }
}

/// Right-hand side of a leaf: a string, a number or an array of those
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Text(String),
    Number(serde_json::Number),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Build a numeric value; `None` for NaN or infinity
    pub fn float(value: f64) -> Option<Self> {
        serde_json::Number::from_f64(value).map(FilterValue::Number)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Empty strings and empty arrays carry no filter
    pub fn is_empty(&self) -> bool {
        match self {
            FilterValue::Text(s) => s.is_empty(),
            FilterValue::Number(_) => false,
            FilterValue::List(items) => items.is_empty(),
        }
    }

    /// Convert from a JSON scalar or array; objects, booleans and null are rejected
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(FilterValue::Text(s.clone())),
            Value::Number(n) => Some(FilterValue::Number(n.clone())),
            Value::Array(items) => items
                .iter()
                .map(FilterValue::from_json)
                .collect::<Option<Vec<_>>>()
                .map(FilterValue::List),
            _ => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Number(value.into())
    }
}

impl From<u64> for FilterValue {
    fn from(value: u64) -> Self {
        FilterValue::Number(value.into())
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// A single comparison `field op value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaf {
    /// Dotted relation path, e.g. `profiles.nickname`
    pub field: String,
    pub op: Op,
    pub value: FilterValue,
}

impl Leaf {
    pub fn new(field: impl Into<String>, op: Op, value: impl Into<FilterValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

/// Conjunction of child nodes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AndGroup {
    pub and: Vec<Node>,
}

/// Disjunction of child nodes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrGroup {
    pub or: Vec<Node>,
}

/// A node of the predicate tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    And(AndGroup),
    Or(OrGroup),
    Leaf(Leaf),
}

impl Node {
    pub fn and(children: Vec<Node>) -> Self {
        Node::And(AndGroup { and: children })
    }

    pub fn or(children: Vec<Node>) -> Self {
        Node::Or(OrGroup { or: children })
    }

    pub fn leaf(field: impl Into<String>, op: Op, value: impl Into<FilterValue>) -> Self {
        Node::Leaf(Leaf::new(field, op, value))
    }

    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::leaf(field, Op::Eq, value)
    }

    /// An OR-group of `eq` leaves on one field, one per value
    pub fn any_of<V: Into<FilterValue>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Node::or(values.into_iter().map(|v| Node::eq(field, v)).collect())
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    /// Whether any leaf in this subtree targets `field`
    pub fn contains_field(&self, field: &str) -> bool {
        match self {
            Node::Leaf(leaf) => leaf.field == field,
            Node::And(g) => g.and.iter().any(|c| c.contains_field(field)),
            Node::Or(g) => g.or.iter().any(|c| c.contains_field(field)),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::And(g) => g.and.iter().map(Node::leaf_count).sum(),
            Node::Or(g) => g.or.iter().map(Node::leaf_count).sum(),
        }
    }

    /// Evaluate this subtree against a JSON row
    ///
    /// An empty AND-group matches every row, an empty OR-group matches none.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Node::And(g) => g.and.iter().all(|c| c.matches(row)),
            Node::Or(g) => g.or.iter().any(|c| c.matches(row)),
            Node::Leaf(leaf) => leaf_matches(leaf, row),
        }
    }
}

// =============================================================================
// Tree edits
// =============================================================================

/// Append `node` to the first top-level AND-group, creating one if none exists
pub fn append_to_root(filters: &mut Vec<Node>, node: Node) {
    let root = filters.iter_mut().find_map(|n| match n {
        Node::And(g) => Some(g),
        _ => None,
    });
    match root {
        Some(root) => root.and.push(node),
        None => filters.push(Node::and(vec![node])),
    }
}

/// Remove every leaf on `field`, then drop the groups this empties
pub fn remove_field(filters: &mut Vec<Node>, field: &str) {
    let targets = |leaf: &Leaf| leaf.field == field;
    filters.retain_mut(|node| prune_leaves(node, &targets));
}

/// Remove every OR-group holding a direct leaf on one of `fields`
///
/// A search box or date picker owns one such OR-group (its bucket). Removing
/// the whole group before re-adding keeps a single bucket per search.
pub fn remove_bucket<S: AsRef<str>>(filters: &mut Vec<Node>, fields: &[S]) {
    let in_bucket = |leaf: &Leaf| fields.iter().any(|f| f.as_ref() == leaf.field);
    filters.retain_mut(|node| prune_buckets(node, &in_bucket));
}

/// Remove leaves on `field` sitting at top level or directly in a top-level AND-group
///
/// Column filters and selectors own these direct leaves. OR-groups (seeded
/// buckets, search and date buckets) on the same field are left alone.
pub fn remove_root_leaves(filters: &mut Vec<Node>, field: &str) {
    filters.retain_mut(|node| match node {
        Node::Leaf(leaf) => leaf.field != field,
        Node::And(g) => {
            g.and.retain(|c| c.as_leaf().is_none_or(|l| l.field != field));
            !g.and.is_empty()
        }
        Node::Or(_) => true,
    });
}

/// Whether any node in the list targets `field`
pub fn contains_field(filters: &[Node], field: &str) -> bool {
    filters.iter().any(|n| n.contains_field(field))
}

/// Whether an empty group exists anywhere in the list
pub fn has_empty_group(filters: &[Node]) -> bool {
    fn walk(node: &Node) -> bool {
        match node {
            Node::Leaf(_) => false,
            Node::And(g) => g.and.is_empty() || g.and.iter().any(walk),
            Node::Or(g) => g.or.is_empty() || g.or.iter().any(walk),
        }
    }
    filters.iter().any(walk)
}

// Returns whether `node` survives.
fn prune_leaves<F: Fn(&Leaf) -> bool>(node: &mut Node, targets: &F) -> bool {
    match node {
        Node::Leaf(leaf) => !targets(leaf),
        Node::And(g) => {
            g.and.retain_mut(|c| prune_leaves(c, targets));
            !g.and.is_empty()
        }
        Node::Or(g) => {
            g.or.retain_mut(|c| prune_leaves(c, targets));
            !g.or.is_empty()
        }
    }
}

fn prune_buckets<F: Fn(&Leaf) -> bool>(node: &mut Node, in_bucket: &F) -> bool {
    match node {
        Node::Leaf(_) => true,
        Node::Or(g) => !g.or.iter().any(|c| c.as_leaf().is_some_and(in_bucket)),
        Node::And(g) => {
            g.and.retain_mut(|c| prune_buckets(c, in_bucket));
            !g.and.is_empty()
        }
    }
}

// =============================================================================
// Field paths
// =============================================================================

fn field_path_regex() -> &'static Regex {
    static FIELD_PATH: OnceLock<Regex> = OnceLock::new();
    FIELD_PATH.get_or_init(|| {
        // Segments are identifiers or double-quoted names ("Profile"."nickname")
        Regex::new(r#"^(?:[A-Za-z_][A-Za-z0-9_]*|"[^"]+")(?:\.(?:[A-Za-z_][A-Za-z0-9_]*|"[^"]+"))*$"#)
            .expect("field path regex is valid")
    })
}

pub fn is_valid_field_path(field: &str) -> bool {
    field_path_regex().is_match(field)
}

pub fn validate_field_path(field: &str) -> Result<(), ValidationError> {
    if is_valid_field_path(field) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFieldPath {
            field: field.to_string(),
        })
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Resolve a dotted path inside a JSON row
///
/// A literal key equal to the whole path wins over nested lookup.
pub fn lookup<'a>(row: &'a Value, field: &str) -> Option<&'a Value> {
    if let Some(v) = row.get(field) {
        return Some(v);
    }
    field
        .split('.')
        .map(|seg| seg.trim_matches('"'))
        .try_fold(row, |current, seg| current.get(seg))
}

fn leaf_matches(leaf: &Leaf, row: &Value) -> bool {
    let Some(actual) = lookup(row, &leaf.field) else {
        return false;
    };
    match leaf.op {
        Op::Eq => value_eq(actual, &leaf.value),
        Op::In => match &leaf.value {
            FilterValue::List(items) => items.iter().any(|v| value_eq(actual, v)),
            single => value_eq(actual, single),
        },
        Op::Like | Op::Ilike => {
            let (Some(text), Some(pattern)) = (scalar_text(actual), leaf.value.as_text()) else {
                return false;
            };
            like_match(&text, pattern, leaf.op == Op::Ilike)
        }
        Op::Gte => compare(actual, &leaf.value).is_some_and(|o| o != Ordering::Less),
        Op::Lte => compare(actual, &leaf.value).is_some_and(|o| o != Ordering::Greater),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_eq(actual: &Value, expected: &FilterValue) -> bool {
    match (actual, expected) {
        (Value::String(a), FilterValue::Text(e)) => a == e,
        (Value::Number(a), FilterValue::Number(e)) => a.as_f64() == e.as_f64(),
        // Select widgets hand numeric keys over as strings
        (Value::Number(a), FilterValue::Text(e)) => {
            e.parse::<f64>().ok().is_some_and(|e| a.as_f64() == Some(e))
        }
        (Value::String(a), FilterValue::Number(e)) => {
            a.parse::<f64>().ok().is_some_and(|a| Some(a) == e.as_f64())
        }
        (Value::Bool(a), FilterValue::Text(e)) => a.to_string() == *e,
        _ => false,
    }
}

fn compare(actual: &Value, bound: &FilterValue) -> Option<Ordering> {
    match (actual, bound) {
        (Value::Number(a), FilterValue::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), FilterValue::Text(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Number(a), FilterValue::Text(b)) => a.as_f64()?.partial_cmp(&b.parse::<f64>().ok()?),
        _ => None,
    }
}

/// SQL `LIKE` semantics; a pattern without `%` matches anywhere in the text
///
/// `_` stays a single-character wildcard in both forms.
pub fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (text, mut pattern) = if case_insensitive {
        (text.to_lowercase(), pattern.to_lowercase())
    } else {
        (text.to_string(), pattern.to_string())
    };
    if !pattern.contains('%') {
        pattern = format!("%{}%", pattern);
    }
    let text: Vec<char> = text.chars().collect();
    let pat: Vec<char> = pattern.chars().collect();
    wildcard_match(&text, &pat)
}

fn wildcard_match(text: &[char], pat: &[char]) -> bool {
    let (mut t, mut p) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;
    while t < text.len() {
        if p < pat.len() && (pat[p] == '_' || pat[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pat.len() && pat[p] == '%' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }
    while p < pat.len() && pat[p] == '%' {
        p += 1;
    }
    p == pat.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn type_bucket() -> Node {
        Node::any_of("transactions.type", ["deposit", "withdrawal"])
    }

    #[test]
    fn test_wire_shape() {
        let filters = vec![Node::and(vec![
            type_bucket(),
            Node::leaf("profiles.nickname", Op::Ilike, "alice"),
        ])];
        let json = serde_json::to_value(&filters).unwrap();
        assert_eq!(
            json,
            json!([{"and": [
                {"or": [
                    {"field": "transactions.type", "op": "eq", "value": "deposit"},
                    {"field": "transactions.type", "op": "eq", "value": "withdrawal"}
                ]},
                {"field": "profiles.nickname", "op": "ilike", "value": "alice"}
            ]}])
        );

        let parsed: Vec<Node> = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, filters);
    }

    #[test]
    fn test_numeric_and_array_values_parse() {
        let node: Node = serde_json::from_value(
            json!({"field": "profiles.level", "op": "in", "value": [1, 2, "vip"]}),
        )
        .unwrap();
        let leaf = node.as_leaf().unwrap();
        assert_eq!(leaf.op, Op::In);
        assert_eq!(
            leaf.value,
            FilterValue::List(vec![1i64.into(), 2i64.into(), "vip".into()])
        );
    }

    #[test]
    fn test_append_to_root_creates_group() {
        let mut filters = Vec::new();
        append_to_root(&mut filters, Node::eq("users.role", "U"));
        assert_eq!(filters, vec![Node::and(vec![Node::eq("users.role", "U")])]);
    }

    #[test]
    fn test_append_to_root_reuses_first_and_group() {
        let mut filters = vec![Node::eq("a", "1"), Node::and(vec![type_bucket()])];
        append_to_root(&mut filters, Node::eq("users.role", "U"));
        assert_eq!(filters.len(), 2);
        match &filters[1] {
            Node::And(g) => assert_eq!(g.and.len(), 2),
            other => panic!("expected and-group, got {:?}", other),
        }
    }

    #[test]
    fn test_remove_field_cascades_empty_groups() {
        let mut filters = vec![Node::and(vec![
            Node::or(vec![Node::eq("users.role", "U")]),
            Node::eq("users.role", "P"),
        ])];
        remove_field(&mut filters, "users.role");
        assert!(filters.is_empty());
    }

    #[test]
    fn test_remove_field_keeps_siblings() {
        let mut filters = vec![Node::and(vec![
            type_bucket(),
            Node::or(vec![
                Node::eq("users.role", "U"),
                Node::eq("profiles.level", "3"),
            ]),
        ])];
        remove_field(&mut filters, "users.role");
        assert_eq!(
            filters,
            vec![Node::and(vec![
                type_bucket(),
                Node::or(vec![Node::eq("profiles.level", "3")]),
            ])]
        );
        assert!(!has_empty_group(&filters));
    }

    #[test]
    fn test_remove_bucket_drops_whole_or_group() {
        let search = Node::or(vec![
            Node::leaf("profiles.nickname", Op::Ilike, "bob"),
            Node::leaf("users.userid", Op::Ilike, "bob"),
        ]);
        let mut filters = vec![Node::and(vec![type_bucket(), search])];
        remove_bucket(&mut filters, &["profiles.nickname", "profiles.phone"]);
        assert_eq!(filters, vec![Node::and(vec![type_bucket()])]);
    }

    #[test]
    fn test_remove_bucket_cascades_and_group() {
        let mut filters = vec![Node::and(vec![Node::or(vec![Node::leaf(
            "created_at",
            Op::Gte,
            "2024-01-01",
        )])])];
        remove_bucket(&mut filters, &["created_at"]);
        assert!(filters.is_empty());
    }

    #[test]
    fn test_remove_root_leaves_spares_buckets() {
        let mut filters = vec![Node::and(vec![
            type_bucket(),
            Node::eq("transactions.type", "deposit"),
        ])];
        remove_root_leaves(&mut filters, "transactions.type");
        assert_eq!(filters, vec![Node::and(vec![type_bucket()])]);

        let mut only_leaf = vec![Node::and(vec![Node::eq("profiles.level", "3")])];
        remove_root_leaves(&mut only_leaf, "profiles.level");
        assert!(only_leaf.is_empty());
    }

    #[test]
    fn test_field_path_validation() {
        assert!(is_valid_field_path("profiles.nickname"));
        assert!(is_valid_field_path("id"));
        assert!(is_valid_field_path(r#""Profile"."nickname""#));
        assert!(!is_valid_field_path(""));
        assert!(!is_valid_field_path("profiles..nickname"));
        assert!(!is_valid_field_path("1abc"));
        assert!(validate_field_path("drop table; --").is_err());
    }

    #[test]
    fn test_lookup_nested_and_literal() {
        let row = json!({"profiles": {"nickname": "alice"}, "users.userid": "u1"});
        assert_eq!(lookup(&row, "profiles.nickname"), Some(&json!("alice")));
        assert_eq!(lookup(&row, "users.userid"), Some(&json!("u1")));
        assert_eq!(lookup(&row, r#""profiles"."nickname""#), Some(&json!("alice")));
        assert_eq!(lookup(&row, "profiles.phone"), None);
    }

    #[test]
    fn test_matches_operators() {
        let row = json!({"amount": 1500, "type": "deposit", "name": "Alice Kim"});
        assert!(Node::eq("type", "deposit").matches(&row));
        assert!(Node::eq("amount", "1500").matches(&row));
        assert!(Node::leaf("type", Op::In, vec!["deposit", "point"]).matches(&row));
        assert!(Node::leaf("name", Op::Ilike, "alice").matches(&row));
        assert!(!Node::leaf("name", Op::Like, "alice").matches(&row));
        assert!(Node::leaf("name", Op::Like, "A%Kim").matches(&row));
        assert!(Node::leaf("amount", Op::Gte, 1000i64).matches(&row));
        assert!(!Node::leaf("amount", Op::Lte, 1000i64).matches(&row));
        assert!(!Node::eq("missing", "x").matches(&row));
    }

    #[test]
    fn test_empty_groups_evaluate() {
        let row = json!({});
        assert!(Node::and(vec![]).matches(&row));
        assert!(!Node::or(vec![]).matches(&row));
    }

    #[test]
    fn test_like_wildcards() {
        assert!(like_match("user_01", "user_01", false));
        assert!(like_match("abc", "a_c%", false));
        assert!(like_match("abcdef", "%def", false));
        assert!(!like_match("abcdef", "%deg", false));
        assert!(like_match("ABC", "%b%", true));
        assert!(like_match("abc", "a_c", false));
        assert!(like_match("xxabcxx", "a_c", false));
        assert!(!like_match("ac", "a_c", false));
        assert!(like_match("Alice", "lic", false));
    }
}
