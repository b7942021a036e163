//! Value-substitution rules for cleaned tables
//!
//! A [`RuleSet`] is an ordered list of `(column, match, replacement)` rules.
//! Each rule only ever rewrites string cells that match it, so null cells are
//! left alone and running a set twice yields the same table as running it once
//! as long as no replacement matches an earlier rule.

use crate::normalize::table::Table;
use serde_json::Value;
use tracing::debug;

/// Leading token of link-valued event types, well-formed or not
pub const LINK_PREFIX: &str = "http";

pub const EVENT_TYPE: &str = "event_type";
pub const SHOW_ROOM_LABEL: &str = "Share Show Room:Studio";
pub const LEGACY_CONTENT_ADMIN: &str = "Share Presentation:ContentAdmin";
pub const CONTENT_ADMIN_LABEL: &str = "Share Presentation:Content Admin";

/// How a rule decides whether a cell matches
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact, case-sensitive equality
    Equals(String),
    /// Starts with the given text
    Prefix(String),
}

impl Matcher {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Equals(s) => text == s,
            Matcher::Prefix(p) => text.starts_with(p.as_str()),
        }
    }
}

/// Replace matching cells of `column` with a fixed value
#[derive(Debug, Clone)]
pub struct Rule {
    pub column: String,
    pub matcher: Matcher,
    pub replacement: Value,
}

impl Rule {
    pub fn new(column: impl Into<String>, matcher: Matcher, replacement: impl Into<Value>) -> Self {
        Rule {
            column: column.into(),
            matcher,
            replacement: replacement.into(),
        }
    }

    /// The replacement for one cell, or `None` if the cell does not match
    pub fn rewrite(&self, cell: &Value) -> Option<Value> {
        match cell {
            Value::String(s) if self.matcher.matches(s) && *cell != self.replacement => {
                Some(self.replacement.clone())
            }
            _ => None,
        }
    }

    /// Apply to a table, returning how many cells changed
    pub fn apply(&self, table: &mut Table) -> usize {
        let mut changed = 0;
        table.map_column(&self.column, |cell| {
            let out = self.rewrite(cell);
            if out.is_some() {
                changed += 1;
            }
            out
        });
        changed
    }
}

/// Ordered chain of rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet { rules: Vec::new() }
    }

    /// Add a rule at the end of the chain (builder pattern)
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rules for the share-event table
    pub fn share_events() -> Self {
        RuleSet::new()
            // Link-only event types are studio show-room shares
            .rule(Rule::new(
                EVENT_TYPE,
                Matcher::Prefix(LINK_PREFIX.to_string()),
                SHOW_ROOM_LABEL,
            ))
            .rule(Rule::new(
                EVENT_TYPE,
                Matcher::Equals(LEGACY_CONTENT_ADMIN.to_string()),
                CONTENT_ADMIN_LABEL,
            ))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order, returning the total number of changed cells
    pub fn apply(&self, table: &mut Table) -> usize {
        let mut changed = 0;
        for rule in &self.rules {
            changed += rule.apply(table);
        }
        if changed > 0 {
            debug!(table = %table.name, changed, "Applied cleaning rules");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::table::Row;
    use serde_json::json;

    fn events(types: Vec<Value>) -> Table {
        let rows: Vec<Row> = types
            .into_iter()
            .map(|t| serde_json::from_value(json!({ "event_type": t })).unwrap())
            .collect();
        Table::from_rows("share_events", rows)
    }

    fn types(table: &Table) -> Vec<Value> {
        table.column_values(EVENT_TYPE).unwrap().into_iter().cloned().collect()
    }

    #[test]
    fn test_url_event_type_is_labelled() {
        let mut t = events(vec![json!("https://x.io/show"), json!("http://a.b")]);
        RuleSet::share_events().apply(&mut t);

        assert_eq!(types(&t), vec![json!(SHOW_ROOM_LABEL), json!(SHOW_ROOM_LABEL)]);
    }

    #[test]
    fn test_legacy_label_is_renamed_exactly() {
        let mut t = events(vec![
            json!("Share Presentation:ContentAdmin"),
            json!("share presentation:contentadmin"),
            json!("Share Presentation:ContentAdmin v2"),
        ]);
        RuleSet::share_events().apply(&mut t);

        assert_eq!(
            types(&t),
            vec![
                json!(CONTENT_ADMIN_LABEL),
                json!("share presentation:contentadmin"),
                json!("Share Presentation:ContentAdmin v2"),
            ]
        );
    }

    #[test]
    fn test_nulls_and_non_strings_are_untouched() {
        let mut t = events(vec![json!(null), json!(42), json!("Share Deck")]);
        let changed = RuleSet::share_events().apply(&mut t);

        assert_eq!(changed, 0);
        assert_eq!(types(&t), vec![json!(null), json!(42), json!("Share Deck")]);
    }

    #[test]
    fn test_rules_are_idempotent() {
        let mut once = events(vec![
            json!("https://x.io/show"),
            json!("Share Presentation:ContentAdmin"),
            json!(null),
            json!("Share Deck"),
        ]);
        let rules = RuleSet::share_events();
        rules.apply(&mut once);

        let mut twice = once.clone();
        let changed = rules.apply(&mut twice);

        assert_eq!(changed, 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_column_is_noop() {
        let rows: Vec<Row> = vec![serde_json::from_value(json!({"insert_id": "i1"})).unwrap()];
        let mut t = Table::from_rows("share_events", rows);

        assert_eq!(RuleSet::share_events().apply(&mut t), 0);
    }

    #[test]
    fn test_malformed_links_are_labelled() {
        let mut t = events(vec![
            json!("http:/x.io/show"),
            json!("http//x.io"),
            json!("http:x.io"),
            json!("httpx.io/show"),
            json!("Share via http"),
        ]);
        let changed = RuleSet::share_events().apply(&mut t);

        assert_eq!(changed, 4);
        assert_eq!(
            types(&t),
            vec![
                json!(SHOW_ROOM_LABEL),
                json!(SHOW_ROOM_LABEL),
                json!(SHOW_ROOM_LABEL),
                json!(SHOW_ROOM_LABEL),
                json!("Share via http"),
            ]
        );
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        assert!(Matcher::Prefix(LINK_PREFIX.into()).matches("https://masterwizr.com/room"));
        assert!(!Matcher::Prefix(LINK_PREFIX.into()).matches("HTTPS://X.IO"));
    }
}
