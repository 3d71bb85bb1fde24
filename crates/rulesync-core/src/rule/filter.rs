use crate::error::{Result, RuleSyncError};

use super::record::{RuleRecord, MAX_FIELDS};

/// Partial rule pattern: constraint values applied to consecutive positions
/// starting at `field_index`. An empty value is a wildcard for its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFilter {
    pub field_index: usize,
    pub field_values: Vec<String>,
}

impl RuleFilter {
    pub fn new<S: AsRef<str>>(field_index: usize, field_values: &[S]) -> Self {
        Self {
            field_index,
            field_values: field_values.iter().map(|v| v.as_ref().to_owned()).collect(),
        }
    }

    /// True when `rule` satisfies every non-wildcard constraint. Positions
    /// past the last stored column are ignored, as in `to_predicate`; other
    /// positions the rule does not have never satisfy a constraint.
    pub fn matches_rule<S: AsRef<str>>(&self, rule: &[S]) -> bool {
        self.field_values.iter().enumerate().all(|(offset, want)| {
            let pos = self.field_index + offset;
            want.is_empty()
                || pos >= MAX_FIELDS
                || rule.get(pos).is_some_and(|have| have.as_ref() == want)
        })
    }

    /// Storage predicate for this filter. Positions past the last stored
    /// column are ignored.
    pub fn to_predicate(&self, ptype: &str) -> RowPredicate {
        let constraints = (0..MAX_FIELDS)
            .filter(|p| *p >= self.field_index && *p < self.field_index + self.field_values.len())
            .filter_map(|p| {
                let want = &self.field_values[p - self.field_index];
                (!want.is_empty()).then(|| (p, want.clone()))
            })
            .collect();
        RowPredicate {
            ptype: ptype.to_owned(),
            constraints,
        }
    }
}

/// Equality predicate over stored rows: `ptype` plus `(position, value)`
/// pairs. This is what table implementations evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPredicate {
    pub ptype: String,
    pub constraints: Vec<(usize, String)>,
}

impl RowPredicate {
    /// Exact match on every supplied position. Empty strings are matched
    /// literally; positions not supplied are unconstrained.
    pub fn exact<S: AsRef<str>>(ptype: &str, rule: &[S]) -> Result<Self> {
        if rule.len() > MAX_FIELDS {
            return Err(RuleSyncError::BadRequest(format!(
                "rule has {} fields, at most {MAX_FIELDS} are stored",
                rule.len()
            )));
        }
        Ok(Self {
            ptype: ptype.to_owned(),
            constraints: rule
                .iter()
                .enumerate()
                .map(|(p, v)| (p, v.as_ref().to_owned()))
                .collect(),
        })
    }

    pub fn matches(&self, record: &RuleRecord) -> bool {
        record.ptype == self.ptype
            && self
                .constraints
                .iter()
                .all(|(p, want)| {
                    record.values.get(*p).and_then(|v| v.as_deref()) == Some(want.as_str())
                })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn wildcards_are_skipped() {
        let pred = RuleFilter::new(1, &["", "read"]).to_predicate("p");
        assert_eq!(pred.constraints, vec![(2, "read".to_string())]);
    }

    #[test]
    fn out_of_range_positions_ignored() {
        let pred = RuleFilter::new(5, &["x", "y", "z"]).to_predicate("p");
        assert_eq!(pred.constraints, vec![(5, "x".to_string())]);
    }

    #[test]
    fn exact_matches_literal_empty_but_not_unset() {
        let pred = RowPredicate::exact("p", &["alice", ""]).unwrap();
        let with_empty = RuleRecord::from_rule("p", &["alice", ""]).unwrap();
        let unset = RuleRecord::from_rule("p", &["alice"]).unwrap();
        assert!(pred.matches(&with_empty));
        assert!(!pred.matches(&unset));
    }

    #[test]
    fn ptype_must_match() {
        let pred = RowPredicate::exact("g", &["alice"]).unwrap();
        let r = RuleRecord::from_rule("p", &["alice"]).unwrap();
        assert!(!pred.matches(&r));
    }

    #[test]
    fn rule_side_matching() {
        let f = RuleFilter::new(0, &["alice", ""]);
        assert!(f.matches_rule(&["alice", "data1", "read"]));
        assert!(!f.matches_rule(&["bob", "data1", "read"]));
        assert!(!RuleFilter::new(3, &["allow"]).matches_rule(&["alice", "data1", "read"]));
    }

    #[test]
    fn rule_side_agrees_with_storage_past_last_column() {
        let f = RuleFilter::new(5, &["x", "y"]);
        assert_eq!(f.to_predicate("p").constraints, vec![(5, "x".to_string())]);
        assert!(!f.matches_rule(&["a", "b", "c", "d", "e", "z"]));
        assert!(f.matches_rule(&["a", "b", "c", "d", "e", "x"]));

        // Nothing left to constrain: every rule of the ptype matches.
        let beyond = RuleFilter::new(6, &["x"]);
        assert!(beyond.to_predicate("p").constraints.is_empty());
        assert!(beyond.matches_rule(&["alice", "data1", "read"]));
    }
}
