use crate::error::{Result, RuleSyncError};

/// Number of positional value columns in a stored row.
pub const MAX_FIELDS: usize = 6;

/// Identity key assigned by storage.
pub type RowId = i64;

/// Row form of one rule: `ptype` plus six nullable positional values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRecord {
    pub ptype: String,
    pub values: [Option<String>; MAX_FIELDS],
}

impl RuleRecord {
    /// Encode a rule. Positions beyond `rule.len()` stay unset; empty strings
    /// are stored as given.
    pub fn from_rule<S: AsRef<str>>(ptype: &str, rule: &[S]) -> Result<Self> {
        if rule.len() > MAX_FIELDS {
            return Err(RuleSyncError::BadRequest(format!(
                "rule has {} fields, at most {MAX_FIELDS} are stored",
                rule.len()
            )));
        }
        let mut values: [Option<String>; MAX_FIELDS] = Default::default();
        for (slot, v) in values.iter_mut().zip(rule) {
            *slot = Some(v.as_ref().to_owned());
        }
        Ok(Self {
            ptype: ptype.to_owned(),
            values,
        })
    }

    /// Text line handed to the engine's line parser.
    ///
    /// Every empty or unset field is dropped, wherever it sits in the tuple,
    /// so `("p", "alice", "", "read")` becomes `"p, alice, read"`.
    pub fn to_policy_line(&self) -> String {
        std::iter::once(self.ptype.as_str())
            .chain(self.values.iter().filter_map(|v| v.as_deref()))
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Value tuple with trailing empty/unset positions trimmed. Interior unset
    /// positions read back as empty strings.
    pub fn trimmed_values(&self) -> Vec<String> {
        let end = self
            .values
            .iter()
            .rposition(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
            .map_or(0, |i| i + 1);
        self.values[..end]
            .iter()
            .map(|v| v.clone().unwrap_or_default())
            .collect()
    }
}

/// A persisted row: identity key plus record. `id` and `ptype` never change
/// after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRuleRow {
    pub id: RowId,
    pub record: RuleRecord,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn short_rule_leaves_tail_unset() {
        let r = RuleRecord::from_rule("p", &["alice", "data1", "read"]).unwrap();
        assert_eq!(r.values[2].as_deref(), Some("read"));
        assert!(r.values[3..].iter().all(Option::is_none));
    }

    #[test]
    fn seven_fields_rejected() {
        let err = RuleRecord::from_rule("p", &["a", "b", "c", "d", "e", "f", "g"]).unwrap_err();
        assert_eq!(err.kind().as_str(), "BAD_REQUEST");
    }

    #[test]
    fn line_drops_interior_empty_fields() {
        let r = RuleRecord::from_rule("p", &["alice", "", "read"]).unwrap();
        assert_eq!(r.to_policy_line(), "p, alice, read");
    }

    #[test]
    fn trimmed_values_keeps_interior_gaps() {
        let mut r = RuleRecord::from_rule("g", &["bob", "", "dom", "", ""]).unwrap();
        assert_eq!(r.trimmed_values(), vec!["bob", "", "dom"]);
        r.values = Default::default();
        assert!(r.trimmed_values().is_empty());
    }
}
