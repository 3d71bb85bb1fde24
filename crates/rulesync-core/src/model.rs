//! In-memory policy model (engine side).
//!
//! Holds the opaque model definition text and the loaded rules, grouped by
//! section (`p`, `g`, ...) and `ptype`. The section of a `ptype` is its first
//! character. Rule evaluation lives in the engine, not here.

use std::collections::BTreeMap;

use crate::error::{Result, RuleSyncError};
use crate::rule::RuleFilter;

type Rules = Vec<Vec<String>>;

#[derive(Debug, Clone, Default)]
pub struct PolicyModel {
    definition: String,
    sections: BTreeMap<String, BTreeMap<String, Rules>>,
}

/// Section key for a `ptype` (`"p2"` -> `"p"`).
pub fn section_of(ptype: &str) -> Result<String> {
    ptype
        .chars()
        .next()
        .map(String::from)
        .ok_or_else(|| RuleSyncError::BadRequest("empty ptype".into()))
}

impl PolicyModel {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
            sections: BTreeMap::new(),
        }
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Same definition, no rules.
    pub fn empty_copy(&self) -> Self {
        Self::new(self.definition.clone())
    }

    /// Parse one textual rule line (`"p, alice, data1, read"`) into the model.
    /// Blank lines and `#` comments are ignored.
    pub fn load_policy_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }
        let mut tokens = line.split(',').map(str::trim);
        let ptype = tokens.next().unwrap_or_default();
        if ptype.is_empty() {
            return Err(RuleSyncError::BadRequest(format!("policy line without ptype: {line}")));
        }
        let rule: Vec<String> = tokens.map(str::to_owned).collect();
        self.load_rule(ptype, &rule)
    }

    /// Append `rule` as storage holds it, duplicates included.
    pub fn load_rule<S: AsRef<str>>(&mut self, ptype: &str, rule: &[S]) -> Result<()> {
        self.rules_mut(ptype)?.push(to_owned_rule(rule));
        Ok(())
    }

    /// `(ptype, rules)` pairs of one section, ordered by ptype.
    pub fn assertions(&self, sec: &str) -> impl Iterator<Item = (&str, &[Vec<String>])> {
        self.sections
            .get(sec)
            .into_iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v.as_slice())))
    }

    pub fn policy(&self, ptype: &str) -> &[Vec<String>] {
        section_of(ptype)
            .ok()
            .and_then(|sec| self.sections.get(&sec))
            .and_then(|m| m.get(ptype))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn policy_count(&self) -> usize {
        self.sections.values().flat_map(BTreeMap::values).map(Vec::len).sum()
    }

    pub fn has_policy<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> bool {
        self.policy(ptype).iter().any(|r| same_rule(r, rule))
    }

    pub fn add_policy<S: AsRef<str>>(&mut self, ptype: &str, rule: &[S]) -> Result<bool> {
        if self.has_policy(ptype, rule) {
            return Ok(false);
        }
        self.rules_mut(ptype)?.push(to_owned_rule(rule));
        Ok(true)
    }

    /// All-or-nothing: adds nothing if any rule is already present.
    pub fn add_policies<S: AsRef<str>>(&mut self, ptype: &str, rules: &[Vec<S>]) -> Result<bool> {
        if rules.iter().any(|r| self.has_policy(ptype, r)) {
            return Ok(false);
        }
        let target = self.rules_mut(ptype)?;
        target.extend(rules.iter().map(|r| to_owned_rule(r)));
        Ok(true)
    }

    pub fn remove_policy<S: AsRef<str>>(&mut self, ptype: &str, rule: &[S]) -> bool {
        let Some(rules) = self.existing_mut(ptype) else { return false; };
        match rules.iter().position(|r| same_rule(r, rule)) {
            Some(i) => {
                rules.remove(i);
                true
            }
            None => false,
        }
    }

    /// All-or-nothing: removes nothing if any rule is missing.
    pub fn remove_policies<S: AsRef<str>>(&mut self, ptype: &str, rules: &[Vec<S>]) -> bool {
        if !rules.iter().all(|r| self.has_policy(ptype, r)) {
            return false;
        }
        for r in rules {
            self.remove_policy(ptype, r);
        }
        true
    }

    /// Replace `old` in place, keeping its position.
    pub fn update_policy<S: AsRef<str>, T: AsRef<str>>(
        &mut self,
        ptype: &str,
        old: &[S],
        new: &[T],
    ) -> bool {
        let Some(rules) = self.existing_mut(ptype) else { return false; };
        match rules.iter_mut().find(|r| same_rule(r.as_slice(), old)) {
            Some(slot) => {
                *slot = to_owned_rule(new);
                true
            }
            None => false,
        }
    }

    /// Remove every rule matching `filter`; returns the removed rules in model
    /// order.
    pub fn remove_filtered_policy(&mut self, ptype: &str, filter: &RuleFilter) -> Rules {
        let Some(rules) = self.existing_mut(ptype) else { return Vec::new(); };
        let (removed, kept): (Rules, Rules) =
            std::mem::take(rules).into_iter().partition(|r| filter.matches_rule(r));
        *rules = kept;
        removed
    }

    fn existing_mut(&mut self, ptype: &str) -> Option<&mut Rules> {
        let sec = section_of(ptype).ok()?;
        self.sections.get_mut(&sec)?.get_mut(ptype)
    }

    fn rules_mut(&mut self, ptype: &str) -> Result<&mut Rules> {
        let sec = section_of(ptype)?;
        Ok(self
            .sections
            .entry(sec)
            .or_default()
            .entry(ptype.to_owned())
            .or_default())
    }
}

fn same_rule<S: AsRef<str>>(have: &[String], want: &[S]) -> bool {
    have.len() == want.len() && have.iter().zip(want).all(|(a, b)| a == b.as_ref())
}

fn to_owned_rule<S: AsRef<str>>(rule: &[S]) -> Vec<String> {
    rule.iter().map(|v| v.as_ref().to_owned()).collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn line_parser_splits_and_trims() {
        let mut m = PolicyModel::default();
        m.load_policy_line("p, alice, data1, read").unwrap();
        m.load_policy_line("g,bob , admin").unwrap();
        m.load_policy_line("# comment").unwrap();
        m.load_policy_line("   ").unwrap();
        assert_eq!(m.policy("p"), &[vec!["alice", "data1", "read"]]);
        assert_eq!(m.policy("g"), &[vec!["bob", "admin"]]);
        assert_eq!(m.assertions("g").count(), 1);
        assert_eq!(m.policy_count(), 2);
    }

    #[test]
    fn line_without_ptype_rejected() {
        let mut m = PolicyModel::default();
        assert!(m.load_policy_line(", alice").is_err());
    }

    #[test]
    fn batch_add_is_all_or_nothing() {
        let mut m = PolicyModel::default();
        assert!(m.add_policy("p", &["alice", "data1", "read"]).unwrap());
        let batch = vec![vec!["bob", "data2", "write"], vec!["alice", "data1", "read"]];
        assert!(!m.add_policies("p", &batch).unwrap());
        assert_eq!(m.policy("p").len(), 1);
    }

    #[test]
    fn filtered_removal_honours_wildcards() {
        let mut m = PolicyModel::default();
        m.add_policy("p", &["alice", "data1", "read"]).unwrap();
        m.add_policy("p", &["alice", "data2", "read"]).unwrap();
        m.add_policy("p", &["bob", "data1", "read"]).unwrap();
        let removed = m.remove_filtered_policy("p", &RuleFilter::new(0, &["alice", ""]));
        assert_eq!(removed.len(), 2);
        assert_eq!(m.policy("p"), &[vec!["bob", "data1", "read"]]);
    }

    #[test]
    fn load_rule_keeps_duplicates() {
        let mut m = PolicyModel::default();
        m.add_policy("p", &["a"]).unwrap();
        m.load_rule("p", &["a"]).unwrap();
        assert_eq!(m.policy("p"), &[vec!["a"], vec!["a"]]);
        assert!(!m.add_policy("p", &["a"]).unwrap());
    }

    #[test]
    fn update_keeps_position() {
        let mut m = PolicyModel::default();
        m.add_policy("p", &["a"]).unwrap();
        m.add_policy("p", &["b"]).unwrap();
        assert!(m.update_policy("p", &["a"], &["c"]));
        assert_eq!(m.policy("p"), &[vec!["c"], vec!["b"]]);
        assert!(!m.update_policy("p", &["zzz"], &["d"]));
    }
}
