//! Differ - Set-difference of nested blocks
//!
//! Repeated blocks (backends, headers, snippets, ...) are unordered
//! collections keyed by an identity attribute, normally `name`. Comparing the
//! previous and the desired collection partitions entries into added, deleted
//! and modified ones, which is what the block handlers need to issue the
//! minimal set of API calls.

use std::collections::{BTreeMap, HashMap};

use crate::resource::Value;

pub type Block = HashMap<String, Value>;

/// Errors raised when a collection cannot be keyed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiffError {
    #[error("Block entry has no key attribute")]
    MissingKey,

    #[error("Duplicate block key '{0}'")]
    DuplicateKey(String),
}

/// An entry present on both sides with differing attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Modified {
    pub key: String,
    pub old: Block,
    pub new: Block,
    /// Changed attributes with their new value; attributes removed on the new
    /// side carry the zero value of their old type
    pub changes: Block,
}

impl Modified {
    /// Sorted names of the changed attributes
    pub fn changed_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.changes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Result of a set diff, each list sorted by key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetDiffResult {
    pub added: Vec<Block>,
    pub deleted: Vec<Block>,
    pub modified: Vec<Modified>,
}

impl SetDiffResult {
    /// Returns whether this diff involves a change
    pub fn is_change(&self) -> bool {
        !(self.added.is_empty() && self.deleted.is_empty() && self.modified.is_empty())
    }
}

/// Set-diff keyed by an identity function
pub struct SetDiff<F> {
    key: F,
}

impl SetDiff<fn(&Block) -> Option<String>> {
    /// Key entries by their `name` attribute
    pub fn by_name() -> Self {
        Self::new(name_key)
    }
}

fn name_key(block: &Block) -> Option<String> {
    block.get("name").and_then(Value::as_str).map(str::to_string)
}

impl<F> SetDiff<F>
where
    F: Fn(&Block) -> Option<String>,
{
    pub fn new(key: F) -> Self {
        Self { key }
    }

    /// Partition `old` and `new` into added, deleted and modified entries
    pub fn diff(&self, old: &[Block], new: &[Block]) -> Result<SetDiffResult, DiffError> {
        let old = self.index(old)?;
        let new = self.index(new)?;

        let mut result = SetDiffResult::default();

        for (key, old_block) in &old {
            match new.get(key) {
                None => result.deleted.push((*old_block).clone()),
                Some(new_block) => {
                    let changes = changed_values(new_block, old_block);
                    if !changes.is_empty() {
                        result.modified.push(Modified {
                            key: key.clone(),
                            old: (*old_block).clone(),
                            new: (*new_block).clone(),
                            changes,
                        });
                    }
                }
            }
        }

        for (key, new_block) in &new {
            if !old.contains_key(key) {
                result.added.push((*new_block).clone());
            }
        }

        log::debug!(
            "set diff: {} added, {} deleted, {} modified",
            result.added.len(),
            result.deleted.len(),
            result.modified.len()
        );
        Ok(result)
    }

    fn index<'a>(&self, blocks: &'a [Block]) -> Result<BTreeMap<String, &'a Block>, DiffError> {
        let mut index = BTreeMap::new();
        for block in blocks {
            let key = (self.key)(block).ok_or(DiffError::MissingKey)?;
            if index.insert(key.clone(), block).is_some() {
                return Err(DiffError::DuplicateKey(key));
            }
        }
        Ok(index)
    }
}

/// Find changed attributes between desired and current state
///
/// Attributes starting with `_` are internal and never compared.
pub fn changed_attributes(desired: &Block, current: &Block) -> Vec<String> {
    let mut changed: Vec<String> = changed_values(desired, current).into_keys().collect();
    changed.sort();
    changed
}

fn changed_values(desired: &Block, current: &Block) -> Block {
    let mut changes = HashMap::new();

    for (key, desired_value) in desired {
        if key.starts_with('_') {
            continue;
        }
        match current.get(key) {
            Some(current_value) if current_value == desired_value => {}
            // Unset and zero are the same thing once flattened
            None if desired_value.is_zero() => {}
            _ => {
                changes.insert(key.clone(), desired_value.clone());
            }
        }
    }

    for (key, current_value) in current {
        if key.starts_with('_') || desired.contains_key(key) || current_value.is_zero() {
            continue;
        }
        changes.insert(key.clone(), zero_like(current_value));
    }

    changes
}

fn zero_like(value: &Value) -> Value {
    match value {
        Value::String(_) => Value::String(String::new()),
        Value::Int(_) => Value::Int(0),
        Value::Bool(_) => Value::Bool(false),
        Value::List(_) => Value::List(Vec::new()),
        Value::Map(_) => Value::Map(HashMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(pairs: &[(&str, Value)]) -> Block {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn partitions_added_deleted_modified() {
        let old = vec![
            block(&[("name", "origin".into()), ("port", Value::Int(80))]),
            block(&[("name", "legacy".into()), ("port", Value::Int(80))]),
            block(&[("name", "static".into()), ("port", Value::Int(443))]),
        ];
        let new = vec![
            block(&[("name", "static".into()), ("port", Value::Int(443))]),
            block(&[("name", "origin".into()), ("port", Value::Int(443))]),
            block(&[("name", "api".into()), ("port", Value::Int(8080))]),
        ];

        let result = SetDiff::by_name().diff(&old, &new).unwrap();

        assert_eq!(result.added.len(), 1);
        assert_eq!(result.added[0].get("name"), Some(&Value::from("api")));
        assert_eq!(result.deleted.len(), 1);
        assert_eq!(result.deleted[0].get("name"), Some(&Value::from("legacy")));
        assert_eq!(result.modified.len(), 1);
        assert_eq!(result.modified[0].key, "origin");
        assert_eq!(result.modified[0].changed_names(), vec!["port"]);
        assert_eq!(
            result.modified[0].changes.get("port"),
            Some(&Value::Int(443))
        );
    }

    #[test]
    fn identical_sets_are_not_a_change() {
        let blocks = vec![block(&[("name", "origin".into())])];
        let result = SetDiff::by_name().diff(&blocks, &blocks).unwrap();
        assert!(!result.is_change());
    }

    #[test]
    fn removed_attribute_is_reset_to_zero() {
        let old = vec![block(&[
            ("name", "origin".into()),
            ("shield", "iad-va-us".into()),
        ])];
        let new = vec![block(&[("name", "origin".into())])];

        let result = SetDiff::by_name().diff(&old, &new).unwrap();
        assert_eq!(
            result.modified[0].changes.get("shield"),
            Some(&Value::from(""))
        );
    }

    #[test]
    fn explicit_zero_matches_unset() {
        let old = vec![block(&[("name", "origin".into())])];
        let new = vec![block(&[("name", "origin".into()), ("use_ssl", Value::Bool(false))])];
        let result = SetDiff::by_name().diff(&old, &new).unwrap();
        assert!(!result.is_change());
    }

    #[test]
    fn missing_and_duplicate_keys_are_errors() {
        let unnamed = vec![block(&[("port", Value::Int(80))])];
        assert_eq!(
            SetDiff::by_name().diff(&[], &unnamed),
            Err(DiffError::MissingKey)
        );

        let dup = vec![
            block(&[("name", "origin".into())]),
            block(&[("name", "origin".into())]),
        ];
        assert_eq!(
            SetDiff::by_name().diff(&dup, &[]),
            Err(DiffError::DuplicateKey("origin".to_string()))
        );
    }

    #[test]
    fn custom_key_function() {
        let key = |b: &Block| b.get("domain").and_then(Value::as_str).map(str::to_string);
        let old = vec![block(&[("domain", "a.example.com".into())])];
        let new = vec![block(&[("domain", "b.example.com".into())])];
        let result = SetDiff::new(key).diff(&old, &new).unwrap();
        assert_eq!(result.added.len(), 1);
        assert_eq!(result.deleted.len(), 1);
    }

    #[test]
    fn changed_attributes_skips_internal_keys() {
        let desired = block(&[("name", "svc".into()), ("_cloned", Value::Int(2))]);
        let current = block(&[("name", "svc-old".into()), ("_cloned", Value::Int(1))]);
        assert_eq!(changed_attributes(&desired, &current), vec!["name"]);
    }
}
