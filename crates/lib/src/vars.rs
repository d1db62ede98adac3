//! Runtime variables handed to a workflow and read through `getVar`.
//!
//! Priority, highest first: explicit `key=value` specs, the `input`/`output`/`help` slots,
//! then the process environment (names starting with `_` skipped).

use std::collections::HashMap;

/// Immutable key/value bag for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeVariables {
    values: HashMap<String, String>,
}

impl RuntimeVariables {
    pub fn builder() -> RuntimeVariablesBuilder {
        RuntimeVariablesBuilder::default()
    }

    /// Value for `key`, or `""` when unset.
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys in sorted order (for debug listings).
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RuntimeVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Accumulates variables in priority order; earlier writers win.
#[derive(Debug, Default)]
pub struct RuntimeVariablesBuilder {
    values: HashMap<String, String>,
}

impl RuntimeVariablesBuilder {
    /// `key=value` specs; the first `=` splits. Specs without `=` or with an empty key are ignored.
    /// A later spec for the same key replaces an earlier one.
    pub fn var_specs<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for spec in specs {
            if let Some((k, v)) = spec.as_ref().split_once('=') {
                let k = k.trim();
                if !k.is_empty() {
                    self.values.insert(k.to_string(), v.to_string());
                }
            }
        }
        self
    }

    /// Set `key` only if nothing has set it yet.
    pub fn slot(mut self, key: &str, value: Option<impl Into<String>>) -> Self {
        if let Some(v) = value {
            self.values.entry(key.to_string()).or_insert_with(|| v.into());
        }
        self
    }

    /// Add environment entries whose names do not start with `_` and are not already set.
    pub fn environment<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in vars {
            if k.is_empty() || k.starts_with('_') {
                continue;
            }
            self.values.entry(k).or_insert(v);
        }
        self
    }

    pub fn build(self) -> RuntimeVariables {
        RuntimeVariables {
            values: self.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn explicit_vars_beat_slots_and_environment() {
        let vars = RuntimeVariables::builder()
            .var_specs(["input=/a", "mode=fast"])
            .slot("input", Some("/b"))
            .slot("output", Some("/out"))
            .environment(env(&[("mode", "slow"), ("HOME", "/home/u")]))
            .build();
        assert_eq!(vars.get("input"), "/a");
        assert_eq!(vars.get("output"), "/out");
        assert_eq!(vars.get("mode"), "fast");
        assert_eq!(vars.get("HOME"), "/home/u");
    }

    #[test]
    fn underscore_env_names_and_bad_specs_are_skipped() {
        let vars = RuntimeVariables::builder()
            .var_specs(["noequals", "=x", "url=a=b"])
            .environment(env(&[("_", "/usr/bin/env"), ("_SECRET", "1")]))
            .build();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("url"), "a=b");
        assert!(!vars.contains("_SECRET"));
    }

    #[test]
    fn missing_key_reads_as_empty() {
        let vars = RuntimeVariables::default();
        assert_eq!(vars.get("nope"), "");
    }
}
