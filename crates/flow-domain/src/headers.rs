//! Case-insensitive, order-preserving header multimap.
//!
//! Header names are stored lower-cased for lookup but the original casing of
//! the first occurrence is kept for serialization, matching the wire-format
//! expectation that readers tolerate arbitrary casing on input. Values for a
//! given name are kept in an ordered list, since repeated headers (e.g.
//! `Set-Cookie`) are meaningful in mitmproxy-style flow tracking.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    // key: lower-cased header name -> (original-case name, ordered values)
    entries: IndexMap<String, (String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Appends a value, preserving any existing values under that name.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let key = name.to_ascii_lowercase();
        self.entries
            .entry(key)
            .or_insert_with(|| (name.to_string(), Vec::new()))
            .1
            .push(value.into());
    }

    /// Replaces all values under `name` with a single value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let key = name.to_ascii_lowercase();
        self.entries.insert(key, (name.to_string(), vec![value.into()]));
    }

    /// Replaces all values under `name` with the given list.
    pub fn set_all(&mut self, name: &str, values: Vec<String>) {
        let key = name.to_ascii_lowercase();
        self.entries.insert(key, (name.to_string(), values));
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.entries.shift_remove(&name.to_ascii_lowercase()).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(_, (name, values))| (name.as_str(), values.as_slice()))
    }

    /// Serializable shape used by the flow log / snapshot format: an ordered
    /// list of (name, [values]) pairs.
    pub fn to_pairs(&self) -> Vec<(String, Vec<String>)> {
        self.entries.values().cloned().collect()
    }

    pub fn from_pairs(pairs: Vec<(String, Vec<String>)>) -> Self {
        let mut h = Self::new();
        for (name, values) in pairs {
            h.set_all(&name, values);
        }
        h
    }

    /// Applies a literal or regex substitution across all header names and
    /// values. Returns the number of replacements made.
    pub fn replace(&mut self, pattern: &regex::Regex, replacement: &str) -> usize {
        let mut count = 0;
        let mut rebuilt: IndexMap<String, (String, Vec<String>)> = IndexMap::new();
        for (_, (name, values)) in self.entries.drain(..) {
            let (new_name, n) = replace_count(pattern, &name, replacement);
            count += n;
            let mut new_values = Vec::with_capacity(values.len());
            for v in values {
                let (nv, n) = replace_count(pattern, &v, replacement);
                count += n;
                new_values.push(nv);
            }
            let key = new_name.to_ascii_lowercase();
            rebuilt.insert(key, (new_name, new_values));
        }
        self.entries = rebuilt;
        count
    }
}

fn replace_count(pattern: &regex::Regex, input: &str, replacement: &str) -> (String, usize) {
    let count = pattern.find_iter(input).count();
    let replaced = pattern.replace_all(input, replacement).into_owned();
    (replaced, count)
}
