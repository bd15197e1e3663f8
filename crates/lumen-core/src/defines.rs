//! Preprocessor define sets and their canonical string form.
//!
//! A defines string is a `;`-separated list of `NAME=VALUE` tokens. The
//! normalized form (sorted by name, duplicates collapsed, no trailing `;`)
//! is what variant caches key on, so `"B=1;A=0"` and `"A=0;B=1;"` select
//! the same compiled program.

use std::collections::BTreeMap;
use std::fmt;

/// Normalized set of `NAME=VALUE` defines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Defines {
    entries: BTreeMap<String, String>,
}

impl Defines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw defines string. A bare `NAME` means `NAME=1`; a later
    /// token for the same name overrides an earlier one.
    pub fn parse(raw: &str) -> Self {
        let mut entries = BTreeMap::new();
        for token in raw.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            let (name, value) = match token.split_once('=') {
                Some((n, v)) => (n.trim(), v.trim()),
                None => (token, "1"),
            };
            if name.is_empty() {
                continue;
            }
            entries.insert(name.to_string(), value.to_string());
        }
        Self { entries }
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.entries.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `NAME=VALUE` tokens, as handed to a shader compiler.
    pub fn tokens(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    /// Literal `NAME=1` test against the normalized string.
    pub fn is_set(&self, name: &str) -> bool {
        self.to_string().contains(&format!("{}=1", name))
    }

    pub fn hash(&self) -> u64 {
        fnv1a64(self.to_string().as_bytes())
    }
}

impl fmt::Display for Defines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

/// Normalize a raw defines string.
pub fn normalize(raw: &str) -> String {
    Defines::parse(raw).to_string()
}

/// Hash of the normalized form of `raw`.
pub fn defines_hash(raw: &str) -> u64 {
    Defines::parse(raw).hash()
}

/// Stable 64-bit hash used for uniform and defines lookups.
pub fn name_hash(name: &str) -> u64 {
    fnv1a64(name.as_bytes())
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
