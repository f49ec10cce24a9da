use std::collections::{HashMap, HashSet};

use crate::domain::ModToken;

/// Last-known token per entry name.
///
/// Not synchronized; the owning tracker serializes access.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    tokens: HashMap<String, ModToken>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ModToken> {
        self.tokens.get(name).copied()
    }

    /// Records `token` for `name`, returning the token it replaced.
    pub fn set(&mut self, name: &str, token: ModToken) -> Option<ModToken> {
        self.tokens.insert(name.to_owned(), token)
    }

    pub fn remove(&mut self, name: &str) -> Option<ModToken> {
        self.tokens.remove(name)
    }

    pub fn keys(&self) -> HashSet<String> {
        self.tokens.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tokens.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
