//! Topic interning and wildcard matching.
//!
//! A prefix-trie keyed by `/`-separated level keeps `match` close to O(matched
//! results) rather than scanning every known topic name for every publish.

pub mod validate;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub use validate::{validate as validate_topic, ValidateError};

/// A stably-interned topic name. Two lookups of the same name yield the
/// same handle for the lifetime of the process.
pub type TopicHandle = Arc<str>;

#[derive(Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    handle: Option<TopicHandle>,
}

struct Inner {
    names: HashMap<String, TopicHandle>,
    root: TrieNode,
}

/// Interns topic names and matches filters against every name seen so far.
pub struct TopicRegistry {
    inner: RwLock<Inner>,
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                names: HashMap::new(),
                root: TrieNode::default(),
            }),
        }
    }

    /// Interns `name`, returning the stable handle for it. Idempotent.
    pub fn get(&self, name: &str) -> TopicHandle {
        if let Some(handle) = self.inner.read().unwrap().names.get(name) {
            return handle.clone();
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(handle) = inner.names.get(name) {
            return handle.clone();
        }
        let handle: TopicHandle = Arc::from(name);
        inner.names.insert(name.to_string(), handle.clone());
        insert_into_trie(&mut inner.root, &split_levels(name), handle.clone());
        handle
    }

    /// Returns every interned handle whose name matches `filter`.
    #[must_use]
    pub fn matches(&self, filter: &str) -> Vec<TopicHandle> {
        let inner = self.inner.read().unwrap();
        let mut out = Vec::new();
        collect_matches(&inner.root, &split_levels(filter), &mut out);
        out
    }
}

fn split_levels(topic: &str) -> Vec<&str> {
    topic.split('/').collect()
}

fn insert_into_trie(node: &mut TrieNode, levels: &[&str], handle: TopicHandle) {
    match levels.split_first() {
        None => node.handle = Some(handle),
        Some((first, rest)) => {
            let child = node.children.entry((*first).to_string()).or_default();
            insert_into_trie(child, rest, handle);
        }
    }
}

fn collect_matches(node: &TrieNode, levels: &[&str], out: &mut Vec<TopicHandle>) {
    let Some((level, rest)) = levels.split_first() else {
        if let Some(handle) = &node.handle {
            out.push(handle.clone());
        }
        return;
    };
    match *level {
        "#" => collect_all(node, out),
        "+" => {
            for child in node.children.values() {
                collect_matches(child, rest, out);
            }
        }
        name => {
            if let Some(child) = node.children.get(name) {
                collect_matches(child, rest, out);
            }
        }
    }
}

fn collect_all(node: &TrieNode, out: &mut Vec<TopicHandle>) {
    if let Some(handle) = &node.handle {
        out.push(handle.clone());
    }
    for child in node.children.values() {
        collect_all(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_idempotent() {
        let registry = TopicRegistry::new();
        let a = registry.get("a/b");
        let b = registry.get("a/b");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn plus_matches_single_level() {
        let registry = TopicRegistry::new();
        registry.get("a/b/c");
        registry.get("a/x/c");
        registry.get("a/b/c/d");
        let matched = registry.matches("a/+/c");
        let names: Vec<&str> = matched.iter().map(|h| &***h).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"a/b/c"));
        assert!(names.contains(&"a/x/c"));
    }

    #[test]
    fn trailing_hash_matches_all_descendants() {
        let registry = TopicRegistry::new();
        registry.get("a/b");
        registry.get("a/b/c");
        registry.get("a");
        registry.get("z");
        let matched = registry.matches("a/#");
        let names: Vec<&str> = matched.iter().map(|h| &***h).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"a"));
        assert!(names.contains(&"a/b"));
        assert!(names.contains(&"a/b/c"));
    }

    #[test]
    fn bare_hash_matches_everything() {
        let registry = TopicRegistry::new();
        registry.get("a");
        registry.get("a/b");
        registry.get("x/y/z");
        assert_eq!(registry.matches("#").len(), 3);
    }

    #[test]
    fn exact_name_matches_itself_only() {
        let registry = TopicRegistry::new();
        registry.get("a/b");
        registry.get("a/b/c");
        let matched = registry.matches("a/b");
        assert_eq!(matched.len(), 1);
        assert_eq!(&*matched[0], "a/b");
    }
}
