//! extensions/graph.rs
//!
//! Reverse index of `active_with` declarations: for every target, the
//! extensions that switch on alongside it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use rollbot_common::models::Extension;

use crate::config::DEFAULT_MAX_CHAIN_DEPTH;

/// Target name -> followers, both canonical names.
///
/// Followers appear in registration order, which is what fixes sibling
/// order when a chain is resolved.
#[derive(Debug, Default)]
pub struct CompanionGraph {
    version: u64,
    followers: HashMap<String, Vec<String>>,
}

impl CompanionGraph {
    /// Builds the graph from a registry snapshot. Targets that name no
    /// registered extension are ignored.
    pub fn build(extensions: &[Arc<Extension>], version: u64) -> Self {
        let mut canonical: HashMap<String, &str> = HashMap::new();
        for ext in extensions {
            for key in ext.lookup_keys() {
                canonical.insert(key.to_lowercase(), ext.name.as_str());
            }
        }

        let mut followers: HashMap<String, Vec<String>> = HashMap::new();
        for ext in extensions {
            for target in &ext.active_with {
                let Some(&target_name) = canonical.get(&target.to_lowercase()) else {
                    debug!(
                        "Extension '{}' follows unknown extension '{}', skipping",
                        ext.name, target
                    );
                    continue;
                };
                if target_name == ext.name {
                    debug!("Extension '{}' lists itself in active_with, skipping", ext.name);
                    continue;
                }
                let entry = followers.entry(target_name.to_string()).or_default();
                if !entry.contains(&ext.name) {
                    entry.push(ext.name.clone());
                }
            }
        }

        Self { version, followers }
    }

    /// Registry version this graph was built from.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Direct followers of `name` (canonical name, exact match).
    pub fn followers(&self, name: &str) -> &[String] {
        self.followers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of targets with at least one follower.
    pub fn len(&self) -> usize {
        self.followers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.followers.is_empty()
    }
}

/// Every extension transitively following `base`, breadth first, excluding
/// `base` itself. Each name appears once, at its shallowest depth. Nothing
/// deeper than `max_depth` levels is explored.
pub fn resolve_chain(graph: &CompanionGraph, base: &str, max_depth: usize) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(base);
    let mut chain = Vec::new();
    let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
    queue.push_back((base, 0));

    while let Some((current, depth)) = queue.pop_front() {
        let next = graph.followers(current);
        if depth >= max_depth {
            if next.iter().any(|n| !visited.contains(n.as_str())) {
                warn!(
                    "Companion chain of '{}' truncated at depth {} (at '{}')",
                    base, max_depth, current
                );
            }
            continue;
        }
        for follower in next {
            if visited.insert(follower.as_str()) {
                chain.push(follower.clone());
                queue.push_back((follower.as_str(), depth + 1));
            }
        }
    }

    chain
}

/// `resolve_chain` with a fixed depth limit.
#[derive(Debug, Clone, Copy)]
pub struct ChainResolver {
    max_depth: usize,
}

impl Default for ChainResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHAIN_DEPTH)
    }
}

impl ChainResolver {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn resolve(&self, graph: &CompanionGraph, base: &str) -> Vec<String> {
        resolve_chain(graph, base, self.max_depth)
    }
}
