//! Dependency ordering for bulk document insertion.
//!
//! # Invariants
//! - Parents outside the batch count as resolved.
//! - An entry is emitted only after all of its in-batch parents.
//! - Entries on a cycle, or depending on one through any parent, are never
//!   emitted. Self-references are cycles.
//! - Output is deterministic for a given input.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

struct Node<'a> {
    uri: &'a str,
    unresolved_parents: usize,
    children: Vec<usize>,
}

/// Orders batch entries so every entry follows its in-batch parents.
///
/// `entries` maps each uri to the uris of its parents. The returned list is
/// the resolvable subset; callers treat missing entries as circular.
pub fn order(entries: &BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    let index: BTreeMap<&str, usize> = entries
        .keys()
        .enumerate()
        .map(|(position, uri)| (uri.as_str(), position))
        .collect();

    let mut nodes: Vec<Node<'_>> = entries
        .keys()
        .map(|uri| Node {
            uri: uri.as_str(),
            unresolved_parents: 0,
            children: Vec::new(),
        })
        .collect();

    for (child, (_, parents)) in entries.iter().enumerate() {
        for parent_uri in parents {
            if let Some(&parent) = index.get(parent_uri.as_str()) {
                nodes[child].unresolved_parents += 1;
                nodes[parent].children.push(child);
            }
        }
    }

    let mut ready: VecDeque<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.unresolved_parents == 0)
        .map(|(position, _)| position)
        .collect();

    let mut ordered = Vec::with_capacity(nodes.len());
    while let Some(current) = ready.pop_front() {
        ordered.push(nodes[current].uri.to_string());
        let children = std::mem::take(&mut nodes[current].children);
        for child in children {
            let node = &mut nodes[child];
            node.unresolved_parents -= 1;
            if node.unresolved_parents == 0 {
                ready.push_back(child);
            }
        }
    }

    ordered
}
