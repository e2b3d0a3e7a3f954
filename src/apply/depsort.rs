//! Dependency-aware topological sort for a pending change-set queue
//! (§4.4.2). Builds a graph over only the entries that participate in at
//! least one dependency edge, sorts that subgraph, and folds the result
//! back into the full list with a minimal permutation.
#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};

use super::ChangeSetEntry;
use crate::logging::warn;

/// Returns a permutation `order` such that `order[i]` is the index into
/// `entries` that should occupy position `i` of the sorted queue.
pub fn dependency_sort(entries: &[ChangeSetEntry]) -> Vec<usize> {
	let edges = build_edges(entries);
	let participating: BTreeSet<usize> = edges.iter().flat_map(|&(a, b)| [a, b]).collect();

	if participating.is_empty() {
		return (0..entries.len()).collect();
	}

	let nodes: Vec<usize> = participating.into_iter().collect();
	match topo_order(&nodes, &edges) {
		Ok(order) => {
			let mut result: Vec<usize> = (0..entries.len()).collect();
			for (slot, value) in nodes.into_iter().zip(order) {
				result[slot] = value;
			}
			result
		}
		Err(CycleDetected) => {
			warn!("dependency graph contains a cycle; falling back to original queue order");
			(0..entries.len()).collect()
		}
	}
}

fn build_edges(entries: &[ChangeSetEntry]) -> Vec<(usize, usize)> {
	let mut edges = Vec::new();
	let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
	for (i, e) in entries.iter().enumerate() {
		by_name.entry(e.file.name.as_str()).or_default().push(i);
	}

	// Rule 1 & 2: parent/child ordering.
	for (i, e) in entries.iter().enumerate() {
		let parent = e.file.parent_name();
		if parent.is_empty() {
			continue;
		}
		if let Some(parent_idxs) = by_name.get(parent) {
			for &p in parent_idxs {
				if p == i {
					continue;
				}
				let parent_entry = &entries[p];
				if !e.file.deleted && !parent_entry.file.deleted {
					edges.push((p, i)); // create parent before child
				} else if e.file.deleted && parent_entry.file.deleted {
					edges.push((i, p)); // delete child before parent
				}
			}
		}
	}

	// Rule 3: delete-then-update of the same name.
	for idxs in by_name.values() {
		if idxs.len() < 2 {
			continue;
		}
		for &a in idxs {
			for &b in idxs {
				if a != b && entries[a].file.deleted && !entries[b].file.deleted {
					edges.push((a, b));
				}
			}
		}
	}

	// Rule 4: rename opportunity via matching content hash.
	let mut delete_by_hash: HashMap<[u8; 32], Vec<usize>> = HashMap::new();
	for (i, e) in entries.iter().enumerate() {
		if e.file.deleted && e.file.is_regular() {
			delete_by_hash.entry(e.file.hash).or_default().push(i);
		}
	}
	for (i, e) in entries.iter().enumerate() {
		if !e.file.deleted && e.file.is_regular() {
			if let Some(deletes) = delete_by_hash.get(&e.file.hash) {
				for &d in deletes {
					if entries[d].file.name != e.file.name {
						edges.push((i, d)); // rename into place before dropping source
					}
				}
			}
		}
	}

	edges
}

struct CycleDetected;

/// Kahn's algorithm restricted to `nodes`, breaking ties by original
/// position so the result stays as close as possible to the input order.
fn topo_order(nodes: &[usize], edges: &[(usize, usize)]) -> Result<Vec<usize>, CycleDetected> {
	let node_set: BTreeSet<usize> = nodes.iter().copied().collect();
	let mut indegree: HashMap<usize, usize> = nodes.iter().map(|&n| (n, 0)).collect();
	let mut adj: HashMap<usize, Vec<usize>> = HashMap::new();
	for &(a, b) in edges {
		if node_set.contains(&a) && node_set.contains(&b) {
			adj.entry(a).or_default().push(b);
			*indegree.get_mut(&b).unwrap() += 1;
		}
	}

	let mut ready: BTreeSet<usize> = nodes.iter().filter(|n| indegree[n] == 0).copied().collect();
	let mut order = Vec::with_capacity(nodes.len());
	while let Some(&n) = ready.iter().next() {
		ready.remove(&n);
		order.push(n);
		if let Some(succs) = adj.get(&n) {
			for &s in succs {
				let e = indegree.get_mut(&s).unwrap();
				*e -= 1;
				if *e == 0 {
					ready.insert(s);
				}
			}
		}
	}

	if order.len() == nodes.len() {
		Ok(order)
	} else {
		Err(CycleDetected)
	}
}


// vim: ts=4
