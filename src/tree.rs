//! Hierarchical rollup of per-file counters, keyed by path segment.
//!
//! Leaves hold file counters. Internal nodes only become meaningful after
//! [`CoverageTree::collect_coverage_data`], which must be called exactly once
//! after all leaf mutations are complete. Counters are accumulators: a second
//! call without [`CoverageTree::reset_aggregates`] doubles every internal node.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::Counters;

#[derive(Debug, Clone, Default)]
pub struct CoverageTreeNode {
    pub name: String,
    pub counters: Counters,
    pub is_leaf: bool,
    pub children: BTreeMap<String, CoverageTreeNode>,
}

impl CoverageTreeNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// One node of the tree, flattened for telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeRecord {
    /// Slash-joined path below the root; empty for the root itself.
    pub path: String,
    pub name: String,
    pub is_leaf: bool,
    #[serde(flatten)]
    pub counters: Counters,
}

#[derive(Debug, Clone)]
pub struct CoverageTree {
    root: CoverageTreeNode,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

impl CoverageTree {
    /// An empty tree whose root is named after the module.
    pub fn new(root_name: &str) -> Self {
        Self {
            root: CoverageTreeNode::new(root_name),
        }
    }

    pub fn root(&self) -> &CoverageTreeNode {
        &self.root
    }

    /// Walk `path`, creating directory nodes and the final file leaf as needed.
    pub fn find_or_create(&mut self, path: &str) -> &mut CoverageTreeNode {
        let parts: Vec<&str> = segments(path).collect();
        let last = parts.len().saturating_sub(1);
        let mut node = &mut self.root;
        for (i, part) in parts.into_iter().enumerate() {
            node = node
                .children
                .entry(part.to_string())
                .or_insert_with(|| CoverageTreeNode::new(part));
            if i == last {
                node.is_leaf = true;
            }
        }
        node
    }

    /// Read-only walk; `None` when any segment is missing.
    pub fn find(&self, path: &str) -> Option<&CoverageTreeNode> {
        segments(path).try_fold(&self.root, |node, part| node.children.get(part))
    }

    /// Add each subtree's leaf totals into its internal nodes, bottom-up, and
    /// return the root aggregate.
    ///
    /// Call exactly once after every leaf is final. This is not idempotent.
    pub fn collect_coverage_data(&mut self) -> Counters {
        collect(&mut self.root);
        self.root.counters
    }

    /// Zero every internal node so the tree can be collected again.
    pub fn reset_aggregates(&mut self) {
        fn reset(node: &mut CoverageTreeNode) {
            if !node.is_leaf {
                node.counters = Counters::default();
            }
            node.children.values_mut().for_each(reset);
        }
        reset(&mut self.root);
    }

    /// Every node in pre-order, parents before children.
    pub fn flatten(&self) -> Vec<TreeRecord> {
        fn walk(node: &CoverageTreeNode, path: String) -> Vec<TreeRecord> {
            let own = TreeRecord {
                path: path.clone(),
                name: node.name.clone(),
                is_leaf: node.is_leaf,
                counters: node.counters,
            };
            std::iter::once(own)
                .chain(node.children.values().flat_map(|child| {
                    let child_path = if path.is_empty() {
                        child.name.clone()
                    } else {
                        format!("{path}/{}", child.name)
                    };
                    walk(child, child_path)
                }))
                .collect()
        }
        walk(&self.root, String::new())
    }
}

/// Returns the leaf total of the subtree, not the node's accumulated value.
fn collect(node: &mut CoverageTreeNode) -> Counters {
    if node.is_leaf {
        return node.counters;
    }
    let sum: Counters = node.children.values_mut().map(collect).sum();
    node.counters += sum;
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(total: u64, covered: u64) -> Counters {
        Counters {
            total_lines: total,
            effective_lines: total,
            covered_lines: covered,
            violation_lines: total - covered,
            ..Default::default()
        }
    }

    fn sample_tree() -> CoverageTree {
        let mut tree = CoverageTree::new("example.com/mod");
        tree.find_or_create("pkg/a/x.go").counters = counters(10, 8);
        tree.find_or_create("pkg/a/y.go").counters = counters(5, 5);
        tree.find_or_create("pkg/b/z.go").counters = counters(20, 10);
        tree
    }

    #[test]
    fn test_rollup() {
        let mut tree = sample_tree();
        let root = tree.collect_coverage_data();

        assert_eq!(root.total_lines, 35);
        assert_eq!(root.covered_lines, 23);
        let a = tree.find("pkg/a").unwrap();
        assert_eq!((a.counters.total_lines, a.counters.covered_lines), (15, 13));
        let b = tree.find("pkg/b").unwrap();
        assert_eq!((b.counters.total_lines, b.counters.covered_lines), (20, 10));
    }

    #[test]
    fn test_second_collection_doubles_counters() {
        let mut tree = sample_tree();
        let once = tree.collect_coverage_data();
        let pkg_once = tree.find("pkg").unwrap().counters;

        let twice = tree.collect_coverage_data();
        assert_eq!(twice.total_lines, once.total_lines * 2);
        assert_eq!(twice.covered_lines, once.covered_lines * 2);
        assert_eq!(
            tree.find("pkg").unwrap().counters.total_lines,
            pkg_once.total_lines * 2
        );
        // Leaves are never touched by aggregation.
        assert_eq!(tree.find("pkg/b/z.go").unwrap().counters, counters(20, 10));
    }

    #[test]
    fn test_reset_allows_recollection() {
        let mut tree = sample_tree();
        let once = tree.collect_coverage_data();
        tree.reset_aggregates();
        assert_eq!(tree.collect_coverage_data(), once);
    }

    #[test]
    fn test_find_missing_segment() {
        let tree = sample_tree();
        assert!(tree.find("pkg/c/x.go").is_none());
        assert!(tree.find("pkg/a/x.go").unwrap().is_leaf);
        assert!(!tree.find("pkg/a").unwrap().is_leaf);
    }

    #[test]
    fn test_find_or_create_reuses_nodes() {
        let mut tree = sample_tree();
        tree.find_or_create("pkg/a/x.go").counters.total_lines += 1;
        assert_eq!(tree.find("pkg/a/x.go").unwrap().counters.total_lines, 11);
        assert_eq!(tree.find("pkg").unwrap().children.len(), 2);
    }

    #[test]
    fn test_flatten_lists_every_node() {
        let mut tree = sample_tree();
        tree.collect_coverage_data();
        let records = tree.flatten();
        let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["", "pkg", "pkg/a", "pkg/a/x.go", "pkg/a/y.go", "pkg/b", "pkg/b/z.go"]
        );
        assert_eq!(records[0].name, "example.com/mod");
        assert_eq!(records[0].counters.total_lines, 35);
    }

    #[test]
    fn test_empty_tree_collects_to_zero() {
        let mut tree = CoverageTree::new("m");
        assert!(tree.collect_coverage_data().is_zero());
    }
}
