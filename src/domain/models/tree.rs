//! Phylogenetic tree topologies read from tree logs.
//!
//! Trees are stored as an arena of [`TreeNode`]s addressed by index. Only the
//! topology is kept: branch lengths and metadata comments are skipped while
//! parsing. Leaves carry a taxon id resolved through a [`TaxonMap`] shared by
//! every chain, so clade signatures are comparable across chains.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::errors::TreeParseError;

/// Clade signature: the sorted taxon ids below an internal node.
pub type Clade = Vec<u32>;

/// Resolves leaf labels to taxon ids.
///
/// Numeric labels follow the 1-based translate-table convention of tree
/// logs and map to `label - 1`. Other labels get ids in order of first
/// appearance. Both kinds share one id space, so an analysis should use
/// only one of them.
#[derive(Debug, Default)]
pub struct TaxonMap {
    names: RwLock<HashMap<String, u32>>,
}

impl TaxonMap {
    /// Map with no named taxa.
    pub fn new() -> Self {
        Self::default()
    }

    /// Taxon id for a leaf label.
    pub fn resolve(&self, label: &str) -> u32 {
        if let Ok(number) = label.parse::<u32>() {
            return number.saturating_sub(1);
        }
        if let Ok(names) = self.names.read() {
            if let Some(&id) = names.get(label) {
                return id;
            }
        }
        match self.names.write() {
            Ok(mut names) => {
                let next = names.len() as u32;
                *names.entry(label.to_string()).or_insert(next)
            }
            Err(poisoned) => {
                let mut names = poisoned.into_inner();
                let next = names.len() as u32;
                *names.entry(label.to_string()).or_insert(next)
            }
        }
    }

    /// Named (non-numeric) taxa seen so far.
    pub fn len(&self) -> usize {
        self.names.read().map(|names| names.len()).unwrap_or(0)
    }

    /// True when no named taxon was seen.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Node of a [`PhyloTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Tip of the tree.
    Leaf {
        /// Id from the [`TaxonMap`]
        taxon: u32,
    },
    /// Node with at least one child.
    Internal {
        /// Arena indices of the children
        children: Vec<usize>,
    },
}

/// Rooted tree topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhyloTree {
    nodes: Vec<TreeNode>,
    root: usize,
}

impl PhyloTree {
    /// Parse a Newick string such as `((1:0.1,2:0.2):0.5,3:0.7);`.
    pub fn parse(newick: &str, taxa: &TaxonMap) -> Result<Self, TreeParseError> {
        let mut parser = NewickParser {
            bytes: newick.as_bytes(),
            pos: 0,
            nodes: Vec::new(),
            taxa,
        };
        let root = parser.subtree()?;
        parser.skip_trailer();
        let tree = Self {
            nodes: parser.nodes,
            root,
        };
        if tree.leaf_count() == 0 {
            return Err(TreeParseError::Empty);
        }
        Ok(tree)
    }

    /// Arena index of the root.
    pub fn root(&self) -> usize {
        self.root
    }

    /// Node at arena `index`.
    pub fn node(&self, index: usize) -> Option<&TreeNode> {
        self.nodes.get(index)
    }

    /// Number of taxa.
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }

    /// Clade of every internal node, root included, in post-order.
    pub fn clades(&self) -> Vec<Clade> {
        let mut clades = Vec::new();
        self.collect(self.root, &mut clades);
        clades
    }

    fn collect(&self, index: usize, clades: &mut Vec<Clade>) -> Clade {
        match &self.nodes[index] {
            TreeNode::Leaf { taxon } => vec![*taxon],
            TreeNode::Internal { children } => {
                let mut clade: Clade = Vec::new();
                for &child in children {
                    clade.extend(self.collect(child, clades));
                }
                clade.sort_unstable();
                clades.push(clade.clone());
                clade
            }
        }
    }
}

struct NewickParser<'a> {
    bytes: &'a [u8],
    pos: usize,
    nodes: Vec<TreeNode>,
    taxa: &'a TaxonMap,
}

impl NewickParser<'_> {
    fn subtree(&mut self) -> Result<usize, TreeParseError> {
        self.skip_space_and_comments();
        let index = if self.peek() == Some(b'(') {
            self.pos += 1;
            let mut children = vec![self.subtree()?];
            loop {
                self.skip_space_and_comments();
                match self.peek() {
                    Some(b',') => {
                        self.pos += 1;
                        children.push(self.subtree()?);
                    }
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    Some(found) => {
                        return Err(TreeParseError::UnexpectedChar {
                            found: char::from(found),
                            position: self.pos,
                        })
                    }
                    None => return Err(TreeParseError::UnexpectedEnd(self.pos)),
                }
            }
            // internal node labels carry no topology
            let _ = self.label();
            self.nodes.push(TreeNode::Internal { children });
            self.nodes.len() - 1
        } else {
            let label = self.label();
            if label.is_empty() {
                return match self.peek() {
                    Some(found) => Err(TreeParseError::UnexpectedChar {
                        found: char::from(found),
                        position: self.pos,
                    }),
                    None => Err(TreeParseError::UnexpectedEnd(self.pos)),
                };
            }
            let taxon = self.taxa.resolve(&label);
            self.nodes.push(TreeNode::Leaf { taxon });
            self.nodes.len() - 1
        };
        self.branch_length();
        Ok(index)
    }

    fn label(&mut self) -> String {
        self.skip_space_and_comments();
        if self.peek() == Some(b'\'') {
            self.pos += 1;
            let start = self.pos;
            while let Some(byte) = self.peek() {
                if byte == b'\'' {
                    break;
                }
                self.pos += 1;
            }
            let label = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
            if self.peek() == Some(b'\'') {
                self.pos += 1;
            }
            return label;
        }
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if matches!(byte, b'(' | b')' | b',' | b':' | b';' | b'[') || byte.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    fn branch_length(&mut self) {
        self.skip_space_and_comments();
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_space_and_comments();
            while let Some(byte) = self.peek() {
                if matches!(byte, b',' | b')' | b';' | b'[') || byte.is_ascii_whitespace() {
                    break;
                }
                self.pos += 1;
            }
            self.skip_space_and_comments();
        }
    }

    fn skip_space_and_comments(&mut self) {
        while let Some(byte) = self.peek() {
            if byte.is_ascii_whitespace() {
                self.pos += 1;
            } else if byte == b'[' {
                while let Some(inner) = self.peek() {
                    self.pos += 1;
                    if inner == b']' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn skip_trailer(&mut self) {
        self.skip_space_and_comments();
        if self.peek() == Some(b';') {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_taxa_with_branch_lengths() {
        let taxa = TaxonMap::new();
        let tree = PhyloTree::parse("((1:0.1,2:0.2):0.5,3:0.7);", &taxa).unwrap();
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.clades(), vec![vec![0, 1], vec![0, 1, 2]]);
        assert!(taxa.is_empty());
    }

    #[test]
    fn test_parse_skips_metadata_comments() {
        let taxa = TaxonMap::new();
        let tree =
            PhyloTree::parse("((1[&rate=1.0]:0.1,2:0.2)[&rate=0.5]:0.5,3:0.7)[&R];", &taxa).unwrap();
        assert_eq!(tree.clades().len(), 2);
    }

    #[test]
    fn test_named_taxa_are_shared() {
        let taxa = TaxonMap::new();
        let first = PhyloTree::parse("((human,chimp),gorilla);", &taxa).unwrap();
        let second = PhyloTree::parse("((gorilla,chimp),human);", &taxa).unwrap();
        assert_eq!(taxa.len(), 3);
        assert_eq!(first.clades()[0], vec![0, 1]);
        assert_eq!(second.clades()[0], vec![1, 2]);
    }

    #[test]
    fn test_clades_are_sorted_regardless_of_child_order() {
        let taxa = TaxonMap::new();
        let left = PhyloTree::parse("((3,1),2);", &taxa).unwrap();
        let right = PhyloTree::parse("(2,(1,3));", &taxa).unwrap();
        assert_eq!(left.clades(), right.clades());
    }

    #[test]
    fn test_unbalanced_parenthesis_is_an_error() {
        let taxa = TaxonMap::new();
        assert!(matches!(
            PhyloTree::parse("((1,2),3", &taxa),
            Err(TreeParseError::UnexpectedEnd(_))
        ));
    }

    #[test]
    fn test_missing_leaf_is_an_error() {
        let taxa = TaxonMap::new();
        assert!(PhyloTree::parse("((1,),3);", &taxa).is_err());
    }
}
