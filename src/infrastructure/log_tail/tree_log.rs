//! Tree log lines of the form `tree STATE_<n> [annotations] = (newick);`.

use anyhow::{Context, Result};
use std::path::Path;

use crate::domain::models::tree::{PhyloTree, TaxonMap};

/// A tree line split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLine<'a> {
    /// Sample number after `STATE_`.
    pub state: u64,
    /// Everything after the state token, e.g. ` = [&R] ((1,2),3);`.
    pub suffix: &'a str,
    /// Newick payload, starting at the first `(`.
    pub newick: &'a str,
}

/// Split a tree line, or `None` for any other line of the file.
pub fn parse_tree_line(line: &str) -> Option<TreeLine<'_>> {
    let line = line.trim();
    let rest = strip_prefix_ignore_case(line, "tree")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();
    let rest = strip_prefix_ignore_case(rest, "STATE_")?;
    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let state = rest[..digits].parse().ok()?;
    let suffix = &rest[digits..];
    let newick = &suffix[suffix.find('(')?..];
    Some(TreeLine {
        state,
        suffix,
        newick,
    })
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}

/// A complete tree log read from disk.
#[derive(Debug, Clone, Default)]
pub struct TreeLog {
    /// Lines before the first tree, such as a NEXUS translate block.
    pub preamble: Vec<String>,
    /// Sample number of every tree.
    pub states: Vec<u64>,
    /// Raw suffix of every tree line.
    pub suffixes: Vec<String>,
    /// Parsed topologies.
    pub trees: Vec<PhyloTree>,
}

impl TreeLog {
    /// Parse log text, failing on the first malformed tree.
    pub fn parse(text: &str, taxa: &TaxonMap) -> Result<Self> {
        let mut log = Self::default();
        for (number, line) in text.lines().enumerate() {
            if let Some(tree_line) = parse_tree_line(line) {
                let tree = PhyloTree::parse(tree_line.newick, taxa)
                    .with_context(|| format!("Invalid tree on line {}", number + 1))?;
                log.states.push(tree_line.state);
                log.suffixes.push(tree_line.suffix.to_string());
                log.trees.push(tree);
            } else if log.trees.is_empty() {
                log.preamble.push(line.to_string());
            }
        }
        Ok(log)
    }

    /// Read and parse a log file.
    pub fn read(path: &Path, taxa: &TaxonMap) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tree log {}", path.display()))?;
        Self::parse(&text, taxa).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Number of trees.
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    /// True for a log without trees.
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree_line() {
        let line = parse_tree_line("tree STATE_2000 [&lnP=-1234.5] = [&R] ((1:0.1,2:0.2):0.3,3:0.4);")
            .unwrap();
        assert_eq!(line.state, 2000);
        assert_eq!(line.newick, "((1:0.1,2:0.2):0.3,3:0.4);");
        assert!(line.suffix.starts_with(" [&lnP"));
    }

    #[test]
    fn test_other_lines_are_not_trees() {
        assert_eq!(parse_tree_line("#NEXUS"), None);
        assert_eq!(parse_tree_line("Begin trees;"), None);
        assert_eq!(parse_tree_line("treeSTATE_1 = (1,2);"), None);
        assert_eq!(parse_tree_line("tree STATE_1 = ;"), None);
        assert_eq!(parse_tree_line("End;"), None);
    }

    #[test]
    fn test_tree_log_keeps_preamble() {
        let text = "#NEXUS\nBegin trees;\n\tTranslate\n\t\t1 a,\n\t\t2 b\n;\n\
                    tree STATE_0 = ((1,2),3);\ntree STATE_10 = ((1,3),2);\nEnd;\n";
        let taxa = TaxonMap::new();
        let log = TreeLog::parse(text, &taxa).unwrap();
        assert_eq!(log.preamble.len(), 6);
        assert_eq!(log.states, vec![0, 10]);
        assert_eq!(log.len(), 2);
        assert_eq!(log.suffixes[1], " = ((1,3),2);");
    }

    #[test]
    fn test_invalid_tree_is_an_error() {
        let taxa = TaxonMap::new();
        assert!(TreeLog::parse("tree STATE_0 = ((1,2),3;\n", &taxa).is_err());
    }
}
