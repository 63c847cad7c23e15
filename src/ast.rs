//! Syntax tree of a parsed pattern.
//!
//! Nodes live in an arena owned by [`RegexAst`] and refer to each other by
//! [`NodeId`]. Quantifiers are already desugared: an unbounded quantifier is
//! a `loop` group, a counted one is unrolled into `expanded_quantifier`
//! groups.

use std::fmt;
use std::ops::Range;

use crate::charset::CodePointSet;
use crate::error::{Bailout, Limit, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssertionKind {
    /// `^`
    Start,
    /// `$`
    End,
    /// `\b`
    WordBoundary,
    /// `\B`
    NotWordBoundary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// `Sequence` nodes, in priority order.
    pub alternatives: Vec<NodeId>,
    pub capturing: bool,
    /// Capture index; 0 for the root group and for non-capturing groups.
    pub group_number: u16,
    pub is_loop: bool,
    pub expanded_quantifier: bool,
    /// Capture indices of the capturing groups inside this one.
    pub enclosed_captures: Range<u16>,
}

impl Group {
    pub fn is_quantifier(&self) -> bool {
        self.is_loop || self.expanded_quantifier
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookAround {
    /// The body, a non-capturing `Group` node.
    pub group: NodeId,
    pub negated: bool,
    /// Reached when the body has matched.
    pub match_found: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    CharacterClass(CodePointSet),
    BackReference(u16),
    Assertion(AssertionKind),
    Group(Group),
    LookAhead(LookAround),
    LookBehind(LookAround),
    Sequence(Vec<NodeId>),
    MatchFound,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// Position within the parent `Sequence`.
    pub seq_index: usize,
}

#[derive(Debug, Clone)]
pub struct RegexAst {
    nodes: Vec<Node>,
    max_nodes: usize,
    root: Option<NodeId>,
    match_found: Option<NodeId>,
    capture_groups: usize,
    group_names: Vec<Option<String>>,
}

impl RegexAst {
    pub fn new(max_nodes: usize) -> Self {
        Self {
            nodes: Vec::new(),
            max_nodes,
            root: None,
            match_found: None,
            capture_groups: 1,
            group_names: vec![None],
        }
    }

    /// Allocate a node, failing once the tree outgrows its budget.
    pub fn add(&mut self, kind: NodeKind) -> Result<NodeId, Bailout> {
        if self.nodes.len() >= self.max_nodes {
            return Err(Bailout::limit(Stage::Parse, Limit::MaxParseTreeSize));
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent: None,
            seq_index: 0,
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }


    pub fn group(&self, id: NodeId) -> Option<&Group> {
        match self.kind(id) {
            NodeKind::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn terms(&self, id: NodeId) -> &[NodeId] {
        match self.kind(id) {
            NodeKind::Sequence(terms) => terms,
            _ => &[],
        }
    }

    /// The root group. Only valid once the parser has finished.
    pub fn root(&self) -> NodeId {
        self.root.unwrap_or(NodeId(0))
    }

    /// The top-level `MatchFound` sentinel.
    pub fn match_found(&self) -> NodeId {
        self.match_found.unwrap_or(NodeId(0))
    }

    /// Number of capture groups, including group 0.
    pub fn capture_groups(&self) -> usize {
        self.capture_groups
    }

    pub fn group_names(&self) -> &[Option<String>] {
        &self.group_names
    }

    pub(crate) fn set_groups(&mut self, names: Vec<Option<String>>) {
        self.capture_groups = names.len();
        self.group_names = names;
    }

    /// True if no group loops, so every match has a bounded length.
    pub fn is_tree_like(&self) -> bool {
        !self
            .nodes
            .iter()
            .any(|n| matches!(&n.kind, NodeKind::Group(g) if g.is_loop))
    }

    pub fn uses_assertion(&self, kind: AssertionKind) -> bool {
        self.nodes
            .iter()
            .any(|n| n.kind == NodeKind::Assertion(kind))
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        match self.kind(id) {
            NodeKind::Group(group) => group.alternatives.clone(),
            NodeKind::Sequence(terms) => terms.clone(),
            NodeKind::LookAhead(la) | NodeKind::LookBehind(la) => vec![la.group],
            _ => Vec::new(),
        }
    }

    /// Deep copy of the subtree at `id`. The copy is not linked.
    ///
    /// Children are copied before their parent, so the copy of `id` is the
    /// last node added.
    pub fn copy_subtree(&mut self, id: NodeId) -> Result<NodeId, Bailout> {
        enum Visit {
            Open(NodeId),
            Close(NodeId),
        }
        let mut stack = vec![Visit::Open(id)];
        let mut copies: Vec<NodeId> = Vec::new();
        let mut last = id;
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Open(id) => {
                    stack.push(Visit::Close(id));
                    stack.extend(self.children(id).into_iter().rev().map(Visit::Open));
                }
                Visit::Close(id) => {
                    let count = self.children(id).len();
                    let children = copies.split_off(copies.len() - count);
                    let kind = match self.kind(id).clone() {
                        NodeKind::Group(mut group) => {
                            group.alternatives = children;
                            NodeKind::Group(group)
                        }
                        NodeKind::Sequence(_) => NodeKind::Sequence(children),
                        NodeKind::LookAhead(la) => {
                            NodeKind::LookAhead(self.copy_look_around(la, children[0])?)
                        }
                        NodeKind::LookBehind(lb) => {
                            NodeKind::LookBehind(self.copy_look_around(lb, children[0])?)
                        }
                        kind => kind,
                    };
                    last = self.add(kind)?;
                    copies.push(last);
                }
            }
        }
        Ok(last)
    }

    fn copy_look_around(&mut self, la: LookAround, group: NodeId) -> Result<LookAround, Bailout> {
        Ok(LookAround {
            group,
            negated: la.negated,
            match_found: self.add(NodeKind::MatchFound)?,
        })
    }

    /// Install `root` and set parent and sequence index of every node
    /// reachable from it.
    pub(crate) fn link(&mut self, root: NodeId) -> Result<(), Bailout> {
        let match_found = self.add(NodeKind::MatchFound)?;
        self.root = Some(root);
        self.match_found = Some(match_found);

        let mut stack = vec![(root, None)];
        while let Some((id, parent)) = stack.pop() {
            self.nodes[id.index()].parent = parent;
            if let NodeKind::Sequence(terms) = self.kind(id) {
                for (i, term) in terms.clone().into_iter().enumerate() {
                    self.nodes[term.index()].seq_index = i;
                }
            }
            stack.extend(self.children(id).into_iter().map(|child| (child, Some(id))));
            if let NodeKind::LookAhead(la) | NodeKind::LookBehind(la) = self.kind(id) {
                stack.push((la.match_found, Some(id)));
            }
        }
        Ok(())
    }

    fn fmt_node(&self, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind(id) {
            NodeKind::CharacterClass(set) => fmt_class(set, f),
            NodeKind::BackReference(n) => write!(f, "\\{n}"),
            NodeKind::Assertion(kind) => f.write_str(match kind {
                AssertionKind::Start => "^",
                AssertionKind::End => "$",
                AssertionKind::WordBoundary => "\\b",
                AssertionKind::NotWordBoundary => "\\B",
            }),
            NodeKind::Group(group) => {
                let open = if group.capturing {
                    "("
                } else if group.is_loop {
                    "(?*"
                } else if group.expanded_quantifier {
                    "(?~"
                } else {
                    "(?:"
                };
                f.write_str(open)?;
                self.fmt_alternatives(group, f)?;
                f.write_str(")")
            }
            NodeKind::LookAhead(la) | NodeKind::LookBehind(la) => {
                let behind = matches!(self.kind(id), NodeKind::LookBehind(_));
                let open = match (behind, la.negated) {
                    (false, false) => "(?=",
                    (false, true) => "(?!",
                    (true, false) => "(?<=",
                    (true, true) => "(?<!",
                };
                f.write_str(open)?;
                if let Some(group) = self.group(la.group) {
                    self.fmt_alternatives(group, f)?;
                }
                f.write_str(")")
            }
            NodeKind::Sequence(terms) => terms.iter().try_for_each(|&t| self.fmt_node(t, f)),
            NodeKind::MatchFound => Ok(()),
        }
    }

    fn fmt_alternatives(&self, group: &Group, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &alt) in group.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            self.fmt_node(alt, f)?;
        }
        Ok(())
    }
}

fn fmt_char(cp: u32, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match char::from_u32(cp) {
        Some(c) if c.is_ascii_graphic() || c == ' ' => write!(f, "{c}"),
        _ => write!(f, "\\u{{{cp:x}}}"),
    }
}

fn fmt_class(set: &CodePointSet, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if set.matches_single_char() {
        return fmt_char(set.ranges()[0].lo(), f);
    }
    f.write_str("[")?;
    for r in set.ranges().iter() {
        fmt_char(r.lo(), f)?;
        if !r.is_single() {
            f.write_str("-")?;
            fmt_char(r.hi(), f)?;
        }
    }
    f.write_str("]")
}

/// Renders the desugared tree. Loop groups print as `(?*..)` and unrolled
/// quantifier groups as `(?~..)`.
impl fmt::Display for RegexAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root.and_then(|root| self.group(root)) {
            Some(root) => self.fmt_alternatives(root, f),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::charset::CodePointSet;

    fn class(ast: &mut RegexAst, c: char) -> NodeId {
        ast.add(NodeKind::CharacterClass(CodePointSet::from_char(c)))
            .unwrap()
    }

    fn group(ast: &mut RegexAst, alternatives: Vec<Vec<NodeId>>, capturing: bool) -> NodeId {
        let alternatives = alternatives
            .into_iter()
            .map(|terms| ast.add(NodeKind::Sequence(terms)).unwrap())
            .collect();
        ast.add(NodeKind::Group(Group {
            alternatives,
            capturing,
            group_number: 0,
            is_loop: false,
            expanded_quantifier: false,
            enclosed_captures: 0..0,
        }))
        .unwrap()
    }

    #[test]
    fn link() {
        let mut ast = RegexAst::new(100);
        let a = class(&mut ast, 'a');
        let b = class(&mut ast, 'b');
        let c = class(&mut ast, 'c');
        let body = group(&mut ast, vec![vec![c]], false);
        let mf = ast.add(NodeKind::MatchFound).unwrap();
        let la = ast
            .add(NodeKind::LookAhead(LookAround {
                group: body,
                negated: false,
                match_found: mf,
            }))
            .unwrap();
        let root = group(&mut ast, vec![vec![a, b, la]], true);
        ast.link(root).unwrap();

        assert_eq!(ast.to_string(), "ab(?=c)");
        assert_eq!(ast.node(b).seq_index, 1);
        assert_eq!(ast.node(la).seq_index, 2);
        assert_eq!(ast.node(c).parent, ast.group(body).map(|g| g.alternatives[0]));
        assert_eq!(ast.node(body).parent, Some(la));
        assert_eq!(ast.node(mf).parent, Some(la));
        assert_eq!(ast.node(ast.match_found()).parent, None);
        assert!(ast.is_tree_like());
    }

    #[test]
    fn copy_subtree() {
        let mut ast = RegexAst::new(100);
        let a = class(&mut ast, 'a');
        let g = group(&mut ast, vec![vec![a]], true);
        let len = ast.len();
        let copy = ast.copy_subtree(g).unwrap();
        assert_ne!(copy, g);
        assert_eq!(ast.len(), 2 * len);
        assert!(ast.group(copy).unwrap().capturing);
        let copied_alt = ast.group(copy).unwrap().alternatives[0];
        assert_ne!(copied_alt, ast.group(g).unwrap().alternatives[0]);
    }

    #[test]
    fn copy_deep_subtree() {
        let mut ast = RegexAst::new(100_000);
        let mut inner = class(&mut ast, 'a');
        for _ in 0..10_000 {
            inner = group(&mut ast, vec![vec![inner]], false);
        }
        let len = ast.len();
        let copy = ast.copy_subtree(inner).unwrap();
        assert_eq!(ast.len(), 2 * len);
        assert_eq!(copy, NodeId(2 * len as u32 - 1));
    }

    #[test]
    fn copy_look_around() {
        let mut ast = RegexAst::new(100);
        let c = class(&mut ast, 'c');
        let body = group(&mut ast, vec![vec![c]], false);
        let mf = ast.add(NodeKind::MatchFound).unwrap();
        let la = ast
            .add(NodeKind::LookAhead(LookAround {
                group: body,
                negated: false,
                match_found: mf,
            }))
            .unwrap();
        let copy = ast.copy_subtree(la).unwrap();
        assert_eq!(ast.len(), 10);
        let NodeKind::LookAhead(copied) = ast.kind(copy).clone() else {
            unreachable!()
        };
        assert_ne!(copied.group, body);
        assert_ne!(copied.match_found, mf);
        assert_eq!(ast.kind(copied.match_found), &NodeKind::MatchFound);
    }

    #[test]
    fn budget() {
        let mut ast = RegexAst::new(2);
        class(&mut ast, 'a');
        class(&mut ast, 'b');
        assert_eq!(
            ast.add(NodeKind::MatchFound),
            Err(Bailout::limit(Stage::Parse, Limit::MaxParseTreeSize))
        );
    }
}
