use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::node::{Node, Operand};

/// A strategy tree: a root allocation node plus the named sub-trees its
/// `Call` nodes may reference. `slots` lets a composite strategy (see the
/// batch orchestrator's combine step) share one evaluated sub-tree across
/// many call sites instead of duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTree {
    pub root: Arc<Node>,
    #[serde(default)]
    pub slots: HashMap<String, Arc<Node>>,
}

impl StrategyTree {
    pub fn new(root: Arc<Node>) -> Self {
        Self {
            root,
            slots: HashMap::new(),
        }
    }

    pub fn with_slot(mut self, name: impl Into<String>, node: Arc<Node>) -> Self {
        self.slots.insert(name.into(), node);
        self
    }

    /// Walk the whole tree (root plus every slot, since an unreferenced
    /// slot is still part of the persisted tree) with an explicit
    /// work-stack rather than recursion, so depth is bounded only by
    /// available memory, not call-stack frames.
    pub fn traverse<F: FnMut(&Node)>(&self, mut visit: F) {
        let mut stack: Vec<Arc<Node>> = vec![self.root.clone()];
        stack.extend(self.slots.values().cloned());

        while let Some(node) = stack.pop() {
            visit(&node);
            match node.as_ref() {
                Node::Position { .. } | Node::Call { .. } => {}
                Node::Condition { if_true, if_false, .. } => {
                    stack.push(if_true.clone());
                    stack.push(if_false.clone());
                }
                Node::Weight { children, .. } => {
                    stack.extend(children.iter().cloned());
                }
                Node::FilterRank { candidates, .. } => {
                    stack.extend(candidates.iter().cloned());
                }
            }
        }
    }

    /// Every `Call` must reference a slot that exists, and slot resolution
    /// (including transitively, through other slots) must not cycle back
    /// on itself.
    pub fn ensure_slots(&self) -> Result<(), TreeError> {
        let mut unknown = None;
        self.traverse(|node| {
            if let Node::Call { slot } = node {
                if !self.slots.contains_key(slot) && unknown.is_none() {
                    unknown = Some(slot.clone());
                }
            }
        });
        if let Some(slot) = unknown {
            return Err(TreeError::UnknownCall(slot));
        }

        for name in self.slots.keys() {
            self.check_acyclic(name, &mut HashSet::new())?;
        }
        self.check_acyclic_from(&self.root, &mut HashSet::new())
    }

    fn check_acyclic(&self, slot: &str, visiting: &mut HashSet<String>) -> Result<(), TreeError> {
        if !visiting.insert(slot.to_string()) {
            return Err(TreeError::CallCycle(slot.to_string()));
        }
        if let Some(node) = self.slots.get(slot) {
            self.check_acyclic_from(node, visiting)?;
        }
        visiting.remove(slot);
        Ok(())
    }

    fn check_acyclic_from(&self, node: &Arc<Node>, visiting: &mut HashSet<String>) -> Result<(), TreeError> {
        let mut stack = vec![node.clone()];
        while let Some(n) = stack.pop() {
            match n.as_ref() {
                Node::Position { .. } => {}
                Node::Call { slot } => {
                    if let Some(target) = self.slots.get(slot) {
                        if visiting.contains(slot) {
                            return Err(TreeError::CallCycle(slot.clone()));
                        }
                        visiting.insert(slot.clone());
                        self.check_acyclic_from(target, visiting)?;
                        visiting.remove(slot);
                    }
                }
                Node::Condition { if_true, if_false, .. } => {
                    stack.push(if_true.clone());
                    stack.push(if_false.clone());
                }
                Node::Weight { children, .. } => stack.extend(children.iter().cloned()),
                Node::FilterRank { candidates, .. } => stack.extend(candidates.iter().cloned()),
            }
        }
        Ok(())
    }

    /// Materialize every `Call` into its target sub-tree, producing a
    /// call-free tree the evaluator can walk without slot lookups.
    /// Iterative, with a cycle guard — `ensure_slots` should be called
    /// first so cycles surface as a validation error rather than here.
    pub fn expand_calls(&self) -> Result<Arc<Node>, TreeError> {
        self.ensure_slots()?;
        Ok(self.expand(&self.root))
    }

    fn expand(&self, node: &Arc<Node>) -> Arc<Node> {
        match node.as_ref() {
            Node::Position { .. } => node.clone(),
            Node::Call { slot } => {
                // ensure_slots guarantees this exists and is acyclic.
                self.expand(self.slots.get(slot).expect("validated slot"))
            }
            Node::Condition { left, comparator, right, if_true, if_false } => Arc::new(Node::Condition {
                left: left.clone(),
                comparator: *comparator,
                right: right.clone(),
                if_true: self.expand(if_true),
                if_false: self.expand(if_false),
            }),
            Node::Weight { mode, children } => Arc::new(Node::Weight {
                mode: mode.clone(),
                children: children.iter().map(|c| self.expand(c)).collect(),
            }),
            Node::FilterRank { candidates, rank_by, select_top, ascending } => Arc::new(Node::FilterRank {
                candidates: candidates.iter().map(|c| self.expand(c)).collect(),
                rank_by: rank_by.clone(),
                select_top: *select_top,
                ascending: *ascending,
            }),
        }
    }

    /// Deduplicate structurally-identical sub-trees so they share one
    /// `Arc` allocation (and, downstream, one evaluator cache entry).
    /// Walks bottom-up with an explicit post-order stack.
    pub fn compress(&self) -> StrategyTree {
        let mut seen: HashMap<String, Arc<Node>> = HashMap::new();
        let root = compress_node(&self.root, &mut seen);
        let slots = self
            .slots
            .iter()
            .map(|(k, v)| (k.clone(), compress_node(v, &mut seen)))
            .collect();
        StrategyTree { root, slots }
    }

    /// Every ticker referenced anywhere in the tree, deduplicated.
    pub fn tickers(&self) -> Vec<String> {
        let mut set = HashSet::new();
        self.traverse(|node| {
            collect_operand_tickers_for_node(node, &mut set);
        });
        let mut out: Vec<String> = set.into_iter().collect();
        out.sort();
        out
    }

    /// A tree with no allocating node anywhere (every path from the root
    /// terminates without a `Position`) is invalid per spec — but since
    /// `Position` is the only leaf type, the only truly empty tree is one
    /// whose root is a `Weight`/`FilterRank` with no children.
    pub fn validate_non_empty(&self) -> Result<(), TreeError> {
        fn has_position(node: &Node, slots: &HashMap<String, Arc<Node>>, depth: usize) -> bool {
            if depth > 256 {
                return false;
            }
            match node {
                Node::Position { .. } => true,
                Node::Call { slot } => slots.get(slot).map(|n| has_position(n, slots, depth + 1)).unwrap_or(false),
                Node::Condition { if_true, if_false, .. } => {
                    has_position(if_true, slots, depth + 1) || has_position(if_false, slots, depth + 1)
                }
                Node::Weight { children, .. } => children.iter().any(|c| has_position(c, slots, depth + 1)),
                Node::FilterRank { candidates, .. } => {
                    !candidates.is_empty() && candidates.iter().any(|c| has_position(c, slots, depth + 1))
                }
            }
        }

        if has_position(&self.root, &self.slots, 0) {
            Ok(())
        } else {
            Err(TreeError::EmptyStrategy)
        }
    }
}

fn compress_node(node: &Arc<Node>, seen: &mut HashMap<String, Arc<Node>>) -> Arc<Node> {
    let compressed = match node.as_ref() {
        Node::Position { .. } => node.clone(),
        Node::Call { .. } => node.clone(),
        Node::Condition { left, comparator, right, if_true, if_false } => Arc::new(Node::Condition {
            left: left.clone(),
            comparator: *comparator,
            right: right.clone(),
            if_true: compress_node(if_true, seen),
            if_false: compress_node(if_false, seen),
        }),
        Node::Weight { mode, children } => Arc::new(Node::Weight {
            mode: mode.clone(),
            children: children.iter().map(|c| compress_node(c, seen)).collect(),
        }),
        Node::FilterRank { candidates, rank_by, select_top, ascending } => Arc::new(Node::FilterRank {
            candidates: candidates.iter().map(|c| compress_node(c, seen)).collect(),
            rank_by: rank_by.clone(),
            select_top: *select_top,
            ascending: *ascending,
        }),
    };

    let key = format!("{:?}", compressed);
    seen.entry(key).or_insert(compressed).clone()
}

fn collect_operand_tickers(operand: &Operand, set: &mut HashSet<String>) {
    match operand {
        Operand::Indicator { ticker, .. } => {
            set.insert(ticker.clone());
        }
        Operand::Ratio { numerator, denominator } => {
            collect_operand_tickers(numerator, set);
            collect_operand_tickers(denominator, set);
        }
        Operand::Constant(_) => {}
    }
}

fn collect_operand_tickers_for_node(node: &Node, set: &mut HashSet<String>) {
    match node {
        Node::Position { ticker } => {
            set.insert(ticker.clone());
        }
        Node::Condition { left, right, .. } => {
            collect_operand_tickers(left, set);
            collect_operand_tickers(right, set);
        }
        Node::FilterRank { rank_by, .. } => collect_operand_tickers(rank_by, set),
        Node::Weight { .. } | Node::Call { .. } => {}
    }
}
