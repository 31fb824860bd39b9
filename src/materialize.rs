use std::collections::HashMap;

use serde::Serialize;

use crate::traits::HasParentRef;

/// A node with its eagerly loaded children, in input order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TreeNode<M> {
    pub node: M,
    pub children: Vec<TreeNode<M>>,
}

impl<M> TreeNode<M> {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes below this one.
    pub fn descendant_count(&self) -> usize {
        let mut count = 0;
        let mut pending: Vec<&TreeNode<M>> = self.children.iter().collect();
        while let Some(tree) = pending.pop() {
            count += 1;
            pending.extend(tree.children.iter());
        }
        count
    }
}

// Unlinks children one level at a time so deep chains do not exhaust the stack.
impl<M> Drop for TreeNode<M> {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut tree) = pending.pop() {
            pending.append(&mut tree.children);
        }
    }
}

/// Turn a flat list into a forest by parent reference.
///
/// Nodes whose parent is not part of `nodes` stay at the top level, whether
/// or not they are true roots, and so does a node naming itself as parent.
/// Nodes caught in a longer parent cycle are dropped. When an id occurs
/// twice, its first occurrence receives the children.
pub fn to_nested<M>(nodes: Vec<M>) -> Vec<TreeNode<M>>
where
    M: HasParentRef,
{
    let mut index: HashMap<M::Id, usize> = HashMap::with_capacity(nodes.len());
    for (position, node) in nodes.iter().enumerate() {
        index.entry(node.id()).or_insert(position);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut top_level = Vec::new();
    for (position, node) in nodes.iter().enumerate() {
        let parent = node
            .parent_id()
            .and_then(|parent_id| index.get(&parent_id).copied());

        match parent {
            Some(parent) if parent != position => children[parent].push(position),
            _ => top_level.push(position),
        }
    }

    // Preorder over the reachable positions; built in reverse so every child
    // is finished before its parent.
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack: Vec<usize> = top_level.iter().rev().copied().collect();
    while let Some(position) = stack.pop() {
        order.push(position);
        stack.extend(children[position].iter().rev().copied());
    }

    let mut slots: Vec<Option<M>> = nodes.into_iter().map(Some).collect();
    let mut finished: Vec<Option<TreeNode<M>>> = slots.iter().map(|_| None).collect();
    for &position in order.iter().rev() {
        let Some(node) = slots[position].take() else {
            continue;
        };
        let kids = children[position]
            .iter()
            .filter_map(|&child| finished[child].take())
            .collect();
        finished[position] = Some(TreeNode {
            node,
            children: kids,
        });
    }

    top_level
        .into_iter()
        .filter_map(|position| finished[position].take())
        .collect()
}
