//! Arena-backed variable trees
//!
//! Each variable collection (globals, one per stack level for locals,
//! upvalues and environment variables, one per watch) is a [`VarTree`].
//! Node ids stay valid until the node is removed or the tree is cleared.

use std::cmp::Ordering;

use luadbg_protocol::LuaType;

use crate::variable::{VarIdentity, VariableRecord};

/// Handle to a node inside one [`VarTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct VarNode {
    pub var: VariableRecord,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl VarNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Clone, Default)]
pub struct VarTree {
    nodes: Vec<Option<VarNode>>,
    roots: Vec<NodeId>,
    live: usize,
}

impl VarTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.live = 0;
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> Option<&VarNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut VarNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn var(&self, id: NodeId) -> Option<&VariableRecord> {
        self.get(id).map(|n| &n.var)
    }

    pub fn var_mut(&mut self, id: NodeId) -> Option<&mut VariableRecord> {
        self.get_mut(id).map(|n| &mut n.var)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Insert a top-level variable, refreshing an existing root with the
    /// same identity instead of duplicating it
    pub fn insert_root(&mut self, var: VariableRecord) -> NodeId {
        if let Some(existing) = self.find_in(&self.roots, &var.identity) {
            self.refresh(existing, var);
            return existing;
        }
        let id = self.push(var, None);
        self.roots.push(id);
        id
    }

    /// Insert a variable under `parent`. Returns `None` when the parent
    /// does not exist.
    pub fn insert_child(&mut self, parent: NodeId, var: VariableRecord) -> Option<NodeId> {
        let siblings = self.get(parent)?.children.clone();
        if let Some(existing) = self.find_in(&siblings, &var.identity) {
            self.refresh(existing, var);
            return Some(existing);
        }
        let id = self.push(var, Some(parent));
        self.get_mut(parent)?.children.push(id);
        Some(id)
    }

    /// Remove a node and everything below it
    pub fn remove(&mut self, id: NodeId) -> Option<VariableRecord> {
        let node = self.nodes.get_mut(id.0)?.take()?;
        self.live -= 1;
        match node.parent {
            Some(parent) => {
                if let Some(p) = self.get_mut(parent) {
                    p.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
        for child in node.children {
            self.remove_detached(child);
        }
        Some(node.var)
    }

    fn remove_detached(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) {
            self.live -= 1;
            for child in node.children {
                self.remove_detached(child);
            }
        }
    }

    pub fn find_root(&self, display_name: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|id| self.var(*id).is_some_and(|v| v.display_name == display_name))
    }

    pub fn find_child(&self, parent: NodeId, display_name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|id| self.var(*id).is_some_and(|v| v.display_name == display_name))
    }

    /// Walk a display-name path from the roots down
    pub fn resolve_path<S: AsRef<str>>(&self, path: &[S]) -> Option<NodeId> {
        let (first, rest) = path.split_first()?;
        let mut current = self.find_root(first.as_ref())?;
        for step in rest {
            current = self.find_child(current, step.as_ref())?;
        }
        Some(current)
    }

    /// Display names from the root down to `id`
    pub fn path_of(&self, id: NodeId) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.get(node_id) else { break };
            path.push(node.var.display_name.clone());
            current = node.parent;
        }
        path.reverse();
        path
    }

    /// Depth-first, parents before children, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &VarNode)> + '_ {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        std::iter::from_fn(move || {
            while let Some(id) = stack.pop() {
                if let Some(node) = self.get(id) {
                    stack.extend(node.children.iter().rev().copied());
                    return Some((id, node));
                }
            }
            None
        })
    }

    /// Expanded nodes reachable through expanded ancestors, parents first
    pub fn expanded_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            if node.var.expanded {
                out.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Apply `f` to every variable in the tree
    pub fn for_each_var_mut(&mut self, mut f: impl FnMut(&mut VariableRecord)) {
        for node in self.nodes.iter_mut().flatten() {
            f(&mut node.var);
        }
    }

    /// Children of `id` ordered for display with [`compare_keys`]
    pub fn sorted_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children = self.children(id).to_vec();
        children.sort_by(|a, b| match (self.var(*a), self.var(*b)) {
            (Some(a), Some(b)) => compare_keys(a, b),
            _ => Ordering::Equal,
        });
        children
    }

    fn push(&mut self, var: VariableRecord, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(VarNode {
            var,
            parent,
            children: Vec::new(),
        }));
        self.live += 1;
        id
    }

    fn find_in(&self, ids: &[NodeId], identity: &VarIdentity) -> Option<NodeId> {
        ids.iter()
            .copied()
            .find(|id| self.var(*id).is_some_and(|v| v.identity == *identity))
    }

    fn refresh(&mut self, id: NodeId, var: VariableRecord) {
        if let Some(node) = self.get_mut(id) {
            node.var.refresh_from(var);
        }
    }
}

/// Display order for table keys.
///
/// Numeric keys sort numerically and before every other key; everything
/// else sorts by name. When a number key and a string key print the same
/// (`t[1]` and `t["1"]`) the number key comes first.
pub fn compare_keys(a: &VariableRecord, b: &VariableRecord) -> Ordering {
    let num = |v: &VariableRecord| {
        (v.key_type == LuaType::Number)
            .then(|| v.display_name.parse::<f64>().ok())
            .flatten()
    };
    match (num(a), num(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.display_name.cmp(&b.display_name),
    }
}
