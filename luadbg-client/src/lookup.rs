//! Lookup pipeline
//!
//! Every `VarLookUp` sent to the runtime pushes a [`PendingInsert`] onto a
//! FIFO. The runtime answers lookups strictly in order, each reply framed by
//! a `<Scope>VarLookupBegin` / items / `<Scope>VarLookupEnd` triple, so the
//! queue head always names where the next reply's variables belong.
//!
//! Desync conditions are reported as [`DesyncError`] after the pipeline has
//! already recovered. Callers log them; the session carries on.

use std::collections::VecDeque;

use luadbg_protocol::{Message, NameAndType, Scope, VarContext, VarLookUp};
use tracing::{debug, trace};

use crate::store::CollectionKey;
use crate::tree::{NodeId, VarTree};
use crate::variable::VariableRecord;

/// A `VarLookUp` before it goes on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub scope: Scope,
    pub context: VarContext,
    /// Path from the root container to the variable being looked up
    pub names_and_types: Vec<NameAndType>,
    pub level: u16,
    pub index: i32,
    /// Set for watch roots: the runtime answers with the variable itself
    /// rather than its children
    pub extra: bool,
}

impl LookupRequest {
    pub fn to_message(&self) -> Message {
        Message::VarLookUp(VarLookUp {
            scope: self.scope,
            context: self.context,
            level: self.level,
            index: self.index,
            extra: self.extra,
            names_and_types: self.names_and_types.clone(),
        })
    }
}

/// Where the variables of a reply are inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertTarget {
    /// A node that existed when the lookup was sent
    Node(NodeId),
    /// A node re-located by display names when the reply starts. An empty
    /// path inserts at the top of the collection.
    Path(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInsert {
    pub collection: CollectionKey,
    pub target: InsertTarget,
    pub request: LookupRequest,
}

/// An expanded node remembered across a stop, re-requested by display path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedExpansion {
    pub collection: CollectionKey,
    pub path: Vec<String>,
    pub request: LookupRequest,
}

impl SavedExpansion {
    pub fn into_pending(self) -> PendingInsert {
        PendingInsert {
            collection: self.collection,
            target: InsertTarget::Path(self.path),
            request: self.request,
        }
    }
}

/// Expanded nodes of `tree`, parents before children
pub fn save_expansions(
    tree: &VarTree,
    collection: CollectionKey,
    context: VarContext,
) -> Vec<SavedExpansion> {
    tree.expanded_nodes()
        .into_iter()
        .filter_map(|id| {
            let var = tree.var(id)?;
            Some(SavedExpansion {
                collection,
                path: tree.path_of(id),
                request: var.expansion_request(context),
            })
        })
        .collect()
}

/// Access to the trees replies are inserted into
pub trait TreeResolver {
    fn tree(&self, key: CollectionKey) -> Option<&VarTree>;
    fn tree_mut(&mut self, key: CollectionKey) -> Option<&mut VarTree>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DesyncError {
    #[error("{scope:?} lookup reply with no pending request")]
    OrphanedReply { scope: Scope },

    #[error("{received:?} lookup reply while a {expected:?} lookup is pending")]
    ScopeMismatch { expected: Scope, received: Scope },

    #[error("lookup target {path:?} not found in {collection:?}")]
    PathNotFound {
        collection: CollectionKey,
        path: Vec<String>,
    },

    #[error("lookup target in {collection:?} no longer exists")]
    StaleTarget { collection: CollectionKey },

    #[error("lookup reply began before the previous one ended")]
    NestedBegin,

    #[error("{scope:?} lookup end without a matching begin")]
    UnmatchedEnd { scope: Scope },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveLookup {
    scope: Scope,
    collection: CollectionKey,
    /// `None` inserts at the collection top
    parent: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    LookingUp {
        /// `None` while a dropped reply drains
        active: Option<ActiveLookup>,
        /// Whether the reply consumed the queue head
        owns_head: bool,
    },
}

#[derive(Debug)]
pub struct LookupPipeline {
    pending: VecDeque<PendingInsert>,
    state: State,
}

impl Default for LookupPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl LookupPipeline {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            state: State::Idle,
        }
    }

    /// Record a lookup that has just been sent
    pub fn push(&mut self, pending: PendingInsert) {
        trace!(collection = ?pending.collection, target = ?pending.target, "lookup queued");
        self.pending.push_back(pending);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn head(&self) -> Option<&PendingInsert> {
        self.pending.front()
    }

    pub fn is_looking_up(&self) -> bool {
        matches!(self.state, State::LookingUp { .. })
    }

    /// Forget every pending lookup and any reply in progress
    pub fn clear(&mut self) {
        self.pending.clear();
        self.state = State::Idle;
    }

    /// A `<Scope>VarLookupBegin` arrived
    pub fn begin(&mut self, scope: Scope, trees: &mut impl TreeResolver) -> Result<(), DesyncError> {
        let nested = if let State::LookingUp { owns_head, .. } = self.state {
            // The previous reply never ended; its request is abandoned.
            if owns_head {
                self.pending.pop_front();
            }
            self.state = State::Idle;
            true
        } else {
            false
        };

        let result = self.start(scope, trees);
        match result {
            Err(e) => Err(e),
            Ok(()) if nested => Err(DesyncError::NestedBegin),
            Ok(()) => Ok(()),
        }
    }

    fn start(&mut self, scope: Scope, trees: &mut impl TreeResolver) -> Result<(), DesyncError> {
        let Some(head) = self.pending.front() else {
            self.state = State::LookingUp {
                active: None,
                owns_head: false,
            };
            return Err(DesyncError::OrphanedReply { scope });
        };

        // From here on the reply owns the head; a failure drops the lookup
        // but the matching End still pops it.
        self.state = State::LookingUp {
            active: None,
            owns_head: true,
        };

        if head.request.scope != scope {
            return Err(DesyncError::ScopeMismatch {
                expected: head.request.scope,
                received: scope,
            });
        }

        let collection = head.collection;
        let parent = match &head.target {
            InsertTarget::Node(id) => {
                let exists = trees.tree(collection).is_some_and(|t| t.get(*id).is_some());
                if !exists {
                    return Err(DesyncError::StaleTarget { collection });
                }
                Some(*id)
            }
            InsertTarget::Path(path) if path.is_empty() => {
                // Watch roots: the reply replaces whatever the watch held.
                let tree = trees
                    .tree_mut(collection)
                    .ok_or(DesyncError::StaleTarget { collection })?;
                if matches!(collection, CollectionKey::Watch(_)) {
                    tree.clear();
                }
                None
            }
            InsertTarget::Path(path) => {
                let tree = trees
                    .tree_mut(collection)
                    .ok_or(DesyncError::StaleTarget { collection })?;
                let id = tree.resolve_path(path).ok_or_else(|| DesyncError::PathNotFound {
                    collection,
                    path: path.clone(),
                })?;
                if let Some(var) = tree.var_mut(id) {
                    var.expanded = true;
                }
                Some(id)
            }
        };

        debug!(?scope, ?collection, "lookup reply started");
        self.state = State::LookingUp {
            active: Some(ActiveLookup {
                scope,
                collection,
                parent,
            }),
            owns_head: true,
        };
        Ok(())
    }

    /// A variable arrived while a lookup reply is in progress. Returns where
    /// it was inserted, or `None` when the reply is being drained.
    pub fn item(
        &mut self,
        var: VariableRecord,
        trees: &mut impl TreeResolver,
    ) -> Result<Option<(CollectionKey, NodeId)>, DesyncError> {
        let received = var.scope.kind();
        let active = match self.state {
            State::Idle => return Err(DesyncError::OrphanedReply { scope: received }),
            State::LookingUp { active: None, .. } => return Ok(None),
            State::LookingUp {
                active: Some(active),
                ..
            } => active,
        };

        if active.scope != received {
            return Err(DesyncError::ScopeMismatch {
                expected: active.scope,
                received,
            });
        }

        let collection = active.collection;
        let tree = trees
            .tree_mut(collection)
            .ok_or(DesyncError::StaleTarget { collection })?;
        let id = match active.parent {
            None => tree.insert_root(var),
            Some(parent) => tree
                .insert_child(parent, var)
                .ok_or(DesyncError::StaleTarget { collection })?,
        };
        Ok(Some((collection, id)))
    }

    /// A `<Scope>VarLookupEnd` arrived. Returns the completed lookup.
    pub fn end(&mut self, scope: Scope) -> Result<Option<PendingInsert>, DesyncError> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => Err(DesyncError::UnmatchedEnd { scope }),
            State::LookingUp { owns_head, .. } => {
                Ok(if owns_head { self.pending.pop_front() } else { None })
            }
        }
    }
}
