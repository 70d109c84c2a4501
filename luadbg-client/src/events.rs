//! Notifications for consumers rendering the session state

use crate::store::CollectionKey;
use crate::tree::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// All variable collections and the call stack are about to be dropped
    Clearing,
    Cleared,
    LevelAdding { level: u16 },
    LevelAdded { level: u16 },
    StackLevelChanging { from: u16, to: u16 },
    StackLevelChanged { from: u16, to: u16 },
    StackLevelLookingUp { level: u16 },
    StackLevelLookedUp { level: u16 },
    VariableInserted { collection: CollectionKey, node: NodeId },
    WatchesChanged,
}
