//! luadbg-client: debugger front-end core for Lua runtimes speaking SCMP
//!
//! Decoded messages flow into a [`DebugSession`], which builds variable
//! records, matches lookup replies to the requests that caused them, keeps
//! the call stack and watches in sync across stops, and sends its requests
//! through a [`Transport`].

pub mod analysis;
pub mod callstack;
pub mod config;
pub mod edit;
pub mod events;
pub mod filter;
pub mod lookup;
pub mod memtrace;
pub mod persistence;
pub mod profiler;
pub mod runtime;
pub mod session;
pub mod store;
pub mod transport;
pub mod tree;
pub mod variable;
pub mod watch;

// Re-export main types at crate root
pub use callstack::{CallStack, Frame};
pub use config::{ClientConfig, ConfigLoader};
pub use edit::EditError;
pub use events::SessionEvent;
pub use filter::{ScopeFilter, VarFilters};
pub use lookup::{DesyncError, InsertTarget, LookupPipeline, LookupRequest, PendingInsert};
pub use persistence::{InvalidWatch, WatchRecord, WatchStore};
pub use session::DebugSession;
pub use store::{CollectionKey, VariableStore};
pub use transport::{ChannelTransport, LinkState, Transport};
pub use tree::{NodeId, VarTree};
pub use variable::{build_variable, BuildError, VarIdentity, VariableRecord, VariableScope};
pub use watch::{CustomVariable, CustomWatchProvider, UpdateContext, VarRenderer, WatchEntry, WatchId, WatchList};
