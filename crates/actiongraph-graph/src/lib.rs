pub mod attributes;
pub mod context;
pub mod events;
pub mod graph;
pub mod index;
pub mod memory_store;
pub mod node;
pub mod notifier;
pub mod search;
mod session;
pub mod watch;

pub use attributes::{AttributeDeltas, GroupDelta, PropertyDelta};
pub use context::GraphContext;
pub use events::{ChangeKind, GraphDelegate, GraphEvent};
pub use graph::{CommitSummary, Graph, GraphBuilder};
pub use index::{IndexKey, MultiIndex};
pub use memory_store::MemoryStore;
pub use node::{Action, AnyNode, Bond, Entity, GraphNode, Lifecycle, NodeKey};
pub use notifier::CommitPhase;
pub use search::{Query, SearchResults};
pub use watch::{MatchKind, Subscription, WatchRegistry};

pub use actiongraph_core::{GraphConfig, GraphError, NodeId, ObjectKind, Result, Timestamp, Value};
