pub mod engine;
pub mod memory;
pub mod options;

pub use engine::{Database, Datapoint, Namespace, NamespaceShard, NewDatabaseFn};
pub use memory::{InMemoryDatabase, MemoryNamespace, MemoryShard};
pub use options::{DatabaseOptions, NamespaceMetadata, NamespaceOptions};
