mod error;
mod memory;
mod query;
mod record;
mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use query::{Filter, OrderBy, SearchFilter, SelectQuery, SelectResponse};
pub use record::{record_column, Record};
pub use traits::CollectionStore;
