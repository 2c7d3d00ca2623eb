//! Local persistence: key/value providers and the typed collection store.

mod local;
mod memory;
mod sqlite;
mod traits;

pub use local::{LocalStore, StoreKeys, StoreStats};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{KeyValueStore, Record};
