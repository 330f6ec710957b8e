pub mod memory_store;
pub mod session_store;

pub use memory_store::InMemorySessionStore;
pub use session_store::{PgSessionStore, SessionStore, StoreError};
