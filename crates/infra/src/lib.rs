//! Infrastructure layer: relationship stores, entity lifecycle, the
//! store-backed authorization and credential checks, and sessions.

pub mod authorizer;
pub mod credentials;
pub mod lifecycle;
pub mod session;
pub mod store;


pub use authorizer::Authorizer;
pub use credentials::CredentialChecker;
pub use lifecycle::{Persistable, create_or_update};
pub use session::{
    InMemorySessionStore, SessionStore, SessionToken, SqliteSessionStore, spawn_periodic_cleanup,
};
pub use store::{
    InMemoryRelationshipStore, PermissionKey, RelationshipStore, SqliteRelationshipStore,
    StoreOptions, UserKey,
};
