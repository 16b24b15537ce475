//! Persisted client-side state: session token and theme preference.

mod store;

pub use store::{
    CredentialStore, JsonFileStore, KeyValueStore, MemoryStore, SESSION_TOKEN_KEY, StoreError,
    THEME_KEY, Theme,
};
