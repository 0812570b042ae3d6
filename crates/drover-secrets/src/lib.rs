//! Secret access control for Drover tasks.
//!
//! A task reads credentials through a [`SecretResolver`], which combines
//! the operator's declared [`SecretFilter`], the user's [`GrantTree`] and a
//! system [`SecretAccessPolicy`] before looking the value up in a
//! [`SecretStore`].

pub mod error;
pub mod grant;
pub mod key;
pub mod policy;
pub mod resolver;
pub mod selector;
pub mod store;
pub mod template;

pub use error::{Result, SecretError};
pub use grant::{Grant, GrantDecision, GrantTree};
pub use key::SecretKey;
pub use policy::{DenyAllPolicy, PrefixAccessPolicy, SecretAccessContext, SecretAccessPolicy};
pub use resolver::{ScopedSecrets, SecretProvider, SecretResolver};
pub use selector::{SecretFilter, SecretSelector};
pub use store::{MemorySecretStore, SecretScope, SecretStore};
pub use template::{contains_secret_references, render_secret_template};
