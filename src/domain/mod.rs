//! Approval state machines and the content taxonomy. Every operation takes
//! the calling [`Actor`](policy::Actor) explicitly and talks to the outside
//! world only through the collaborator traits held by [`Engine`].

pub mod documents;
pub mod error;
pub mod identity;
pub mod model;
pub mod policy;
pub mod taxonomy;

use std::sync::Arc;

use crate::{
    notify::NotificationDispatcher,
    objects::ObjectStore,
    security::{CredentialVerifier, TokenIssuer},
    store::RecordStore,
};

pub use error::{CoreError, CoreResult, ErrorKind};
pub use policy::{Action, Actor, DenyReason, Resource, authorize};

pub struct Engine<S> {
    store: S,
    credentials: Arc<dyn CredentialVerifier>,
    tokens: Arc<dyn TokenIssuer>,
    notifier: Arc<dyn NotificationDispatcher>,
    objects: Arc<dyn ObjectStore>,
    client_url: String,
}

impl<S: RecordStore> Engine<S> {
    pub fn new(
        store: S,
        credentials: Arc<dyn CredentialVerifier>,
        tokens: Arc<dyn TokenIssuer>,
        notifier: Arc<dyn NotificationDispatcher>,
        objects: Arc<dyn ObjectStore>,
        client_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            credentials,
            tokens,
            notifier,
            objects,
            client_url: client_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs the policy table and turns a denial into `CoreError::Forbidden`.
    fn require(&self, actor: &Actor, action: Action, resource: Resource) -> CoreResult<()> {
        authorize(actor, action, resource)
            .into_result()
            .map_err(CoreError::Forbidden)
    }

    fn client_link(&self, path: &str, token: &str) -> String {
        format!("{}{path}?token={token}", self.client_url)
    }
}
