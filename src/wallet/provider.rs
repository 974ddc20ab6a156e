//! Capabilities the wallet delegates to its agent and its user interface.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as Json;
use tokio::sync::watch;

use crate::core::{
    connection::{Connection, ConnectionError, ConnectionEvent, ConnectionId, ConnectionState, Invitation},
    presentation_definition::PresentationDefinition,
    presentation_submission::DescriptorMap,
    query::{QueryError, RawQuery},
    response::SigningError,
    selection::{CandidateCredential, InvalidSelectionError, Selection},
};

use super::mediation::Progress;

/// Finds credentials in the wallet that answer a query.
#[async_trait]
pub trait CredentialQueryProvider: Send + Sync {
    /// Candidates satisfying the input descriptors of `definition`, in descriptor order.
    async fn find_credentials(
        &self,
        definition: &PresentationDefinition,
    ) -> Result<Vec<CandidateCredential>, QueryError>;

    /// Candidates for a query type the wallet does not interpret itself.
    async fn find_raw(&self, query: &RawQuery) -> Result<Vec<CandidateCredential>, QueryError> {
        Err(QueryError::Unsupported(query.kind.clone()))
    }

    /// The credential to present for a selected candidate.
    ///
    /// Called once every connection of the request has completed, so a provider may hand back
    /// a credential that was issued over one of `connections` in the meantime.
    async fn materialize(
        &self,
        candidate: &CandidateCredential,
        _connections: &[Connection],
    ) -> Result<Json, QueryError> {
        Ok(candidate.credential.clone())
    }
}

/// Input to [PresentationSigner::build_presentation].
#[derive(Clone, Debug, PartialEq)]
pub struct PresentationInput {
    pub credentials: Vec<Json>,
    pub descriptor_map: Vec<DescriptorMap>,
    pub challenge: Option<String>,
    pub domain: Option<String>,
}

/// What a signer hands back: the presented credentials, their descriptor map and the proof.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedPresentation {
    pub verifiable_credential: Vec<Json>,
    pub descriptor_map: Vec<DescriptorMap>,
    pub proof: Json,
}

/// Produces the holder's proof over a presentation.
#[async_trait]
pub trait PresentationSigner: Send + Sync {
    async fn build_presentation(
        &self,
        input: PresentationInput,
    ) -> Result<SignedPresentation, SigningError>;
}

/// Establishes DID connections with relying parties.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Mint an invitation the relying party can accept.
    async fn create_invitation(&self) -> Result<Invitation, ConnectionError>;

    /// Accept an inbound invitation, returning the id of the requested connection.
    async fn accept_invitation(&self, invitation: &Invitation)
        -> Result<ConnectionId, ConnectionError>;

    /// Wait until `connection_id` reaches `target`, or fails.
    ///
    /// Implementations should honor `timeout`; the caller enforces it regardless.
    async fn await_state(
        &self,
        connection_id: &str,
        target: ConnectionState,
        timeout: Duration,
    ) -> Result<ConnectionEvent, ConnectionError>;
}

/// What the holder decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Submit(Selection),
    Cancel,
}

/// The user interface (or any policy standing in for it) that picks credentials.
#[async_trait]
pub trait DecisionSurface: Send + Sync {
    /// Observe `progress` and decide.
    async fn decide(&self, progress: watch::Receiver<Progress>) -> Decision;

    /// The last submitted selection was rejected; [DecisionSurface::decide] is called again.
    async fn rejected(&self, _error: &InvalidSelectionError) {}
}

/// Persists credentials handed to the wallet by a relying party.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn save(&self, credential: Json) -> Result<(), QueryError>;
}
