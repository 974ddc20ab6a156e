use std::{collections::HashMap, future::Future, sync::Arc};

use anyhow::{bail, Result};
use serde_json::Value as Json;
use tokio::{
    sync::Mutex,
    time::{timeout, timeout_at, Instant},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::MediationConfig,
    core::{
        connection::{Connection, ConnectionError, ConnectionState, Invitation},
        presentation_submission::DescriptorMap,
        query::{DidConnectQuery, Query, QueryError, QueryId},
        request::MediationRequest,
        response::{MediationResponse, SigningError, VerifiablePresentation},
        selection::{CandidateCredential, Selection},
    },
};

use mediation::{HandleDropped, Mediation};
use provider::{
    ConnectionProvider, CredentialQueryProvider, Decision, DecisionSurface, PresentationInput,
    PresentationSigner, SignedPresentation,
};

mod error;
mod mediation;
pub mod memory;
pub mod provider;
pub mod store;

pub use error::MediationError;
pub use mediation::{MediationHandle, PendingResponse, Progress, QueryProgress};

/// Mediates credential requests between a relying party and the holder.
///
/// Every request handed to [MediationHandler::begin] is answered exactly once: with a
/// presentation once the holder's selection has been assembled and signed, or with an error
/// response when the holder cancels or anything downstream of the selection fails.
#[derive(Clone)]
pub struct MediationHandler {
    query_provider: Arc<dyn CredentialQueryProvider>,
    signer: Arc<dyn PresentationSigner>,
    connection_provider: Arc<dyn ConnectionProvider>,
    config: MediationConfig,
    in_flight: Arc<Mutex<HashMap<Uuid, Arc<Mediation>>>>,
}

impl MediationHandler {
    /// Build a new mediation handler.
    pub fn builder() -> MediationHandlerBuilder {
        MediationHandlerBuilder::default()
    }

    pub fn config(&self) -> &MediationConfig {
        &self.config
    }

    /// Number of mediations that have not been answered yet.
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Start mediating `request`.
    ///
    /// Discovery runs in the background, one task per query; its progress is published on the
    /// returned handle. The [PendingResponse] resolves once the mediation is answered.
    pub async fn begin(&self, request: MediationRequest) -> (MediationHandle, PendingResponse) {
        let id = Uuid::new_v4();
        let (mediation, handle, pending, dropped) = Mediation::new(id, request);
        let mediation = Arc::new(mediation);

        info!(
            mediation = %id,
            origin = %mediation.request().origin(),
            queries = mediation.request().queries().count(),
            "mediation started"
        );

        self.in_flight.lock().await.insert(id, mediation.clone());

        for (query_id, _) in mediation.request().queries() {
            let handler = self.clone();
            let mediation = mediation.clone();
            tokio::spawn(async move { handler.discover(&mediation, query_id).await });
        }

        let handler = self.clone();
        tokio::spawn(async move { handler.abandon_on_drop(&mediation, dropped).await });

        (handle, pending)
    }

    /// Submit the holder's selection.
    ///
    /// Waits for discovery to settle, then validates `selection`. A rejected selection is
    /// returned as [MediationError::InvalidSelection] and leaves the mediation open, so the
    /// holder can choose again. Once accepted, the outcome is delivered to the relying party
    /// through the [PendingResponse] and this returns `Ok(())`, even if that outcome is an error.
    pub async fn resolve(
        &self,
        handle: &MediationHandle,
        selection: Selection,
    ) -> Result<(), MediationError> {
        let mediation = self.lookup(handle.id()).await?;
        let id = mediation.id();

        self.settled(&mediation).await?;
        mediation.snapshot().validate(&selection)?;

        if !mediation.start_resolving() {
            return Err(MediationError::AlreadyResolving(id));
        }
        info!(mediation = %id, "selection accepted");

        let Some(assembled) = mediation
            .until_closed(self.assemble(&mediation, &selection))
            .await
        else {
            debug!(mediation = %id, "mediation closed while assembling the response");
            return Ok(());
        };

        let response = assembled.unwrap_or_else(|e| {
            warn!(mediation = %id, error = %e, "mediation failed");
            MediationResponse::error(e)
        });
        self.finish(&mediation, response).await;

        Ok(())
    }

    /// Cancel a mediation on behalf of the holder.
    ///
    /// The relying party receives a "user cancelled" error unless a response was already
    /// delivered. Cancelling an answered mediation does nothing.
    pub async fn cancel(&self, handle: &MediationHandle) {
        let Some(mediation) = self.in_flight.lock().await.remove(&handle.id()) else {
            debug!(mediation = %handle.id(), "nothing to cancel");
            return;
        };

        info!(mediation = %mediation.id(), "mediation cancelled");
        mediation
            .emit(MediationResponse::error(MediationError::UserCancelled))
            .await;
    }

    /// Drive a whole mediation against `surface`, returning the response delivered to the
    /// relying party.
    pub async fn mediate(
        &self,
        request: MediationRequest,
        surface: &dyn DecisionSurface,
    ) -> Result<MediationResponse, MediationError> {
        let (handle, pending) = self.begin(request).await;

        loop {
            match surface.decide(handle.subscribe()).await {
                Decision::Cancel => {
                    self.cancel(&handle).await;
                    break;
                }
                Decision::Submit(selection) => match self.resolve(&handle, selection).await {
                    Err(MediationError::InvalidSelection(e)) => {
                        debug!(mediation = %handle.id(), error = %e, "selection rejected");
                        surface.rejected(&e).await;
                    }
                    Err(e) => return Err(e),
                    Ok(()) => break,
                },
            }
        }

        Ok(pending.recv().await)
    }

    /// Answer the relying party once the holder's side has dropped every handle.
    async fn abandon_on_drop(&self, mediation: &Mediation, dropped: HandleDropped) {
        if mediation.until_closed(dropped.wait()).await.is_none() {
            return;
        }

        if self.in_flight.lock().await.remove(&mediation.id()).is_some() {
            warn!(mediation = %mediation.id(), "handle dropped before the mediation was answered");
            mediation
                .emit(MediationResponse::error(MediationError::Abandoned))
                .await;
        }
    }

    async fn lookup(&self, id: Uuid) -> Result<Arc<Mediation>, MediationError> {
        self.in_flight
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(MediationError::NotInFlight(id))
    }

    async fn finish(&self, mediation: &Mediation, response: MediationResponse) {
        self.in_flight.lock().await.remove(&mediation.id());
        if mediation.emit(response).await {
            info!(mediation = %mediation.id(), "mediation answered");
        }
    }

    /// Wait until discovery has settled for every query.
    async fn settled(&self, mediation: &Mediation) -> Result<(), MediationError> {
        let mut progress = mediation.subscribe();
        let wait = async {
            loop {
                let settled = progress.borrow_and_update().is_settled();
                if settled || progress.changed().await.is_err() {
                    return;
                }
            }
        };

        mediation
            .until_closed(wait)
            .await
            .ok_or(MediationError::NotInFlight(mediation.id()))
    }

    async fn discover(&self, mediation: &Mediation, query_id: QueryId) {
        let Some(query) = mediation.request().query(query_id) else {
            return;
        };

        match query {
            Query::PresentationDefinition(definition) => {
                let found = self.query_provider.find_credentials(definition);
                self.settle_candidates(mediation, query_id, found).await
            }
            Query::Raw(raw) => {
                let found = self.query_provider.find_raw(raw);
                self.settle_candidates(mediation, query_id, found).await
            }
            Query::DidConnect(connect) => {
                self.prepare_connection(mediation, query_id, connect).await
            }
        }
    }

    async fn settle_candidates(
        &self,
        mediation: &Mediation,
        query_id: QueryId,
        found: impl Future<Output = Result<Vec<CandidateCredential>, QueryError>>,
    ) {
        let limit = self.config.discovery_timeout();
        let Some(found) = mediation.until_closed(timeout(limit, found)).await else {
            return;
        };

        match found.unwrap_or_else(|_| Err(QueryError::Timeout(limit))) {
            Ok(candidates) => {
                debug!(
                    mediation = %mediation.id(),
                    query = %query_id,
                    candidates = candidates.len(),
                    "discovery finished"
                );
                mediation.update(query_id, |progress| {
                    progress.loading = false;
                    progress.candidates = candidates;
                });
            }
            Err(e) => {
                warn!(mediation = %mediation.id(), query = %query_id, error = %e, "discovery failed");
                mediation.update(query_id, |progress| {
                    progress.loading = false;
                    progress.candidates.clear();
                    progress.error = Some(e.to_string());
                });
            }
        }
    }

    /// Accept the relying party's invitation, or mint one for it to accept.
    async fn prepare_connection(
        &self,
        mediation: &Mediation,
        query_id: QueryId,
        connect: &DidConnectQuery,
    ) {
        let limit = self.config.discovery_timeout();
        let prepared = async {
            match &connect.invitation {
                Some(invitation) => self
                    .connection_provider
                    .accept_invitation(invitation)
                    .await
                    .map(|id| (Connection::requested(id), None)),
                None => self
                    .connection_provider
                    .create_invitation()
                    .await
                    .map(|invitation| (Connection::invited(invitation.id()), Some(invitation))),
            }
        };

        let Some(prepared) = mediation.until_closed(timeout(limit, prepared)).await else {
            return;
        };
        let prepared: Result<(Connection, Option<Invitation>), ConnectionError> =
            prepared.unwrap_or_else(|_| Err(ConnectionError::Timeout(limit)));

        match prepared {
            Ok((connection, invitation)) => {
                debug!(
                    mediation = %mediation.id(),
                    query = %query_id,
                    connection = connection.id(),
                    state = %connection.state(),
                    "connection prepared"
                );
                mediation.store_connection(query_id, connection).await;
                mediation.update(query_id, |progress| {
                    progress.loading = false;
                    progress.invitation = invitation;
                });
            }
            Err(e) => {
                warn!(mediation = %mediation.id(), query = %query_id, error = %e, "connection setup failed");
                mediation.update(query_id, |progress| {
                    progress.loading = false;
                    progress.error = Some(e.to_string());
                });
            }
        }
    }

    async fn assemble(
        &self,
        mediation: &Mediation,
        selection: &Selection,
    ) -> Result<MediationResponse, MediationError> {
        let request = mediation.request();
        let connections = self.complete_connections(mediation).await?;
        let progress = mediation.snapshot();

        let mut credentials: Vec<Json> = Vec::new();
        let mut descriptor_map = Vec::new();

        if request.is_connection_only() {
            credentials.extend(connections.iter().map(Connection::credential));
        } else {
            for (query_id, query) in request.queries().filter(|(_, q)| q.is_selectable()) {
                for candidate in progress.selected(query_id, selection) {
                    let credential = self
                        .query_provider
                        .materialize(candidate, &connections)
                        .await?;

                    // Raw queries carry no descriptors to map.
                    if let Query::PresentationDefinition(_) = query {
                        descriptor_map.push(DescriptorMap::for_credential(
                            candidate.descriptor_id.clone(),
                            credentials.len(),
                        ));
                    }
                    credentials.push(credential);
                }
            }
        }

        let input = PresentationInput {
            credentials,
            descriptor_map,
            challenge: request.challenge().map(ToOwned::to_owned),
            domain: request.domain().map(ToOwned::to_owned),
        };

        debug!(
            mediation = %mediation.id(),
            credentials = input.credentials.len(),
            "building presentation"
        );
        let signed = self.signer.build_presentation(input.clone()).await?;
        check_signed(&input, &signed)?;

        let SignedPresentation {
            verifiable_credential,
            descriptor_map,
            proof,
        } = signed;

        Ok(MediationResponse::Presentation(VerifiablePresentation::new(
            verifiable_credential,
            descriptor_map,
            proof,
        )))
    }

    /// Wait for every DID connection of the request to complete, within a single deadline.
    async fn complete_connections(
        &self,
        mediation: &Mediation,
    ) -> Result<Vec<Connection>, ConnectionError> {
        let limit = self.config.connection_timeout();
        let deadline = Instant::now() + limit;

        let mut tracked = mediation.connections().await;
        let mut completed = Vec::new();

        for (query_id, query) in mediation.request().queries() {
            if !matches!(query, Query::DidConnect(_)) {
                continue;
            }

            let Some(mut connection) = tracked.remove(&query_id) else {
                let reason = mediation
                    .snapshot()
                    .query(query_id)
                    .and_then(|progress| progress.error.clone())
                    .unwrap_or_else(|| "no connection was prepared".to_owned());
                return Err(ConnectionError::Unexpected(format!("{query_id}: {reason}")));
            };

            if connection.state() != ConnectionState::Completed {
                debug!(
                    mediation = %mediation.id(),
                    connection = connection.id(),
                    state = %connection.state(),
                    "waiting for connection to complete"
                );
                let remaining = deadline.saturating_duration_since(Instant::now());
                let event = timeout_at(
                    deadline,
                    self.connection_provider.await_state(
                        connection.id(),
                        ConnectionState::Completed,
                        remaining,
                    ),
                )
                .await
                .map_err(|_| ConnectionError::Timeout(limit))??;
                connection.apply(event)?;
                mediation.store_connection(query_id, connection.clone()).await;
            }

            match connection.state() {
                ConnectionState::Completed => {}
                ConnectionState::Failed => {
                    return Err(ConnectionError::Failed(connection.id().to_owned()))
                }
                state => {
                    return Err(ConnectionError::Unexpected(format!(
                        "connection `{}` reported `{state}` while completion was awaited",
                        connection.id()
                    )))
                }
            }

            info!(mediation = %mediation.id(), connection = connection.id(), "connection completed");
            completed.push(connection);
        }

        Ok(completed)
    }
}

/// Check that a signer presented exactly what it was asked to.
fn check_signed(input: &PresentationInput, signed: &SignedPresentation) -> Result<(), SigningError> {
    if signed.verifiable_credential.len() != input.credentials.len() {
        return Err(SigningError::Malformed(format!(
            "expected {} credentials, signer returned {}",
            input.credentials.len(),
            signed.verifiable_credential.len()
        )));
    }

    if signed.descriptor_map != input.descriptor_map {
        return Err(SigningError::Malformed(
            "descriptor map does not match the selection".into(),
        ));
    }

    match signed.proof.as_object() {
        Some(proof) if !proof.is_empty() => {}
        _ => return Err(SigningError::Malformed("proof is missing".into())),
    }

    if let Some(challenge) = &input.challenge {
        if signed.proof.get("challenge").and_then(Json::as_str) != Some(challenge.as_str()) {
            return Err(SigningError::Malformed(
                "proof challenge does not match the request".into(),
            ));
        }
    }

    Ok(())
}

/// Builder struct for [MediationHandler].
#[derive(Clone, Default)]
pub struct MediationHandlerBuilder {
    query_provider: Option<Arc<dyn CredentialQueryProvider>>,
    signer: Option<Arc<dyn PresentationSigner>>,
    connection_provider: Option<Arc<dyn ConnectionProvider>>,
    config: MediationConfig,
}

impl MediationHandlerBuilder {
    /// Build the mediation handler.
    pub fn build(self) -> Result<MediationHandler> {
        let Self {
            query_provider,
            signer,
            connection_provider,
            config,
        } = self;

        let Some(query_provider) = query_provider else {
            bail!("query provider is required, see `with_query_provider`")
        };

        let Some(signer) = signer else {
            bail!("signer is required, see `with_signer`")
        };

        let Some(connection_provider) = connection_provider else {
            bail!("connection provider is required, see `with_connection_provider`")
        };

        Ok(MediationHandler {
            query_provider,
            signer,
            connection_provider,
            config,
            in_flight: Default::default(),
        })
    }

    /// Set the [CredentialQueryProvider] that answers credential queries.
    pub fn with_query_provider(mut self, provider: Arc<dyn CredentialQueryProvider>) -> Self {
        self.query_provider = Some(provider);
        self
    }

    /// Set the [PresentationSigner] that proves the presentation.
    pub fn with_signer(mut self, signer: Arc<dyn PresentationSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Set the [ConnectionProvider] that establishes DID connections.
    pub fn with_connection_provider(mut self, provider: Arc<dyn ConnectionProvider>) -> Self {
        self.connection_provider = Some(provider);
        self
    }

    pub fn with_config(mut self, config: MediationConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn input(challenge: Option<&str>) -> PresentationInput {
        PresentationInput {
            credentials: vec![json!({"id": "a"})],
            descriptor_map: vec![DescriptorMap::for_credential("degree", 0)],
            challenge: challenge.map(ToOwned::to_owned),
            domain: None,
        }
    }

    fn signed(input: &PresentationInput, proof: Json) -> SignedPresentation {
        SignedPresentation {
            verifiable_credential: input.credentials.clone(),
            descriptor_map: input.descriptor_map.clone(),
            proof,
        }
    }

    #[test]
    fn accepts_faithful_signer_output() {
        let input = input(Some("c-1"));
        let signed = signed(&input, json!({"type": "Ed25519Signature2018", "challenge": "c-1"}));
        assert!(check_signed(&input, &signed).is_ok());
    }

    #[test]
    fn rejects_altered_signer_output() {
        let input = input(Some("c-1"));

        let mut dropped = signed(&input, json!({"challenge": "c-1"}));
        dropped.verifiable_credential.clear();
        assert!(matches!(check_signed(&input, &dropped), Err(SigningError::Malformed(_))));

        let mut reordered = signed(&input, json!({"challenge": "c-1"}));
        reordered.descriptor_map = vec![DescriptorMap::for_credential("degree", 1)];
        assert!(matches!(check_signed(&input, &reordered), Err(SigningError::Malformed(_))));

        let unproven = signed(&input, json!({}));
        assert!(matches!(check_signed(&input, &unproven), Err(SigningError::Malformed(_))));

        let wrong_challenge = signed(&input, json!({"challenge": "c-2"}));
        assert!(matches!(
            check_signed(&input, &wrong_challenge),
            Err(SigningError::Malformed(_))
        ));
    }

    #[test]
    fn builder_requires_every_capability() {
        let err = MediationHandler::builder().build().err().unwrap();
        assert!(err.to_string().contains("query provider"));
    }
}
