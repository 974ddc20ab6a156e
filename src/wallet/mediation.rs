use std::{
    collections::BTreeMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use serde::Serialize;
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::{
    connection::{Connection, ConnectionState, Invitation},
    query::{QueryId, QueryKind},
    request::MediationRequest,
    response::MediationResponse,
    selection::{CandidateCredential, InvalidSelectionError, Selection},
};

/// Observable state of every query of a mediation.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct Progress {
    pub queries: Vec<QueryProgress>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct QueryProgress {
    pub id: QueryId,
    pub kind: QueryKind,
    pub required: bool,
    pub loading: bool,
    pub candidates: Vec<CandidateCredential>,
    /// Why discovery failed; candidates are empty when set.
    pub error: Option<String>,
    /// Invitation minted by the wallet for a DID connect query.
    pub invitation: Option<Invitation>,
    pub connection: Option<ConnectionState>,
}

impl Progress {
    fn new(request: &MediationRequest) -> Self {
        let queries = request
            .queries()
            .map(|(id, query)| QueryProgress {
                id,
                kind: query.kind(),
                required: query.is_required(),
                loading: true,
                candidates: Vec::new(),
                error: None,
                invitation: None,
                connection: None,
            })
            .collect();

        Self { queries }
    }

    pub fn query(&self, id: QueryId) -> Option<&QueryProgress> {
        self.queries.get(id.0)
    }

    /// Whether discovery has finished, successfully or not, for every query.
    pub fn is_settled(&self) -> bool {
        self.queries.iter().all(|query| !query.loading)
    }

    /// Check that `selection` could be submitted.
    ///
    /// Every selected id must be a candidate of its query, and every required query needs at
    /// least one selected candidate.
    pub fn validate(&self, selection: &Selection) -> Result<(), InvalidSelectionError> {
        for query_id in selection.queries() {
            let query = self
                .query(query_id)
                .ok_or(InvalidSelectionError::UnknownQuery(query_id))?;

            if query.kind == QueryKind::DidConnect {
                if selection.selected(query_id).next().is_some() {
                    return Err(InvalidSelectionError::NotSelectable(query_id));
                }
                continue;
            }

            for candidate in selection.selected(query_id) {
                if !query.candidates.iter().any(|c| c.id == candidate) {
                    return Err(InvalidSelectionError::UnknownCandidate {
                        query: query_id,
                        candidate: candidate.to_owned(),
                    });
                }
            }
        }

        for query in self.queries.iter().filter(|query| query.required) {
            if selection.selected(query.id).next().is_none() {
                return Err(InvalidSelectionError::EmptyRequiredQuery(query.id));
            }
        }

        Ok(())
    }

    /// The selected candidates of `query`, in discovery order.
    pub(crate) fn selected<'a>(
        &'a self,
        query: QueryId,
        selection: &'a Selection,
    ) -> impl Iterator<Item = &'a CandidateCredential> {
        self.query(query)
            .into_iter()
            .flat_map(|q| q.candidates.iter())
            .filter(move |candidate| selection.is_selected(query, &candidate.id))
    }
}

/// A client-side view of an in-flight mediation.
///
/// Dropping the last clone of a handle abandons the mediation: the relying party is answered
/// with a "mediation abandoned" error.
#[derive(Clone, Debug)]
pub struct MediationHandle {
    id: Uuid,
    progress: watch::Receiver<Progress>,
    _alive: Arc<oneshot::Sender<()>>,
}

impl MediationHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// A snapshot of the current progress.
    pub fn progress(&self) -> Progress {
        self.progress.borrow().clone()
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    /// Check a selection against the current progress, without submitting it.
    pub fn validate(&self, selection: &Selection) -> Result<(), InvalidSelectionError> {
        self.progress.borrow().validate(selection)
    }
}

/// The relying party's end of a mediation: resolves to its single response.
#[derive(Debug)]
pub struct PendingResponse(oneshot::Receiver<MediationResponse>);

impl PendingResponse {
    pub async fn recv(self) -> MediationResponse {
        self.0
            .await
            .unwrap_or_else(|_| MediationResponse::error("mediation abandoned"))
    }
}

/// Resolves once every clone of a [MediationHandle] has been dropped.
#[derive(Debug)]
pub(crate) struct HandleDropped(oneshot::Receiver<()>);

impl HandleDropped {
    pub(crate) async fn wait(self) {
        let _ = self.0.await;
    }
}

/// State owned by a single mediation.
pub(crate) struct Mediation {
    id: Uuid,
    request: MediationRequest,
    progress: watch::Sender<Progress>,
    closed: watch::Sender<bool>,
    responder: Mutex<Option<oneshot::Sender<MediationResponse>>>,
    connections: Mutex<BTreeMap<QueryId, Connection>>,
    resolving: AtomicBool,
}

impl Mediation {
    pub(crate) fn new(
        id: Uuid,
        request: MediationRequest,
    ) -> (Self, MediationHandle, PendingResponse, HandleDropped) {
        let (progress, progress_rx) = watch::channel(Progress::new(&request));
        let (responder, response_rx) = oneshot::channel();
        let (closed, _) = watch::channel(false);
        let (alive, dropped) = oneshot::channel();

        let mediation = Self {
            id,
            request,
            progress,
            closed,
            responder: Mutex::new(Some(responder)),
            connections: Mutex::new(BTreeMap::new()),
            resolving: AtomicBool::new(false),
        };
        let handle = MediationHandle {
            id,
            progress: progress_rx,
            _alive: Arc::new(alive),
        };

        (
            mediation,
            handle,
            PendingResponse(response_rx),
            HandleDropped(dropped),
        )
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn request(&self) -> &MediationRequest {
        &self.request
    }

    pub(crate) fn snapshot(&self) -> Progress {
        self.progress.borrow().clone()
    }

    pub(crate) fn update(&self, query: QueryId, f: impl FnOnce(&mut QueryProgress)) {
        self.progress.send_modify(|progress| {
            if let Some(query) = progress.queries.get_mut(query.0) {
                f(query)
            }
        });
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Mark the mediation as being resolved; fails if it already is.
    pub(crate) fn start_resolving(&self) -> bool {
        self.resolving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) async fn connections(&self) -> BTreeMap<QueryId, Connection> {
        self.connections.lock().await.clone()
    }

    pub(crate) async fn store_connection(&self, query: QueryId, connection: Connection) {
        let state = connection.state();
        self.connections.lock().await.insert(query, connection);
        self.update(query, |progress| progress.connection = Some(state));
    }

    /// Deliver the response, unless one was already delivered.
    ///
    /// Closes the mediation either way, so every suspended operation winds down.
    pub(crate) async fn emit(&self, response: MediationResponse) -> bool {
        let responder = self.responder.lock().await.take();
        self.close().await;

        let Some(responder) = responder else {
            debug!(mediation = %self.id, "response already delivered, dropping {}", response.data_type());
            return false;
        };

        debug!(mediation = %self.id, data_type = response.data_type(), "delivering response");
        if responder.send(response).is_err() {
            warn!(mediation = %self.id, "relying party stopped listening before the response");
        }
        true
    }

    async fn close(&self) {
        self.closed.send_replace(true);
        self.connections.lock().await.clear();
    }

    /// Run `fut` unless the mediation closes first.
    pub(crate) async fn until_closed<F: Future>(&self, fut: F) -> Option<F::Output> {
        let mut closed = self.closed.subscribe();

        tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => None,
            output = fut => Some(output),
        }
    }
}

impl Drop for Mediation {
    fn drop(&mut self) {
        if let Some(responder) = self.responder.get_mut().take() {
            warn!(mediation = %self.id, "mediation dropped before answering");
            let _ = responder.send(MediationResponse::error("mediation abandoned"));
        }
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed || closed.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{
        presentation_definition::PresentationDefinition,
        input_descriptor::{Constraints, InputDescriptor},
        query::{DidConnectQuery, Query},
    };
    use serde_json::json;

    fn request() -> MediationRequest {
        MediationRequest::new(
            "https://verifier.example.dev",
            vec![
                Query::PresentationDefinition(PresentationDefinition::new(
                    "pd",
                    InputDescriptor::new("citizenship_input_1", Constraints::new()),
                )),
                Query::DidConnect(DidConnectQuery::default()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn validation_rules() {
        let mut progress = Progress::new(&request());
        progress.queries[0].candidates =
            vec![CandidateCredential::new("prc", "citizenship_input_1", json!({}))];

        assert_eq!(
            progress.validate(&Selection::new()),
            Err(InvalidSelectionError::EmptyRequiredQuery(QueryId(0)))
        );
        assert!(matches!(
            progress.validate(&Selection::new().select(QueryId(0), "udc")),
            Err(InvalidSelectionError::UnknownCandidate { .. })
        ));
        assert_eq!(
            progress.validate(&Selection::new().select(QueryId(0), "prc").select(QueryId(1), "x")),
            Err(InvalidSelectionError::NotSelectable(QueryId(1)))
        );
        assert_eq!(
            progress.validate(&Selection::new().select(QueryId(0), "prc").select(QueryId(7), "x")),
            Err(InvalidSelectionError::UnknownQuery(QueryId(7)))
        );
        assert_eq!(progress.validate(&Selection::new().select(QueryId(0), "prc")), Ok(()));
    }

    #[tokio::test]
    async fn emits_exactly_once() {
        let (mediation, _handle, pending, _) = Mediation::new(Uuid::new_v4(), request());

        assert!(mediation.emit(MediationResponse::success()).await);
        assert!(!mediation.emit(MediationResponse::error("late")).await);
        assert_eq!(pending.recv().await, MediationResponse::success());
    }

    #[tokio::test]
    async fn dropping_an_unanswered_mediation_answers_with_an_error() {
        let (mediation, _handle, pending, _) = Mediation::new(Uuid::new_v4(), request());
        drop(mediation);

        assert!(pending.recv().await.is_error());
    }

    #[tokio::test]
    async fn closing_stops_suspended_work() {
        let (mediation, _handle, _pending, _) = Mediation::new(Uuid::new_v4(), request());
        mediation.emit(MediationResponse::success()).await;

        let output = mediation.until_closed(std::future::pending::<()>()).await;
        assert!(output.is_none());
    }

    #[tokio::test]
    async fn last_handle_drop_is_observed() {
        let (_mediation, handle, _pending, dropped) = Mediation::new(Uuid::new_v4(), request());
        let clone = handle.clone();

        drop(handle);
        let mut dropped = Box::pin(dropped.wait());
        assert!(poll_once(dropped.as_mut()).await.is_none());

        drop(clone);
        dropped.await;
    }

    async fn poll_once<F: Future + Unpin>(fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            output = fut => Some(output),
            _ = std::future::ready(()) => None,
        }
    }
}
