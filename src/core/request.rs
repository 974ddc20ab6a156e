use serde_json::Value as Json;
use url::Url;

use super::query::{Query, QueryId};
use crate::utils::NonEmptyVec;

/// A relying party's request for credentials.
///
/// Construction enforces the request invariants: a non-empty absolute origin and at least one
/// query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediationRequest {
    origin: Url,
    queries: NonEmptyVec<Query>,
    challenge: Option<String>,
    domain: Option<String>,
}

impl MediationRequest {
    pub fn new(origin: &str, queries: Vec<Query>) -> Result<Self, RequestError> {
        if origin.trim().is_empty() {
            return Err(RequestError::EmptyOrigin);
        }
        let origin = Url::parse(origin).map_err(|e| RequestError::InvalidOrigin(e.to_string()))?;
        let queries = NonEmptyVec::maybe_new(queries).ok_or(RequestError::NoQueries)?;

        Ok(Self {
            origin,
            queries,
            challenge: None,
            domain: None,
        })
    }

    pub fn with_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.challenge = Some(challenge.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn challenge(&self) -> Option<&str> {
        self.challenge.as_deref()
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// The queries, in request order, paired with their identifiers.
    pub fn queries(&self) -> impl Iterator<Item = (QueryId, &Query)> {
        self.queries
            .iter()
            .enumerate()
            .map(|(i, query)| (QueryId(i), query))
    }

    pub fn query(&self, id: QueryId) -> Option<&Query> {
        self.queries.get(id.0)
    }

    /// Whether the request asks for nothing but DID connections.
    pub fn is_connection_only(&self) -> bool {
        self.queries
            .iter()
            .all(|query| matches!(query, Query::DidConnect(_)))
    }
}

/// A relying party's request to store credentials in the wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreRequest {
    origin: Url,
    credentials: NonEmptyVec<Json>,
}

impl StoreRequest {
    pub fn new(origin: &str, credentials: Vec<Json>) -> Result<Self, RequestError> {
        if origin.trim().is_empty() {
            return Err(RequestError::EmptyOrigin);
        }
        let origin = Url::parse(origin).map_err(|e| RequestError::InvalidOrigin(e.to_string()))?;
        let credentials =
            NonEmptyVec::maybe_new(credentials).ok_or(RequestError::NoCredentials)?;

        Ok(Self {
            origin,
            credentials,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn credentials(&self) -> &[Json] {
        &self.credentials
    }

    pub fn into_credentials(self) -> Vec<Json> {
        self.credentials.into_inner()
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("request origin is empty")]
    EmptyOrigin,

    #[error("invalid request origin: {0}")]
    InvalidOrigin(String),

    #[error("request carries no queries")]
    NoQueries,

    #[error("store request carries no credentials")]
    NoCredentials,
}
