use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::{
    connection::Invitation, input_descriptor::ConstraintError,
    presentation_definition::PresentationDefinition,
};

/// Stable identifier of a query: its position in the request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct QueryId(pub usize);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query-{}", self.0)
    }
}

/// One of the questions a relying party asks in a mediation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    PresentationDefinition(PresentationDefinition),
    DidConnect(DidConnectQuery),
    Raw(RawQuery),
}

/// A request to establish a DIDComm connection with the relying party.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DidConnectQuery {
    /// Invitation supplied by the relying party. When absent, the wallet mints one.
    pub invitation: Option<Invitation>,
    pub challenge: Option<String>,
    pub domain: Option<String>,
    /// Credential manifest describing what the relying party will issue over the connection.
    pub manifest: Option<Json>,
}

/// A query of a type the wallet does not interpret itself, forwarded to the query provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawQuery {
    pub kind: String,
    pub body: Json,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueryKind {
    PresentationDefinition,
    DidConnect,
    Raw,
}

impl Query {
    pub fn kind(&self) -> QueryKind {
        match self {
            Query::PresentationDefinition(_) => QueryKind::PresentationDefinition,
            Query::DidConnect(_) => QueryKind::DidConnect,
            Query::Raw(_) => QueryKind::Raw,
        }
    }

    /// Whether the holder must select at least one credential for this query.
    ///
    /// Connection queries take no selection, and raw queries are best effort.
    pub fn is_required(&self) -> bool {
        match self {
            Query::PresentationDefinition(definition) => definition.is_required(),
            Query::DidConnect(_) | Query::Raw(_) => false,
        }
    }

    /// Whether the query produces candidate credentials the holder can select from.
    pub fn is_selectable(&self) -> bool {
        !matches!(self, Query::DidConnect(_))
    }
}

/// Credential lookup failure.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("malformed query: {0}")]
    Malformed(String),

    #[error("unsupported query type `{0}`")]
    Unsupported(String),

    #[error("credential store unavailable")]
    Unavailable(#[source] anyhow::Error),

    #[error("credential discovery did not finish within {0:?}")]
    Timeout(std::time::Duration),
}

impl From<ConstraintError> for QueryError {
    fn from(err: ConstraintError) -> Self {
        QueryError::Malformed(err.to_string())
    }
}
