use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};

/// Identifier of a DID connection, as assigned by the connection provider.
pub type ConnectionId = String;

/// An out-of-band invitation to establish a DIDComm connection.
///
/// Only the identifier is interpreted; the remaining members are carried through untouched.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invitation {
    #[serde(rename = "@id", alias = "id")]
    id: String,
    #[serde(flatten)]
    body: Map<String, Json>,
}

impl Invitation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: Map::new(),
        }
    }

    pub fn with_member(mut self, key: impl Into<String>, value: Json) -> Self {
        self.body.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn body(&self) -> &Map<String, Json> {
        &self.body
    }
}

/// Lifecycle of a DID connection.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// An invitation exists, nobody has responded yet.
    Invited,
    /// A party has requested the exchange, waiting for the other side to accept.
    Requested,
    Completed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Completed | ConnectionState::Failed)
    }

    fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Invited, Requested) | (Invited, Completed) | (Requested, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Invited => "invited",
            ConnectionState::Requested => "requested",
            ConnectionState::Completed => "completed",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A state change reported by the connection provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub connection_id: ConnectionId,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_did: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub their_did: Option<String>,
}

impl ConnectionEvent {
    pub fn new(connection_id: impl Into<ConnectionId>, state: ConnectionState) -> Self {
        Self {
            connection_id: connection_id.into(),
            state,
            my_did: None,
            their_did: None,
        }
    }
}

/// A connection owned by a single mediation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    my_did: Option<String>,
    their_did: Option<String>,
}

impl Connection {
    /// A connection for an invitation the wallet minted itself.
    pub fn invited(id: impl Into<ConnectionId>) -> Self {
        Self::with_state(id, ConnectionState::Invited)
    }

    /// A connection the wallet requested by accepting an inbound invitation.
    pub fn requested(id: impl Into<ConnectionId>) -> Self {
        Self::with_state(id, ConnectionState::Requested)
    }

    fn with_state(id: impl Into<ConnectionId>, state: ConnectionState) -> Self {
        Self {
            id: id.into(),
            state,
            my_did: None,
            their_did: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn my_did(&self) -> Option<&str> {
        self.my_did.as_deref()
    }

    pub fn their_did(&self) -> Option<&str> {
        self.their_did.as_deref()
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: ConnectionState) -> Result<(), ConnectionError> {
        if self.state == next {
            return Ok(());
        }

        if !self.state.can_advance_to(next) {
            return Err(ConnectionError::InvalidTransition {
                connection_id: self.id.clone(),
                from: self.state,
                to: next,
            });
        }

        self.state = next;
        Ok(())
    }

    /// Apply an event from the connection provider.
    pub fn apply(&mut self, event: ConnectionEvent) -> Result<(), ConnectionError> {
        if event.connection_id != self.id {
            return Err(ConnectionError::Unexpected(format!(
                "event for connection `{}` delivered to connection `{}`",
                event.connection_id, self.id
            )));
        }

        self.advance(event.state)?;
        if event.my_did.is_some() {
            self.my_did = event.my_did;
        }
        if event.their_did.is_some() {
            self.their_did = event.their_did;
        }
        Ok(())
    }

    /// The credential attesting to this connection, presented when a request asks for nothing
    /// but a connection.
    pub fn credential(&self) -> Json {
        json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiableCredential", "DIDConnection"],
            "credentialSubject": {
                "id": self.id,
                "inviteeDID": self.my_did,
                "inviterDID": self.their_did,
                "connectionState": self.state,
            }
        })
    }
}

/// Connection provider failure.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection `{0}` failed")]
    Failed(ConnectionId),

    #[error("connection `{connection_id}` cannot move from {from} to {to}")]
    InvalidTransition {
        connection_id: ConnectionId,
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("connection did not complete within {0:?}")]
    Timeout(Duration),

    /// The provider answered with something that does not fit the protocol.
    #[error("unexpected connection provider response: {0}")]
    Unexpected(String),

    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        let mut connection = Connection::invited("conn-1");
        connection.advance(ConnectionState::Requested).unwrap();
        connection.advance(ConnectionState::Completed).unwrap();

        assert!(matches!(
            connection.advance(ConnectionState::Failed),
            Err(ConnectionError::InvalidTransition { .. })
        ));

        let mut connection = Connection::requested("conn-2");
        assert!(connection.advance(ConnectionState::Invited).is_err());
        connection.advance(ConnectionState::Failed).unwrap();
        assert!(connection.advance(ConnectionState::Completed).is_err());
    }

    #[test]
    fn events_for_other_connections_are_rejected() {
        let mut connection = Connection::requested("conn-1");
        let event = ConnectionEvent::new("conn-2", ConnectionState::Completed);
        assert!(matches!(
            connection.apply(event),
            Err(ConnectionError::Unexpected(_))
        ));
        assert_eq!(connection.state(), ConnectionState::Requested);
    }

    #[test]
    fn credential_reports_completed_state() {
        let mut connection = Connection::requested("conn-1");
        let mut event = ConnectionEvent::new("conn-1", ConnectionState::Completed);
        event.their_did = Some("did:example:issuer".into());
        connection.apply(event).unwrap();

        let credential = connection.credential();
        assert_eq!(credential["credentialSubject"]["connectionState"], "completed");
        assert_eq!(credential["credentialSubject"]["inviterDID"], "did:example:issuer");
    }

    #[test]
    fn invitation_keeps_unknown_members() {
        let invitation: Invitation = serde_json::from_value(serde_json::json!({
            "@id": "inv-1",
            "@type": "https://didcomm.org/out-of-band/1.0/invitation",
            "label": "verifier"
        }))
        .unwrap();

        assert_eq!(invitation.id(), "inv-1");
        assert_eq!(invitation.body()["label"], "verifier");
    }
}
