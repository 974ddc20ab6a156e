//! Credential Handler API events, as delivered to the wallet by the browser.
//!
//! A `credentialrequest` event becomes a [MediationRequest] and a `credentialstore` event becomes
//! a [StoreRequest].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use super::{
    connection::Invitation,
    presentation_definition::PresentationDefinition,
    query::{DidConnectQuery, Query, RawQuery},
    request::{MediationRequest, RequestError, StoreRequest},
};
use crate::utils::OneOrMany;

const PRESENTATION_DEFINITION_QUERY: &str = "PresentationDefinitionQuery";
const DID_CONNECT_QUERY: &str = "DIDConnect";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum CredentialEvent {
    #[serde(rename = "credentialrequest")]
    Request(CredentialRequestEvent),
    #[serde(rename = "credentialstore")]
    Store(CredentialStoreEvent),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequestEvent {
    pub credential_request_origin: String,
    pub credential_request_options: CredentialRequestOptions,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CredentialRequestOptions {
    pub web: WebCredentialRequest,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WebCredentialRequest {
    #[serde(rename = "VerifiablePresentation")]
    pub verifiable_presentation: PresentationRequest,
}

/// The `VerifiablePresentation` member of a credential request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PresentationRequest {
    pub query: OneOrMany<Map<String, Json>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Json>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitation: Option<Invitation>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStoreEvent {
    pub credential_request_origin: String,
    pub credential: WebCredential,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebCredential {
    #[serde(rename = "type")]
    pub kind: String,
    pub data_type: String,
    pub data: Json,
}

impl TryFrom<CredentialRequestEvent> for MediationRequest {
    type Error = EventError;

    fn try_from(event: CredentialRequestEvent) -> Result<Self, Self::Error> {
        let PresentationRequest {
            query,
            challenge,
            domain,
            manifest,
            invitation,
        } = event.credential_request_options.web.verifiable_presentation;

        let queries = query
            .into_vec()
            .into_iter()
            .enumerate()
            .map(|(position, query)| {
                parse_query(position, query, &challenge, &domain, &manifest, &invitation)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut request = MediationRequest::new(&event.credential_request_origin, queries)?;
        if let Some(challenge) = challenge {
            request = request.with_challenge(challenge);
        }
        if let Some(domain) = domain {
            request = request.with_domain(domain);
        }
        Ok(request)
    }
}

fn parse_query(
    position: usize,
    mut query: Map<String, Json>,
    challenge: &Option<String>,
    domain: &Option<String>,
    manifest: &Option<Json>,
    invitation: &Option<Invitation>,
) -> Result<Query, EventError> {
    let Some(Json::String(kind)) = query.remove("type") else {
        return Err(EventError::MissingQueryType(position));
    };

    match kind.as_str() {
        PRESENTATION_DEFINITION_QUERY => {
            let definition = query
                .remove("presentationDefinitionQuery")
                .ok_or(EventError::MissingDefinition(position))?;
            let definition: PresentationDefinition = serde_json::from_value(definition)
                .map_err(|e| EventError::InvalidQuery {
                    position,
                    reason: e.to_string(),
                })?;
            Ok(Query::PresentationDefinition(definition))
        }
        DID_CONNECT_QUERY => {
            let invitation = match query.remove("invitation") {
                Some(inv) => Some(serde_json::from_value(inv).map_err(|e| {
                    EventError::InvalidQuery {
                        position,
                        reason: e.to_string(),
                    }
                })?),
                None => invitation.clone(),
            };
            Ok(Query::DidConnect(DidConnectQuery {
                invitation,
                challenge: challenge.clone(),
                domain: domain.clone(),
                manifest: manifest.clone(),
            }))
        }
        _ => Ok(Query::Raw(RawQuery {
            kind,
            body: Json::Object(query),
        })),
    }
}

impl TryFrom<CredentialStoreEvent> for StoreRequest {
    type Error = EventError;

    fn try_from(event: CredentialStoreEvent) -> Result<Self, Self::Error> {
        let WebCredential { data_type, data, .. } = event.credential;

        let credentials = match data_type.as_str() {
            "VerifiablePresentation" => match data {
                Json::Object(mut presentation) => match presentation.remove("verifiableCredential") {
                    Some(Json::Array(credentials)) => credentials,
                    Some(credential) => vec![credential],
                    None => vec![],
                },
                _ => return Err(EventError::InvalidCredential(data_type)),
            },
            "VerifiableCredential" => vec![data],
            _ => return Err(EventError::InvalidCredential(data_type)),
        };

        Ok(StoreRequest::new(&event.credential_request_origin, credentials)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("query {0} has no `type`")]
    MissingQueryType(usize),

    #[error("query {0} has no `presentationDefinitionQuery`")]
    MissingDefinition(usize),

    #[error("query {position} is malformed: {reason}")]
    InvalidQuery { position: usize, reason: String },

    #[error("cannot store credential data of type `{0}`")]
    InvalidCredential(String),

    #[error(transparent)]
    Request(#[from] RequestError),
}
