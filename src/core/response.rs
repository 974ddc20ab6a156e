use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::presentation_submission::{DescriptorMap, PresentationSubmission};

pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const VERIFIABLE_PRESENTATION_TYPE: &str = "VerifiablePresentation";
pub const PRESENTATION_SUBMISSION_TYPE: &str = "PresentationSubmission";

const SUCCESS: &str = "success";

/// The single terminal answer a relying party receives for a request.
///
/// Serializes as `{"dataType": ..., "data": ...}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "dataType", content = "data")]
pub enum MediationResponse {
    /// Acknowledgement without credentials, e.g. after storing credentials.
    #[serde(rename = "Response")]
    CredentialResponse(String),

    #[serde(rename = "VerifiablePresentation")]
    Presentation(VerifiablePresentation),

    #[serde(rename = "Error")]
    Error(ErrorData),
}

impl MediationResponse {
    pub fn success() -> Self {
        MediationResponse::CredentialResponse(SUCCESS.to_owned())
    }

    pub fn error(reason: impl ToString) -> Self {
        MediationResponse::Error(ErrorData {
            reason: reason.to_string(),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MediationResponse::Error(_))
    }

    pub fn data_type(&self) -> &'static str {
        match self {
            MediationResponse::CredentialResponse(_) => "Response",
            MediationResponse::Presentation(_) => "VerifiablePresentation",
            MediationResponse::Error(_) => "Error",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorData {
    pub reason: String,
}

/// The presentation returned to a relying party.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VerifiablePresentation {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    #[serde(rename = "verifiableCredential")]
    pub verifiable_credential: Vec<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_submission: Option<PresentationSubmission>,
    pub proof: Json,
}

impl VerifiablePresentation {
    /// Assemble a presentation; the submission type is added when a descriptor map exists.
    pub fn new(verifiable_credential: Vec<Json>, descriptor_map: Vec<DescriptorMap>, proof: Json) -> Self {
        let mut types = vec![VERIFIABLE_PRESENTATION_TYPE.to_owned()];
        let presentation_submission = if descriptor_map.is_empty() {
            None
        } else {
            types.push(PRESENTATION_SUBMISSION_TYPE.to_owned());
            Some(PresentationSubmission::new(descriptor_map))
        };

        Self {
            context: vec![CREDENTIALS_V1_CONTEXT.to_owned()],
            types,
            verifiable_credential,
            presentation_submission,
            proof,
        }
    }

    pub fn descriptor_map(&self) -> &[DescriptorMap] {
        self.presentation_submission
            .as_ref()
            .map(|submission| submission.descriptor_map().as_slice())
            .unwrap_or_default()
    }
}

/// Presentation signer failure.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// The signer answered with a presentation that does not fit what was asked for.
    #[error("malformed presentation from signer: {0}")]
    Malformed(String),

    #[error(transparent)]
    Signer(#[from] anyhow::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_shape() {
        assert_eq!(
            serde_json::to_value(MediationResponse::success()).unwrap(),
            json!({ "dataType": "Response", "data": "success" })
        );
    }

    #[test]
    fn error_shape() {
        assert_eq!(
            serde_json::to_value(MediationResponse::error("user cancelled")).unwrap(),
            json!({ "dataType": "Error", "data": { "reason": "user cancelled" } })
        );
    }

    #[test]
    fn presentation_shape() {
        let presentation = VerifiablePresentation::new(
            vec![json!({ "id": "urn:uuid:1" })],
            vec![DescriptorMap::for_credential("citizenship_input_1", 0)],
            json!({ "type": "Ed25519Signature2018", "challenge": "c" }),
        );

        assert_eq!(
            serde_json::to_value(MediationResponse::Presentation(presentation)).unwrap(),
            json!({
                "dataType": "VerifiablePresentation",
                "data": {
                    "@context": ["https://www.w3.org/2018/credentials/v1"],
                    "type": ["VerifiablePresentation", "PresentationSubmission"],
                    "verifiableCredential": [{ "id": "urn:uuid:1" }],
                    "presentation_submission": {
                        "descriptor_map": [
                            { "id": "citizenship_input_1", "path": "$.verifiableCredential.[0]" }
                        ]
                    },
                    "proof": { "type": "Ed25519Signature2018", "challenge": "c" }
                }
            })
        );
    }

    #[test]
    fn connection_only_presentation_has_no_submission() {
        let presentation = VerifiablePresentation::new(vec![json!({})], vec![], json!({ "jws": "x" }));
        assert_eq!(presentation.types, vec!["VerifiablePresentation"]);

        let json = serde_json::to_value(&presentation).unwrap();
        assert!(json.get("presentation_submission").is_none());
    }
}
