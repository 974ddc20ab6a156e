//! An in-memory credential wallet.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use serde_json::Value as Json;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::{
    presentation_definition::PresentationDefinition, query::QueryError,
    selection::CandidateCredential,
};

use super::provider::{CredentialQueryProvider, CredentialStore};

/// Credentials held in memory, matched against presentation definitions by their constraints.
///
/// Candidates are reported per input descriptor, in descriptor order and then in the order the
/// credentials were stored. A candidate's id is the credential's `id`, or `credential-<n>` for
/// credentials without one; a credential matching more than one descriptor of the same
/// definition is reported again as `<id>#<descriptor id>`, or `credential-<n>#<descriptor id>` when
/// stored credentials share an `id`.
#[derive(Clone, Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: Arc<RwLock<Vec<Json>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: impl IntoIterator<Item = Json>) -> Self {
        Self {
            credentials: Arc::new(RwLock::new(credentials.into_iter().collect())),
        }
    }

    pub async fn credentials(&self) -> Vec<Json> {
        self.credentials.read().await.clone()
    }
}

fn credential_id(index: usize, credential: &Json) -> String {
    credential
        .get("id")
        .and_then(Json::as_str)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| format!("credential-{index}"))
}

#[async_trait]
impl CredentialQueryProvider for MemoryCredentialStore {
    async fn find_credentials(
        &self,
        definition: &PresentationDefinition,
    ) -> Result<Vec<CandidateCredential>, QueryError> {
        let credentials = self.credentials.read().await;
        let mut candidates = Vec::new();
        let mut reported = HashSet::new();

        for descriptor in definition.input_descriptors() {
            for (index, credential) in credentials.iter().enumerate() {
                if !descriptor.matches(credential)? {
                    continue;
                }

                let mut id = credential_id(index, credential);
                if reported.contains(&id) {
                    id = format!("{id}#{}", descriptor.id());
                }
                if reported.contains(&id) {
                    id = format!("credential-{index}#{}", descriptor.id());
                }
                reported.insert(id.clone());
                candidates.push(CandidateCredential::new(id, descriptor.id(), credential.clone()));
            }
        }

        debug!(
            definition = %definition.id(),
            candidates = candidates.len(),
            "matched stored credentials"
        );
        Ok(candidates)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, credential: Json) -> Result<(), QueryError> {
        if !credential.is_object() {
            return Err(QueryError::Malformed("a credential must be a JSON object".into()));
        }
        self.credentials.write().await.push(credential);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::input_descriptor::{Constraints, ConstraintsField, InputDescriptor};
    use serde_json::json;

    fn typed(descriptor: &str, credential_type: &str) -> InputDescriptor {
        InputDescriptor::new(
            descriptor,
            Constraints::new().add_constraint(
                ConstraintsField::new("$.type").set_filter(json!({
                    "type": "array",
                    "contains": {"const": credential_type}
                })),
            ),
        )
    }

    fn wallet() -> MemoryCredentialStore {
        MemoryCredentialStore::with_credentials([
            json!({"id": "prc", "type": ["VerifiableCredential", "PermanentResidentCard"]}),
            json!({"id": "udc", "type": ["VerifiableCredential", "UniversityDegreeCredential"]}),
            json!({"type": ["VerifiableCredential", "UniversityDegreeCredential"]}),
        ])
    }

    #[tokio::test]
    async fn candidates_follow_descriptor_order() {
        let definition = PresentationDefinition::new("pd", typed("degree", "UniversityDegreeCredential"))
            .add_input_descriptors(typed("citizenship", "PermanentResidentCard"));

        let candidates = wallet().find_credentials(&definition).await.unwrap();
        let found: Vec<_> = candidates
            .iter()
            .map(|c| (c.id.as_str(), c.descriptor_id.as_str()))
            .collect();

        assert_eq!(
            found,
            [
                ("udc", "degree"),
                ("credential-2", "degree"),
                ("prc", "citizenship")
            ]
        );
    }

    #[tokio::test]
    async fn a_credential_matching_two_descriptors_is_reported_twice() {
        let definition = PresentationDefinition::new("pd", typed("residence", "PermanentResidentCard"))
            .add_input_descriptors(typed("any", "VerifiableCredential"));

        let candidates = wallet().find_credentials(&definition).await.unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.id.as_str()).collect();

        assert_eq!(ids, ["prc", "prc#any", "udc", "credential-2"]);
    }

    #[tokio::test]
    async fn shared_ids_stay_unique_within_a_definition() {
        let wallet = MemoryCredentialStore::with_credentials([
            json!({"id": "prc", "type": ["VerifiableCredential", "PermanentResidentCard"]}),
            json!({"id": "prc", "type": ["VerifiableCredential", "PermanentResidentCard"]}),
        ]);
        let definition = PresentationDefinition::new("pd", typed("residence", "PermanentResidentCard"))
            .add_input_descriptors(typed("any", "VerifiableCredential"));

        let candidates = wallet.find_credentials(&definition).await.unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.id.as_str()).collect();

        assert_eq!(ids, ["prc", "prc#residence", "prc#any", "credential-1#any"]);
    }

    #[tokio::test]
    async fn saved_credentials_become_discoverable() {
        let wallet = MemoryCredentialStore::new();
        wallet
            .save(json!({"id": "prc", "type": ["VerifiableCredential", "PermanentResidentCard"]}))
            .await
            .unwrap();
        assert!(wallet.save(json!("not a credential")).await.is_err());

        let definition = PresentationDefinition::new("pd", typed("citizenship", "PermanentResidentCard"));
        let candidates = wallet.find_credentials(&definition).await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(wallet.credentials().await.len(), 1);
    }
}
