//! Handling of `credentialstore` events.

use tracing::{info, warn};

use crate::core::{request::StoreRequest, response::MediationResponse};

use super::provider::CredentialStore;

/// Save every credential of `request`, answering with a success or an error response.
///
/// Saving stops at the first failure; credentials saved before it are kept.
pub async fn store(store: &dyn CredentialStore, request: StoreRequest) -> MediationResponse {
    let origin = request.origin().to_string();
    let count = request.credentials().len();

    for (index, credential) in request.into_credentials().into_iter().enumerate() {
        if let Err(e) = store.save(credential).await {
            warn!(%origin, index, error = %e, "failed to store credential");
            return MediationResponse::error(e);
        }
    }

    info!(%origin, count, "credentials stored");
    MediationResponse::success()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::query::QueryError;
    use async_trait::async_trait;
    use serde_json::{json, Value as Json};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Refusing(Mutex<Vec<Json>>);

    #[async_trait]
    impl CredentialStore for Refusing {
        async fn save(&self, credential: Json) -> Result<(), QueryError> {
            if credential["refuse"] == json!(true) {
                return Err(QueryError::Malformed("refused".into()));
            }
            self.0.lock().await.push(credential);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stops_at_the_first_failure() {
        let wallet = Refusing::default();
        let request = StoreRequest::new(
            "https://issuer.example.dev",
            vec![json!({"id": "a"}), json!({"refuse": true}), json!({"id": "c"})],
        )
        .unwrap();

        let response = store(&wallet, request).await;

        assert!(response.is_error());
        assert_eq!(*wallet.0.lock().await, vec![json!({"id": "a"})]);
    }
}
