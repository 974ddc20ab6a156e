//! This library mediates credential requests between a relying party and a holder's wallet.
//!
//! A relying party asks for credentials through one or more queries: [Presentation Exchange]
//! definitions, DID connection requests, or query types the wallet hands to its provider
//! untouched. The wallet discovers candidates for every query, lets the holder choose, and
//! answers with a single response: a verifiable presentation, or an error.
//!
//! [Presentation Exchange]: <https://identity.foundation/presentation-exchange/spec/v2.0.0/>
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use credential_mediation::core::event::CredentialRequestEvent;
//! use credential_mediation::core::request::MediationRequest;
//! use credential_mediation::core::selection::Selection;
//! use credential_mediation::wallet::{memory::MemoryCredentialStore, MediationHandler};
//!
//! let handler = MediationHandler::builder()
//!     .with_query_provider(Arc::new(MemoryCredentialStore::with_credentials(credentials)))
//!     .with_signer(Arc::new(signer))
//!     .with_connection_provider(Arc::new(agent))
//!     .build()?;
//!
//! // Parse the browser event and start mediating it.
//! let event: CredentialRequestEvent = serde_json::from_value(event)?;
//! let (handle, pending) = handler.begin(MediationRequest::try_from(event)?).await;
//!
//! // Let the holder choose among the candidates published on `handle.subscribe()`.
//! let progress = handle.progress();
//! let selection = Selection::new().select_all(progress.queries[0].id, &progress.queries[0].candidates);
//! handler.resolve(&handle, selection).await?;
//!
//! // The relying party receives exactly one response.
//! let response = pending.recv().await;
//! ```
//!
//! The wallet's behavior is customized by implementing the traits in [`wallet::provider`].
//!
//! # Overview
//!
//! 1. *Request intake*: a `credentialrequest` event becomes a [`MediationRequest`] through
//!    [`core::event`].
//! 2. *Discovery*: [`MediationHandler::begin`] asks the
//!    [`CredentialQueryProvider`] for candidates, and the [`ConnectionProvider`] to prepare DID
//!    connections, publishing [`Progress`] as queries settle.
//! 3. *Selection*: [`MediationHandler::resolve`] validates the holder's [`Selection`], waits for
//!    connections to complete, and has the [`PresentationSigner`] prove the presentation.
//! 4. *Response*: the relying party receives a [`MediationResponse`] through the
//!    [`PendingResponse`]. [`MediationHandler::cancel`] answers with an error instead.
//!
//! `credentialstore` events are handled by [`wallet::store::store`].
//!
//! [`MediationRequest`]: crate::core::request::MediationRequest
//! [`MediationResponse`]: crate::core::response::MediationResponse
//! [`Selection`]: crate::core::selection::Selection
//! [`MediationHandler::begin`]: crate::wallet::MediationHandler::begin
//! [`MediationHandler::resolve`]: crate::wallet::MediationHandler::resolve
//! [`MediationHandler::cancel`]: crate::wallet::MediationHandler::cancel
//! [`CredentialQueryProvider`]: crate::wallet::provider::CredentialQueryProvider
//! [`ConnectionProvider`]: crate::wallet::provider::ConnectionProvider
//! [`PresentationSigner`]: crate::wallet::provider::PresentationSigner
//! [`Progress`]: crate::wallet::Progress
//! [`PendingResponse`]: crate::wallet::PendingResponse

pub mod config;
pub mod core;
pub mod utils;
pub mod wallet;
