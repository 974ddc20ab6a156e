pub mod connection;
pub mod event;
pub mod input_descriptor;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod query;
pub mod request;
pub mod response;
pub mod selection;
