pub mod request_models;
pub mod request_service;

pub use request_models::{MembershipRequest, RequestMessage, DEFAULT_MESSAGE};
pub use request_service::RequestService;
