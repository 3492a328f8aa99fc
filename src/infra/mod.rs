// Adapters for external collaborators

pub mod http_client;

pub use http_client::{FetchedPayload, ReqwestHttp};
