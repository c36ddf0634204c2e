//! Engine implementations: the in-process local engine and the HTTP client
//! for remote runners.

pub mod http;
pub mod local;

pub use http::HttpEngineClient;
pub use local::LocalEngine;
