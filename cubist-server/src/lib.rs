//! cubist-server: the HTTP surface of the cubist OLAP result service.
//!
//! Routes requests to the engine through the connection catalog, flattens
//! results on demand, and serves both query and metadata artifacts through
//! the fingerprint-keyed cache. Pre-warm tasks populate the metadata cache
//! in the background at startup.

pub mod auth;
pub mod cli;
pub mod prewarm;
pub mod server;

pub use auth::{
    authorizer_from_settings, AllowAllAuthorizer, AuthorizationStatus, BearerTokenAuthorizer,
    RequestAuthorizer,
};
pub use server::{build_router, serve, AppState, QueryRequest, CACHED_RESULT_HEADER};
