//! Identity service client module.
//!
//! `gateway` defines the transport-agnostic contract the login flow
//! depends on; `client` is the HTTP implementation used in production.
//! Any remote failure is fatal for the current invocation and reported
//! verbatim; there is no retry or backoff.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::IdentityClient;
pub use error::ApiError;
pub use gateway::{IdentityGateway, RoleType, Scope, TokenPair, Workspace};
