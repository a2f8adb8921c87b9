//! Directory adapters for steward.
//!
//! [`GroupApiClient`] implements the core's
//! [`steward_core::GroupDirectory`] seam over the external group
//! service's HTTP API with a static credential.

#![deny(unsafe_code)]

pub mod http;

pub use http::{GroupApiClient, GroupApiConfig};
