//! Service-account provisioning through the Google Cloud IAM API.

pub mod client;

pub use client::{IamError, ServiceAccount, ServiceAccountClient, DEFAULT_IAM_ENDPOINT};
