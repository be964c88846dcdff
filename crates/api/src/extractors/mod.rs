//! Custom Axum extractors.

pub mod admin;
pub mod client;

pub use admin::{AdminIdentity, ADMIN_ID_HEADER};
pub use client::{client_ip, ClientIp};
