//! Data model shared by the store, the controllers and the API.
//!
//! Every persisted object follows the same envelope: `apiVersion`, `kind`,
//! `metadata` and a kind-specific body, serialized as camelCase JSON.

pub mod alert;
pub mod config;
pub mod deployment;
pub mod kind;
pub mod meta;
pub mod monitoring;
pub mod rbac;
pub mod scaling_target;
pub mod secret;
pub mod validate;
