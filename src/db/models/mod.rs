//! Database models split into domain-specific modules.
//!
//! This module re-exports all types so callers can use `crate::db::User` etc.

mod alert_post;
mod common;
mod emergency_contact;
mod package;
mod payment;
mod safe_zone;
mod subscription;
mod user;

pub use alert_post::*;
pub use common::*;
pub use emergency_contact::*;
pub use package::*;
pub use payment::*;
pub use safe_zone::*;
pub use subscription::*;
pub use user::*;
