//! Database module for the authkit server
//!
//! This module holds the User record, its caller-facing projection,
//! and the persistence seam the auth service goes through.

pub mod models;
pub mod store;

pub use models::{User, UserSummary};
pub use store::{PgUserStore, UserStore};
