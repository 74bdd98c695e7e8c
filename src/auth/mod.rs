//! Authentication module for the authkit server
//!
//! This module handles credential verification, session token
//! issuance and rotation, and one-time token lifecycles.

pub mod handlers;
pub mod password;
pub mod service;
pub mod tokens;

pub use service::{AuthService, TokenPair};
pub use tokens::{AccessClaims, OneTimeToken, OneTimeTokenKind, RefreshClaims};
