//! Request guards.
//!
//! - [`auth::RequireAuth`] -- Requires valid HTTP Basic credentials when
//!   `BASIC_AUTH` is enabled.

pub mod auth;
