//! Identity and activation: tokens, registration, activation links.

pub mod service;
pub mod token;

pub use service::{AccountService, AuthService};
