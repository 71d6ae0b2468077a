//! Birthday Bot — chat front-end for subscribing to colleagues' birthdays.

pub mod activation;
pub mod auth;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod notify;
pub mod reminders;
pub mod store;
pub mod subscribe;
