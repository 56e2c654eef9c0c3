//! Ticketing backend for the Izuran music collective: event inventory,
//! ticket issuance, door validation, and a client with coordinated token
//! refresh.

pub mod auth;
pub mod client;
pub mod config;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
