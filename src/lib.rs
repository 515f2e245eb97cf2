//! Order, payment and fulfillment reconciliation for a digital top-up storefront

pub mod api;
pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod fulfillment;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod services;
pub mod workers;
