//! Armory - personal firearm inventory with subscription billing.
//!
//! This library provides the core functionality for the Armory application,
//! including database operations, the subscription lifecycle engine, Stripe
//! integration, and HTTP handlers.

pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod flash;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod payments;
pub mod rate_limit;
pub mod render;
pub mod subscription;
