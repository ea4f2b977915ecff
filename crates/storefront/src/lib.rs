//! East West Offroad storefront library.
//!
//! Cart, coupon, and checkout service in front of the remote storefront API.
//! Exposed as a library so the binary, the CLI, and the integration tests
//! share one router and one set of types.
//!
//! # Modules
//!
//! - [`api`] - Remote storefront API client
//! - [`cart`] - Cart store, reducer, and coupon auto-apply middleware
//! - [`db`] - Cart cache repository
//! - [`routes`] - JSON HTTP surface

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
