//! East West Offroad Core - Shared domain types.
//!
//! This crate provides the value types shared by the storefront crates:
//! - `storefront` - Cart, coupon, and checkout service
//! - `cli` - Migrations and cart cache maintenance
//!
//! # Architecture
//!
//! The core crate contains only types and small pure helpers - no I/O, no
//! database access, no HTTP clients. Coupon eligibility rules live with the
//! cart store in the storefront crate; this crate only describes the data.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, emails, coupons, and cart lines

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
