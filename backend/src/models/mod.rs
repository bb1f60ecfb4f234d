//! Database models for the Clinic Pharmacy Inventory Platform
//!
//! Re-exports models from the shared crate

pub use shared::models::*;
