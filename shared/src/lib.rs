//! Shared types and domain logic for the Clinic Pharmacy Inventory Platform
//!
//! This crate contains the domain models, the batch allocation algorithm,
//! and validation helpers used by the backend services and their tests.

pub mod fefo;
pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
