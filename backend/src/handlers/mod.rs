//! HTTP handlers for the Clinic Pharmacy Inventory Platform

pub mod drug;
pub mod health;
pub mod prescription;
pub mod purchase;
pub mod stock;

pub use drug::*;
pub use health::*;
pub use prescription::*;
pub use purchase::*;
pub use stock::*;
