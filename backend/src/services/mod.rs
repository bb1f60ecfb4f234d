//! Business logic services for the Clinic Pharmacy Inventory Platform

pub mod drug;
pub mod prescription;
pub mod purchase;
pub mod stock;

pub use drug::DrugService;
pub use prescription::PrescriptionService;
pub use purchase::PurchaseService;
pub use stock::StockService;
