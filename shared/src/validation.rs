//! Validation helpers for pharmacy master data and stock inputs

use rust_decimal::Decimal;

/// Validate a quantity that must move stock (strictly positive).
pub fn validate_positive_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a prescription line quantity (zero allowed, negative not).
pub fn validate_line_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity < 0 {
        return Err("Quantity cannot be negative");
    }
    Ok(())
}

/// Validate a drug name (non-blank, bounded).
pub fn validate_drug_name(name: &str) -> Result<(), &'static str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("Drug name cannot be empty");
    }
    if trimmed.len() > 120 {
        return Err("Drug name must be at most 120 characters");
    }
    Ok(())
}

/// Validate a unit of measure label.
pub fn validate_unit(unit: &str) -> Result<(), &'static str> {
    let trimmed = unit.trim();
    if trimmed.is_empty() {
        return Err("Unit cannot be empty");
    }
    if trimmed.len() > 24 {
        return Err("Unit must be at most 24 characters");
    }
    Ok(())
}

/// Validate a unit price (non-negative).
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Unit price cannot be negative");
    }
    Ok(())
}

/// Validate a minimum-stock threshold (non-negative).
pub fn validate_min_stock(min_stock: i32) -> Result<(), &'static str> {
    if min_stock < 0 {
        return Err("Minimum stock cannot be negative");
    }
    Ok(())
}

/// Validate a human-assigned lot code: 1-64 visible characters, no
/// whitespace. Generated codes satisfy this by construction.
pub fn validate_lot_code(code: &str) -> Result<(), &'static str> {
    if code.is_empty() {
        return Err("Lot code cannot be empty");
    }
    if code.len() > 64 {
        return Err("Lot code must be at most 64 characters");
    }
    if code.chars().any(|c| c.is_whitespace()) {
        return Err("Lot code cannot contain whitespace");
    }
    Ok(())
}
