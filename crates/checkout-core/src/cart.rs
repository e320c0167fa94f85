//! # Cart Snapshot
//!
//! Converts persisted cart entries into a provider-agnostic line-item
//! list. The snapshot is a pure transform: it is taken fresh at checkout
//! time and never cached, so stale pricing cannot leak into a session.

use crate::error::{CheckoutError, CheckoutResult};
use serde::{Deserialize, Serialize};

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CAD,
    AUD,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::GBP => "gbp",
            Currency::JPY => "jpy",
            Currency::CAD => "cad",
            Currency::AUD => "aud",
        }
    }

    /// Returns the number of decimal places for this currency
    /// (JPY has 0 decimals, the rest here have 2)
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Convert a decimal amount to the smallest currency unit (cents, etc.)
    pub fn to_minor_units(&self, amount: f64) -> i64 {
        let multiplier = 10_f64.powi(self.decimal_places() as i32);
        (amount * multiplier).round() as i64
    }

    /// Convert from smallest unit back to decimal
    pub fn from_minor_units(&self, amount: i64) -> f64 {
        let divisor = 10_f64.powi(self.decimal_places() as i32);
        amount as f64 / divisor
    }

    /// Parse an ISO 4217 code (case-insensitive)
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "usd" => Some(Currency::USD),
            "eur" => Some(Currency::EUR),
            "gbp" => Some(Currency::GBP),
            "jpy" => Some(Currency::JPY),
            "cad" => Some(Currency::CAD),
            "aud" => Some(Currency::AUD),
            _ => None,
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::USD
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// What kind of product a cart entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Tool,
    Course,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Tool => "tool",
            ProductType::Course => "course",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tool" => Some(ProductType::Tool),
            "course" => Some(ProductType::Course),
            _ => None,
        }
    }
}

/// A cart entry as persisted client-side. Prices are decimal at this
/// boundary; everything past the snapshot works in minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartEntry {
    /// Product ID
    pub id: String,
    /// Product type
    #[serde(rename = "type")]
    pub product_type: ProductType,
    /// Display name
    pub name: String,
    /// Decimal unit price (e.g. 19.99)
    pub price: f64,
    /// Quantity
    pub quantity: u32,
}

/// A line item attached to a payment session. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product ID
    pub product_id: String,

    /// Product type
    pub product_type: ProductType,

    /// Product name (denormalized for display)
    pub name: String,

    /// Unit price in the smallest currency unit (cents)
    pub unit_amount_minor: i64,

    /// Quantity (always >= 1)
    pub quantity: u32,
}

impl LineItem {
    /// Total for this line in minor units
    pub fn total_minor(&self) -> i64 {
        self.unit_amount_minor * self.quantity as i64
    }
}

/// Sum of line totals in minor units
pub fn total_minor(items: &[LineItem]) -> i64 {
    items.iter().map(LineItem::total_minor).sum()
}

/// Build a deterministic line-item list from persisted cart entries.
///
/// Fails with `EmptyCart` on an empty list and `InvalidLineItem` on a
/// zero quantity, a non-finite or negative price, or a blank name.
/// Minor-unit conversion rounds half away from zero (`19.99` -> `1999`).
pub fn snapshot(entries: &[CartEntry], currency: Currency) -> CheckoutResult<Vec<LineItem>> {
    if entries.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.quantity == 0 {
            return Err(CheckoutError::InvalidLineItem(format!(
                "{}: quantity must be at least 1",
                entry.id
            )));
        }
        if !entry.price.is_finite() || entry.price < 0.0 {
            return Err(CheckoutError::InvalidLineItem(format!(
                "{}: price {} is not a valid amount",
                entry.id, entry.price
            )));
        }
        if entry.name.trim().is_empty() {
            return Err(CheckoutError::InvalidLineItem(format!(
                "{}: name is empty",
                entry.id
            )));
        }

        items.push(LineItem {
            product_id: entry.id.clone(),
            product_type: entry.product_type,
            name: entry.name.clone(),
            unit_amount_minor: currency.to_minor_units(entry.price),
            quantity: entry.quantity,
        });
    }

    Ok(items)
}
