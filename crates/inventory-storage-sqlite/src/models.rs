//! Database models

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Inventory item record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Item ID (assigned by the store on insert)
    pub id: Option<i64>,
    /// Display name
    pub name: String,
    /// Unit price
    pub price: f64,
    /// Units in stock
    pub quantity: i64,
    /// Supplier name
    pub supplier_name: String,
    /// Supplier email
    pub supplier_email: String,
    /// Supplier phone
    pub supplier_phone: String,
}

impl Item {
    /// New item without an ID and with empty supplier fields
    pub fn new(name: impl Into<String>, price: f64, quantity: i64) -> Self {
        Self {
            id: None,
            name: name.into(),
            price,
            quantity,
            supplier_name: String::new(),
            supplier_email: String::new(),
            supplier_phone: String::new(),
        }
    }

    /// Builder-style supplier contact details
    pub fn with_supplier(
        mut self,
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Self {
        self.supplier_name = name.into();
        self.supplier_email = email.into();
        self.supplier_phone = phone.into();
        self
    }

    /// Whether no units are left
    pub fn is_out_of_stock(&self) -> bool {
        self.quantity <= 0
    }

    /// Check the column constraints before a write reaches SQLite
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ConstraintViolation("item name must not be empty".to_string()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(Error::ConstraintViolation(format!(
                "item price must be a non-negative amount, got {}",
                self.price
            )));
        }
        if self.quantity < 0 {
            return Err(Error::ConstraintViolation(format!(
                "item quantity must not be negative, got {}",
                self.quantity
            )));
        }
        Ok(())
    }

    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            price: row.get(2)?,
            quantity: row.get(3)?,
            supplier_name: row.get(4)?,
            supplier_email: row.get(5)?,
            supplier_phone: row.get(6)?,
        })
    }
}
