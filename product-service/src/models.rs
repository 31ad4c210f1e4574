use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
#[diesel(table_name = crate::schema::products)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub stock: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::products)]
pub struct NewProduct {
    pub id: String,
    pub name: String,
    pub stock: i32,
}

impl NewProduct {
    pub fn new(id: &str, name: &str, stock: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            stock,
        }
    }
}

impl From<NewProduct> for Product {
    fn from(product: NewProduct) -> Self {
        Self {
            id: product.id,
            name: product.name,
            stock: product.stock,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::processed_messages)]
pub struct NewProcessedMessage {
    pub message_id: String,
    pub product_id: String,
    pub processed_at: DateTime<Utc>,
}

/// Per-product entry of the `GET /products` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockEntry {
    pub name: String,
    pub stock: i32,
}

impl From<Product> for StockEntry {
    fn from(product: Product) -> Self {
        Self {
            name: product.name,
            stock: product.stock,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded(usize),
    AlreadySeeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    Decremented { new_stock: i32 },
    OutOfStock,
    NotFound,
    /// The message id was applied before; nothing changed.
    AlreadyProcessed,
}
