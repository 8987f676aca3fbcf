use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MainCategory {
    Men,
    Women,
    Child,
}

impl MainCategory {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "men" => Some(MainCategory::Men),
            "women" => Some(MainCategory::Women),
            "child" => Some(MainCategory::Child),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MainCategory::Men => "men",
            MainCategory::Women => "women",
            MainCategory::Child => "child",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Inactive,
}

impl ProductStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(ProductStatus::Active),
            "inactive" => Some(ProductStatus::Inactive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
        }
    }
}

/// Order lifecycle.
///
/// ```text
/// Processing ──► Accepted ──► Completed
/// ```
///
/// Transitions only move forward; there is no cancellation path and stock is
/// never returned to the ledger after placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum OrderStatus {
    Processing,
    Accepted,
    Completed,
}

impl OrderStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(OrderStatus::Processing),
            "accepted" => Some(OrderStatus::Accepted),
            "completed" => Some(OrderStatus::Completed),
            _ => None,
        }
    }

    pub fn can_accept(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, OrderStatus::Accepted)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "processing",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Product {
    pub product_id: Uuid,
    pub name: String,
    #[serde(rename = "altNames")]
    pub alt_names: Option<String>,
    pub description: Option<String>,
    pub main_category: MainCategory,
    pub price: i64,
    pub color: Option<String>,
    pub country: Option<String>,
    pub images: Vec<String>,
    #[serde(rename = "isActive")]
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct SizeStock {
    pub size_id: Uuid,
    pub product_id: Uuid,
    pub size_value: String,
    pub stock: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Order {
    pub order_id: Uuid,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_address: String,
    pub status: OrderStatus,
    pub total: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct OrderItem {
    pub order_item_id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub size_value: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub line_total: i64,
    pub created_at: DateTime<Utc>,
}
