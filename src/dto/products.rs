use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Product;

/// Patch field with three wire states: absent leaves the column unchanged,
/// an explicit `null` clears it, a value sets it.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Missing,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Missing
    }
}

impl<T> Patch<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Patch::Missing)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(|value| match value {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        })
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Missing | Patch::Null => serializer.serialize_none(),
            Patch::Value(value) => serializer.serialize_some(value),
        }
    }
}

/// One size row as submitted by the caller. Rows missing either field are
/// skipped on insert rather than rejected.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SizeStockInput {
    pub size_value: Option<String>,
    pub stock: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: Option<String>,
    #[serde(rename = "altNames")]
    pub alt_names: Option<String>,
    pub description: Option<String>,
    pub main_category: Option<String>,
    pub price: Option<i64>,
    pub color: Option<String>,
    pub country: Option<String>,
    pub images: Option<Vec<String>>,
    #[serde(rename = "isActive")]
    pub is_active: Option<String>,
    pub sizes: Option<Vec<SizeStockInput>>,
}

/// Only the fields present in the payload are written. `sizes`, when given,
/// replaces the product's whole size set.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    #[serde(rename = "altNames")]
    #[schema(value_type = Option<String>)]
    pub alt_names: Patch<String>,
    #[schema(value_type = Option<String>)]
    pub description: Patch<String>,
    pub main_category: Option<String>,
    pub price: Option<i64>,
    #[schema(value_type = Option<String>)]
    pub color: Patch<String>,
    #[schema(value_type = Option<String>)]
    pub country: Patch<String>,
    #[schema(value_type = Option<Vec<String>>)]
    pub images: Patch<Vec<String>>,
    #[serde(rename = "isActive")]
    pub is_active: Option<String>,
    pub sizes: Option<Vec<SizeStockInput>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SizeStockView {
    pub size_value: String,
    pub stock: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductWithSizes {
    #[serde(flatten)]
    pub product: Product,
    pub sizes: Vec<SizeStockView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedProduct {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<ProductWithSizes>,
}
