use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::products::{
        CreateProductRequest, CreatedProduct, ProductList, ProductWithSizes, Patch,
        SizeStockView, UpdateProductRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{MainCategory, Product, ProductStatus},
    response::{ApiResponse, Meta},
    services::stock_ledger,
};

const CATEGORY_HINT: &str = "Invalid main_category. Allowed: men, women, child";
const STATUS_HINT: &str = "Invalid isActive. Allowed: active, inactive";

pub async fn create_product(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<CreatedProduct>> {
    ensure_admin(user)?;

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let (Some(name), Some(main_category), Some(price)) =
        (name, payload.main_category.as_deref(), payload.price)
    else {
        return Err(AppError::BadRequest(
            "name, main_category and price are required".into(),
        ));
    };

    let main_category =
        MainCategory::parse(main_category).ok_or_else(|| AppError::BadRequest(CATEGORY_HINT.into()))?;

    if price <= 0 {
        return Err(AppError::BadRequest("price must be a positive amount".into()));
    }

    // Absent or unrecognized status falls back to active.
    let status = payload
        .is_active
        .as_deref()
        .and_then(ProductStatus::parse)
        .unwrap_or(ProductStatus::Active);

    let sizes = payload
        .sizes
        .as_deref()
        .filter(|sizes| !sizes.is_empty())
        .ok_or_else(|| AppError::BadRequest("At least one size with stock is required".into()))?;

    let images = payload.images.unwrap_or_default();
    let product_id = Uuid::new_v4();

    let mut txn = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO products
            (product_id, name, alt_names, description, main_category,
             price, color, country, images, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(product_id)
    .bind(name)
    .bind(&payload.alt_names)
    .bind(&payload.description)
    .bind(main_category)
    .bind(price)
    .bind(&payload.color)
    .bind(&payload.country)
    .bind(&images)
    .bind(status)
    .execute(&mut *txn)
    .await?;

    stock_ledger::replace_all(&mut *txn, product_id, sizes).await?;

    txn.commit().await?;

    log_audit(
        pool,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product_id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Product added successfully",
        CreatedProduct { product_id },
        Some(Meta::empty()),
    ))
}

/// Flat row from the products × product_sizes join; regrouped into nested
/// per-product size lists below.
#[derive(Debug, sqlx::FromRow)]
struct ProductSizeRow {
    product_id: Uuid,
    name: String,
    alt_names: Option<String>,
    description: Option<String>,
    main_category: MainCategory,
    price: i64,
    color: Option<String>,
    country: Option<String>,
    images: Vec<String>,
    status: ProductStatus,
    created_at: DateTime<Utc>,
    size_value: Option<String>,
    stock: Option<i32>,
}

pub async fn list_active_products(pool: &DbPool) -> AppResult<ApiResponse<ProductList>> {
    let rows: Vec<ProductSizeRow> = sqlx::query_as(
        r#"
        SELECT p.product_id, p.name, p.alt_names, p.description, p.main_category,
               p.price, p.color, p.country, p.images, p.status, p.created_at,
               ps.size_value, ps.stock
        FROM products p
        LEFT JOIN product_sizes ps ON p.product_id = ps.product_id
        WHERE p.status = 'active'
        ORDER BY p.product_id, ps.size_value
        "#,
    )
    .fetch_all(pool)
    .await?;

    let items = group_rows(rows);
    let meta = Meta::total(items.len() as i64);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

fn group_rows(rows: Vec<ProductSizeRow>) -> Vec<ProductWithSizes> {
    let mut items: Vec<ProductWithSizes> = Vec::new();

    for row in rows {
        let starts_new_product = items
            .last()
            .map_or(true, |item| item.product.product_id != row.product_id);

        if starts_new_product {
            items.push(ProductWithSizes {
                product: Product {
                    product_id: row.product_id,
                    name: row.name,
                    alt_names: row.alt_names,
                    description: row.description,
                    main_category: row.main_category,
                    price: row.price,
                    color: row.color,
                    country: row.country,
                    images: row.images,
                    status: row.status,
                    created_at: row.created_at,
                },
                sizes: Vec::new(),
            });
        }

        // LEFT JOIN: a product without sizes contributes one row of nulls.
        if let (Some(size_value), Some(stock)) = (row.size_value, row.stock) {
            if let Some(current) = items.last_mut() {
                current.sizes.push(SizeStockView { size_value, stock });
            }
        }
    }

    items
}

pub async fn get_product(pool: &DbPool, id: Uuid) -> AppResult<ApiResponse<ProductWithSizes>> {
    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE product_id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let product = match product {
        Some(product) => product,
        None => return Err(AppError::NotFound),
    };

    let sizes: Vec<SizeStockView> = sqlx::query_as::<_, (String, i32)>(
        "SELECT size_value, stock FROM product_sizes WHERE product_id = $1 ORDER BY size_value",
    )
    .bind(id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(size_value, stock)| SizeStockView { size_value, stock })
    .collect();

    Ok(ApiResponse::success(
        "Product",
        ProductWithSizes { product, sizes },
        None,
    ))
}

pub async fn update_product(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<CreatedProduct>> {
    ensure_admin(user)?;

    // Validate everything before the first write.
    if payload.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(AppError::BadRequest("name must not be empty".into()));
    }
    let main_category = match payload.main_category.as_deref() {
        Some(value) => {
            Some(MainCategory::parse(value).ok_or_else(|| AppError::BadRequest(CATEGORY_HINT.into()))?)
        }
        None => None,
    };
    let status = match payload.is_active.as_deref() {
        Some(value) => {
            Some(ProductStatus::parse(value).ok_or_else(|| AppError::BadRequest(STATUS_HINT.into()))?)
        }
        None => None,
    };
    if payload.price.is_some_and(|price| price <= 0) {
        return Err(AppError::BadRequest("price must be a positive amount".into()));
    }

    let mut txn = pool.begin().await?;

    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT product_id FROM products WHERE product_id = $1")
        .bind(id)
        .fetch_optional(&mut *txn)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound);
    }

    // Dynamic SET list holding only the fields the caller provided.
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE products SET ");
    let mut changed = false;
    {
        let mut set = builder.separated(", ");

        if let Some(name) = &payload.name {
            set.push("name = ");
            set.push_bind_unseparated(name);
            changed = true;
        }
        match &payload.alt_names {
            Patch::Missing => {}
            Patch::Null => {
                set.push("alt_names = NULL");
                changed = true;
            }
            Patch::Value(alt_names) => {
                set.push("alt_names = ");
                set.push_bind_unseparated(alt_names);
                changed = true;
            }
        }
        match &payload.description {
            Patch::Missing => {}
            Patch::Null => {
                set.push("description = NULL");
                changed = true;
            }
            Patch::Value(description) => {
                set.push("description = ");
                set.push_bind_unseparated(description);
                changed = true;
            }
        }
        if let Some(main_category) = main_category {
            set.push("main_category = ");
            set.push_bind_unseparated(main_category);
            changed = true;
        }
        if let Some(price) = payload.price {
            set.push("price = ");
            set.push_bind_unseparated(price);
            changed = true;
        }
        match &payload.color {
            Patch::Missing => {}
            Patch::Null => {
                set.push("color = NULL");
                changed = true;
            }
            Patch::Value(color) => {
                set.push("color = ");
                set.push_bind_unseparated(color);
                changed = true;
            }
        }
        match &payload.country {
            Patch::Missing => {}
            Patch::Null => {
                set.push("country = NULL");
                changed = true;
            }
            Patch::Value(country) => {
                set.push("country = ");
                set.push_bind_unseparated(country);
                changed = true;
            }
        }
        match &payload.images {
            Patch::Missing => {}
            Patch::Null => {
                // The column is non-null; clearing means an empty list.
                set.push("images = '{}'");
                changed = true;
            }
            Patch::Value(images) => {
                set.push("images = ");
                set.push_bind_unseparated(images);
                changed = true;
            }
        }
        if let Some(status) = status {
            set.push("status = ");
            set.push_bind_unseparated(status);
            changed = true;
        }
    }

    if !changed && payload.sizes.is_none() {
        return Err(AppError::BadRequest("No fields provided to update".into()));
    }

    if changed {
        builder.push(" WHERE product_id = ");
        builder.push_bind(id);
        builder.build().execute(&mut *txn).await?;
    }

    if let Some(sizes) = payload.sizes.as_deref() {
        stock_ledger::replace_all(&mut *txn, id, sizes).await?;
    }

    txn.commit().await?;

    log_audit(
        pool,
        Some(user.user_id),
        "product_update",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Product updated successfully",
        CreatedProduct { product_id: id },
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let mut txn = pool.begin().await?;

    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT product_id FROM products WHERE product_id = $1")
        .bind(id)
        .fetch_optional(&mut *txn)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound);
    }

    sqlx::query("DELETE FROM product_sizes WHERE product_id = $1")
        .bind(id)
        .execute(&mut *txn)
        .await?;

    let result = sqlx::query("DELETE FROM products WHERE product_id = $1")
        .bind(id)
        .execute(&mut *txn)
        .await?;

    // The product vanished between the existence check and the delete; the
    // dropped transaction rolls the size deletes back.
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    txn.commit().await?;

    log_audit(
        pool,
        Some(user.user_id),
        "product_delete",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Product and its sizes deleted successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
