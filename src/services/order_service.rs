use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::orders::{OrderList, OrderWithItems, PlaceOrderRequest, PlacedOrder},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::stock_ledger,
};

/// Price and name snapshot taken while the placing transaction is open, so
/// later catalog edits never rewrite a historical order line.
struct LineSnapshot {
    product_id: Uuid,
    product_name: String,
    size_value: String,
    quantity: i32,
    unit_price: i64,
    line_total: i64,
}

pub async fn place_order(
    pool: &DbPool,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<PlacedOrder>> {
    let required = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let (Some(customer_name), Some(customer_phone), Some(customer_address)) = (
        required(&payload.customer_name),
        required(&payload.customer_phone),
        required(&payload.customer_address),
    ) else {
        return Err(AppError::BadRequest(
            "customer_name, customer_phone and customer_address are required".into(),
        ));
    };

    let items = payload
        .items
        .as_deref()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| AppError::BadRequest("At least one order item is required".into()))?;

    let mut txn = pool.begin().await?;

    // Line items are handled in submitted order; the first failure aborts
    // the whole transaction and every prior decrement rolls back.
    let mut lines: Vec<LineSnapshot> = Vec::with_capacity(items.len());
    let mut total: i64 = 0;

    for item in items {
        let product: Option<(String, i64)> =
            sqlx::query_as("SELECT name, price FROM products WHERE product_id = $1")
                .bind(item.product_id)
                .fetch_optional(&mut *txn)
                .await?;
        let (product_name, unit_price) = match product {
            Some(product) => product,
            None => return Err(AppError::NotFound),
        };

        stock_ledger::decrement(&mut *txn, item.product_id, &item.size_value, item.quantity)
            .await?;

        let line_total = unit_price * i64::from(item.quantity);
        total += line_total;
        lines.push(LineSnapshot {
            product_id: item.product_id,
            product_name,
            size_value: item.size_value.clone(),
            quantity: item.quantity,
            unit_price,
            line_total,
        });
    }

    let order_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO orders (order_id, customer_name, customer_phone, customer_address, status, total)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(order_id)
    .bind(&customer_name)
    .bind(&customer_phone)
    .bind(&customer_address)
    .bind(OrderStatus::Processing)
    .bind(total)
    .execute(&mut *txn)
    .await?;

    for line in &lines {
        sqlx::query(
            r#"
            INSERT INTO order_items
                (order_item_id, order_id, product_id, product_name,
                 size_value, quantity, unit_price, line_total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(line.product_id)
        .bind(&line.product_name)
        .bind(&line.size_value)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.line_total)
        .execute(&mut *txn)
        .await?;
    }

    txn.commit().await?;

    log_audit(
        pool,
        None,
        "order_place",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order_id, "total": total })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order placed successfully",
        PlacedOrder { order_id, total },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    pool: &DbPool,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;

    let (page, limit, offset) = query.pagination.normalize();
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(value) => Some(OrderStatus::parse(value).ok_or_else(|| {
            AppError::BadRequest("Invalid status. Allowed: processing, accepted, completed".into())
        })?),
        None => None,
    };
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM orders");
    if let Some(status) = status {
        builder.push(" WHERE status = ");
        builder.push_bind(status);
    }
    builder.push(format!(" ORDER BY created_at {}", sort_order.as_sql()));
    builder.push(" LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    let orders: Vec<Order> = builder.build_query_as().fetch_all(pool).await?;

    let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT count(*) FROM orders");
    if let Some(status) = status {
        count.push(" WHERE status = ");
        count.push_bind(status);
    }
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;

    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE order_id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    let order = match order {
        Some(order) => order,
        None => return Err(AppError::NotFound),
    };

    let items: Vec<OrderItem> = sqlx::query_as(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at, order_item_id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(ApiResponse::success(
        "Order",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

pub async fn accept_order(pool: &DbPool, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<Order>> {
    transition(pool, user, id, OrderStatus::Processing, OrderStatus::Accepted, "order_accept").await
}

pub async fn complete_order(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    transition(pool, user, id, OrderStatus::Accepted, OrderStatus::Completed, "order_complete").await
}

/// Conditional status bump: the UPDATE only matches when the order is still
/// in `from`, so a lost race or an illegal transition leaves the row
/// untouched and is reported from the same transaction.
async fn transition(
    pool: &DbPool,
    user: &AuthUser,
    id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    action: &str,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let mut txn = pool.begin().await?;

    let updated: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = $3 WHERE order_id = $1 AND status = $2 RETURNING *",
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .fetch_optional(&mut *txn)
    .await?;

    let order = match updated {
        Some(order) => order,
        None => {
            let current: Option<OrderStatus> =
                sqlx::query_scalar("SELECT status FROM orders WHERE order_id = $1")
                    .bind(id)
                    .fetch_optional(&mut *txn)
                    .await?;
            return match current {
                None => Err(AppError::NotFound),
                Some(current) => Err(AppError::InvalidStateTransition {
                    current: current.to_string(),
                    requested: to.to_string(),
                }),
            };
        }
    };

    txn.commit().await?;

    log_audit(
        pool,
        Some(user.user_id),
        action,
        Some("orders"),
        Some(serde_json::json!({ "order_id": id, "status": to.as_str() })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order status updated",
        order,
        Some(Meta::empty()),
    ))
}
