//! Per-(product, size) stock ledger. Every operation takes the caller's
//! open connection or transaction, so reads, checks and writes land in one
//! unit of work.

use std::collections::HashSet;

use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    dto::products::SizeStockInput,
    error::{AppError, AppResult},
};

pub async fn get_stock(
    conn: &mut PgConnection,
    product_id: Uuid,
    size_value: &str,
) -> AppResult<i32> {
    let stock: Option<i32> = sqlx::query_scalar(
        "SELECT stock FROM product_sizes WHERE product_id = $1 AND size_value = $2",
    )
    .bind(product_id)
    .bind(size_value)
    .fetch_optional(&mut *conn)
    .await?;

    stock.ok_or(AppError::NotFound)
}

/// Subtract-if-sufficient in a single statement. The row either holds enough
/// stock and is decremented, or is left untouched; two concurrent checkouts
/// cannot both take the last unit.
pub async fn decrement(
    conn: &mut PgConnection,
    product_id: Uuid,
    size_value: &str,
    quantity: i32,
) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be a positive integer".into(),
        ));
    }

    let result = sqlx::query(
        r#"
        UPDATE product_sizes
        SET stock = stock - $3
        WHERE product_id = $1 AND size_value = $2 AND stock >= $3
        "#,
    )
    .bind(product_id)
    .bind(size_value)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    // Zero rows affected: either the size row does not exist, or it does and
    // the stock ran short. The follow-up read runs in the same transaction.
    match get_stock(conn, product_id, size_value).await {
        Ok(available) => Err(AppError::InsufficientStock {
            product_id,
            size_value: size_value.to_string(),
            requested: quantity,
            available,
        }),
        Err(err) => Err(err),
    }
}

/// Replace the product's size set wholesale: delete everything, insert the
/// submitted rows. Rows missing a size_value or stock are skipped; a
/// size_value repeated within one payload keeps its first occurrence.
pub async fn replace_all(
    conn: &mut PgConnection,
    product_id: Uuid,
    rows: &[SizeStockInput],
) -> AppResult<usize> {
    sqlx::query("DELETE FROM product_sizes WHERE product_id = $1")
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

    let mut seen: HashSet<&str> = HashSet::new();
    let mut inserted = 0;

    for row in rows {
        let (Some(size_value), Some(stock)) = (row.size_value.as_deref(), row.stock) else {
            continue;
        };
        if size_value.is_empty() {
            continue;
        }
        if stock < 0 {
            return Err(AppError::BadRequest(format!(
                "stock for size {size_value} must not be negative"
            )));
        }
        if !seen.insert(size_value) {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO product_sizes (size_id, product_id, size_value, stock)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(size_value)
        .bind(stock)
        .execute(&mut *conn)
        .await?;
        inserted += 1;
    }

    Ok(inserted)
}
