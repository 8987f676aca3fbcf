use axum_storefront_api::{
    db::create_pool,
    dto::{
        orders::{OrderItemInput, PlaceOrderRequest},
        products::{CreateProductRequest, SizeStockInput},
    },
    error::AppError,
    middleware::auth::AuthUser,
    services::{order_service, product_service, stock_ledger},
};
use uuid::Uuid;

// Integration flow tests run against a real Postgres and are skipped when no
// database is configured. Each test seeds its own uniquely named data so the
// files can run in parallel without truncating shared tables.

async fn setup_pool() -> anyhow::Result<Option<sqlx::PgPool>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(None);
        }
    };

    let pool = create_pool(&database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Some(pool))
}

fn admin() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: "admin".into(),
    }
}

fn product_payload(name: &str, price: i64, sizes: &[(&str, i32)]) -> CreateProductRequest {
    CreateProductRequest {
        name: Some(name.to_string()),
        alt_names: None,
        description: Some("flow test product".into()),
        main_category: Some("men".into()),
        price: Some(price),
        color: Some("black".into()),
        country: None,
        images: Some(vec!["https://example.com/front.jpg".into()]),
        is_active: None,
        sizes: Some(
            sizes
                .iter()
                .map(|(size_value, stock)| SizeStockInput {
                    size_value: Some(size_value.to_string()),
                    stock: Some(*stock),
                })
                .collect(),
        ),
    }
}

fn order_payload(customer: &str, items: &[(Uuid, &str, i32)]) -> PlaceOrderRequest {
    PlaceOrderRequest {
        customer_name: Some(customer.to_string()),
        customer_phone: Some("0771234567".into()),
        customer_address: Some("12 Harbor Lane".into()),
        items: Some(
            items
                .iter()
                .map(|(product_id, size_value, quantity)| OrderItemInput {
                    product_id: *product_id,
                    size_value: size_value.to_string(),
                    quantity: *quantity,
                })
                .collect(),
        ),
    }
}

async fn stock_of(pool: &sqlx::PgPool, product_id: Uuid, size_value: &str) -> anyhow::Result<i32> {
    let mut conn = pool.acquire().await?;
    Ok(stock_ledger::get_stock(&mut *conn, product_id, size_value).await?)
}

#[tokio::test]
async fn place_accept_complete_flow() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await? else {
        return Ok(());
    };
    let auth_admin = admin();

    let name = format!("Flow Boot {}", Uuid::new_v4());
    let created = product_service::create_product(
        &pool,
        &auth_admin,
        product_payload(&name, 100, &[("41", 5), ("42", 5)]),
    )
    .await?;
    let product_id = created.data.unwrap().product_id;

    let customer = format!("customer-{}", Uuid::new_v4());
    let placed = order_service::place_order(&pool, order_payload(&customer, &[(product_id, "42", 2)]))
        .await?;
    let placed = placed.data.unwrap();
    assert_eq!(placed.total, 200);
    assert_eq!(stock_of(&pool, product_id, "42").await?, 3);
    assert_eq!(stock_of(&pool, product_id, "41").await?, 5);

    // Snapshots land on the order lines.
    let fetched = order_service::get_order(&pool, &auth_admin, placed.order_id).await?;
    let fetched = fetched.data.unwrap();
    assert_eq!(fetched.order.total, 200);
    assert_eq!(fetched.items.len(), 1);
    assert_eq!(fetched.items[0].product_name, name);
    assert_eq!(fetched.items[0].unit_price, 100);
    assert_eq!(fetched.items[0].line_total, 200);

    // Completing a processing order is rejected and changes nothing.
    let err = order_service::complete_order(&pool, &auth_admin, placed.order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));

    let accepted = order_service::accept_order(&pool, &auth_admin, placed.order_id).await?;
    assert_eq!(accepted.data.unwrap().status.as_str(), "accepted");

    // Accepting twice is rejected the second time.
    let err = order_service::accept_order(&pool, &auth_admin, placed.order_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition { .. }));

    let completed = order_service::complete_order(&pool, &auth_admin, placed.order_id).await?;
    assert_eq!(completed.data.unwrap().status.as_str(), "completed");

    // Lifecycle transitions never touch the ledger.
    assert_eq!(stock_of(&pool, product_id, "42").await?, 3);

    Ok(())
}

#[tokio::test]
async fn failing_line_item_rolls_back_everything() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await? else {
        return Ok(());
    };
    let auth_admin = admin();

    let first = product_service::create_product(
        &pool,
        &auth_admin,
        product_payload(&format!("Rollback A {}", Uuid::new_v4()), 100, &[("40", 5)]),
    )
    .await?
    .data
    .unwrap()
    .product_id;
    let second = product_service::create_product(
        &pool,
        &auth_admin,
        product_payload(&format!("Rollback B {}", Uuid::new_v4()), 300, &[("L", 1)]),
    )
    .await?
    .data
    .unwrap()
    .product_id;

    let customer = format!("customer-{}", Uuid::new_v4());
    let err = order_service::place_order(
        &pool,
        order_payload(&customer, &[(first, "40", 2), (second, "L", 3)]),
    )
    .await
    .unwrap_err();

    match err {
        AppError::InsufficientStock {
            product_id,
            requested,
            available,
            ..
        } => {
            assert_eq!(product_id, second);
            assert_eq!(requested, 3);
            assert_eq!(available, 1);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // Item #1's decrement must not survive the aborted transaction.
    assert_eq!(stock_of(&pool, first, "40").await?, 5);
    assert_eq!(stock_of(&pool, second, "L").await?, 1);

    let orders: i64 = sqlx::query_scalar("SELECT count(*) FROM orders WHERE customer_name = $1")
        .bind(&customer)
        .fetch_one(&pool)
        .await?;
    assert_eq!(orders, 0);

    Ok(())
}

#[tokio::test]
async fn concurrent_checkouts_cannot_oversell_the_last_unit() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await? else {
        return Ok(());
    };
    let auth_admin = admin();

    let product_id = product_service::create_product(
        &pool,
        &auth_admin,
        product_payload(&format!("Last Unit {}", Uuid::new_v4()), 250, &[("M", 1)]),
    )
    .await?
    .data
    .unwrap()
    .product_id;

    let (first, second) = tokio::join!(
        order_service::place_order(
            &pool,
            order_payload(&format!("racer-a-{}", Uuid::new_v4()), &[(product_id, "M", 1)]),
        ),
        order_service::place_order(
            &pool,
            order_payload(&format!("racer-b-{}", Uuid::new_v4()), &[(product_id, "M", 1)]),
        ),
    );

    let winners = [first.is_ok(), second.is_ok()]
        .into_iter()
        .filter(|ok| *ok)
        .count();
    assert_eq!(winners, 1, "exactly one checkout may take the last unit");

    let loser = if first.is_err() { first } else { second };
    assert!(matches!(
        loser.unwrap_err(),
        AppError::InsufficientStock { .. }
    ));

    assert_eq!(stock_of(&pool, product_id, "M").await?, 0);

    Ok(())
}

#[tokio::test]
async fn unknown_product_or_size_is_not_found() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await? else {
        return Ok(());
    };
    let auth_admin = admin();

    let customer = format!("customer-{}", Uuid::new_v4());
    let err = order_service::place_order(
        &pool,
        order_payload(&customer, &[(Uuid::new_v4(), "42", 1)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let product_id = product_service::create_product(
        &pool,
        &auth_admin,
        product_payload(&format!("No Such Size {}", Uuid::new_v4()), 100, &[("39", 4)]),
    )
    .await?
    .data
    .unwrap()
    .product_id;

    let err = order_service::place_order(&pool, order_payload(&customer, &[(product_id, "45", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    assert_eq!(stock_of(&pool, product_id, "39").await?, 4);

    let err = order_service::accept_order(&pool, &auth_admin, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}
