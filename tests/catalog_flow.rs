use axum_storefront_api::{
    db::create_pool,
    dto::products::{CreateProductRequest, Patch, SizeStockInput, UpdateProductRequest},
    error::AppError,
    middleware::auth::AuthUser,
    models::ProductStatus,
    services::product_service,
};
use uuid::Uuid;

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

fn payload(name: &str, sizes: Vec<SizeStockInput>) -> CreateProductRequest {
    CreateProductRequest {
        name: Some(name.to_string()),
        alt_names: Some("alt".into()),
        description: Some("catalog test product".into()),
        main_category: Some("women".into()),
        price: Some(700),
        color: Some("red".into()),
        country: Some("LK".into()),
        images: Some(vec![
            "https://example.com/a.jpg".into(),
            "https://example.com/b.jpg".into(),
        ]),
        is_active: None,
        sizes: Some(sizes),
    }
}

fn size(size_value: &str, stock: i32) -> SizeStockInput {
    SizeStockInput {
        size_value: Some(size_value.to_string()),
        stock: Some(stock),
    }
}

#[tokio::test]
async fn create_requires_fields_and_defaults_status() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await? else {
        return Ok(());
    };
    let auth_admin = admin();

    let mut missing_name = payload("x", vec![size("S", 1)]);
    missing_name.name = None;
    let err = product_service::create_product(&pool, &auth_admin, missing_name)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let mut bad_category = payload(&format!("Bad Cat {}", Uuid::new_v4()), vec![size("S", 1)]);
    bad_category.main_category = Some("kids".into());
    let err = product_service::create_product(&pool, &auth_admin, bad_category)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let mut no_sizes = payload(&format!("No Sizes {}", Uuid::new_v4()), vec![]);
    no_sizes.sizes = Some(vec![]);
    let err = product_service::create_product(&pool, &auth_admin, no_sizes)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // An unrecognized status falls back to active instead of failing.
    let mut odd_status = payload(&format!("Odd Status {}", Uuid::new_v4()), vec![size("S", 1)]);
    odd_status.is_active = Some("enabled".into());
    let product_id = product_service::create_product(&pool, &auth_admin, odd_status)
        .await?
        .data
        .unwrap()
        .product_id;
    let fetched = product_service::get_product(&pool, product_id).await?;
    assert_eq!(fetched.data.unwrap().product.status, ProductStatus::Active);

    // Admin-only.
    let guest = AuthUser {
        user_id: Uuid::new_v4(),
        role: "user".into(),
    };
    let err = product_service::create_product(
        &pool,
        &guest,
        payload(&format!("Guest {}", Uuid::new_v4()), vec![size("S", 1)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    Ok(())
}

#[tokio::test]
async fn incomplete_size_rows_are_skipped_not_rejected() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await? else {
        return Ok(());
    };
    let auth_admin = admin();

    let rows = vec![
        size("38", 10),
        SizeStockInput {
            size_value: None,
            stock: Some(4),
        },
        SizeStockInput {
            size_value: Some("40".into()),
            stock: None,
        },
        // Duplicate of an earlier size_value: first occurrence wins.
        size("38", 99),
    ];
    let product_id = product_service::create_product(
        &pool,
        &auth_admin,
        payload(&format!("Lenient {}", Uuid::new_v4()), rows),
    )
    .await?
    .data
    .unwrap()
    .product_id;

    let fetched = product_service::get_product(&pool, product_id).await?;
    let sizes = fetched.data.unwrap().sizes;
    assert_eq!(sizes.len(), 1);
    assert_eq!(sizes[0].size_value, "38");
    assert_eq!(sizes[0].stock, 10);

    Ok(())
}

#[tokio::test]
async fn update_touches_only_provided_fields() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await? else {
        return Ok(());
    };
    let auth_admin = admin();

    let name = format!("Partial {}", Uuid::new_v4());
    let product_id = product_service::create_product(
        &pool,
        &auth_admin,
        payload(&name, vec![size("S", 3), size("M", 6)]),
    )
    .await?
    .data
    .unwrap()
    .product_id;

    // Price-only update leaves everything else alone.
    let update = UpdateProductRequest {
        price: Some(900),
        ..Default::default()
    };
    product_service::update_product(&pool, &auth_admin, product_id, update).await?;

    let fetched = product_service::get_product(&pool, product_id).await?.data.unwrap();
    assert_eq!(fetched.product.price, 900);
    assert_eq!(fetched.product.name, name);
    assert_eq!(fetched.product.images.len(), 2);
    assert_eq!(fetched.sizes.len(), 2);

    // Explicit null clears a nullable field.
    let update = UpdateProductRequest {
        alt_names: Patch::Null,
        ..Default::default()
    };
    product_service::update_product(&pool, &auth_admin, product_id, update).await?;
    let fetched = product_service::get_product(&pool, product_id).await?.data.unwrap();
    assert_eq!(fetched.product.alt_names, None);

    // A sizes list replaces the whole set.
    let update = UpdateProductRequest {
        sizes: Some(vec![size("L", 2)]),
        ..Default::default()
    };
    product_service::update_product(&pool, &auth_admin, product_id, update).await?;
    let fetched = product_service::get_product(&pool, product_id).await?.data.unwrap();
    assert_eq!(fetched.sizes.len(), 1);
    assert_eq!(fetched.sizes[0].size_value, "L");

    // Nothing to do is an error, as is an invalid enum value.
    let err = product_service::update_product(
        &pool,
        &auth_admin,
        product_id,
        UpdateProductRequest::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let update = UpdateProductRequest {
        is_active: Some("archived".into()),
        ..Default::default()
    };
    let err = product_service::update_product(&pool, &auth_admin, product_id, update)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = product_service::update_product(
        &pool,
        &auth_admin,
        Uuid::new_v4(),
        UpdateProductRequest {
            price: Some(100),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}

#[tokio::test]
async fn delete_cascades_to_size_rows() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await? else {
        return Ok(());
    };
    let auth_admin = admin();

    let product_id = product_service::create_product(
        &pool,
        &auth_admin,
        payload(
            &format!("Cascade {}", Uuid::new_v4()),
            vec![size("S", 1), size("M", 2), size("L", 3)],
        ),
    )
    .await?
    .data
    .unwrap()
    .product_id;

    product_service::delete_product(&pool, &auth_admin, product_id).await?;

    let err = product_service::get_product(&pool, product_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let remaining: i64 =
        sqlx::query_scalar("SELECT count(*) FROM product_sizes WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(remaining, 0);

    let err = product_service::delete_product(&pool, &auth_admin, product_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    Ok(())
}

#[tokio::test]
async fn listing_shows_only_active_products_with_their_sizes() -> anyhow::Result<()> {
    let Some(pool) = setup_pool().await? else {
        return Ok(());
    };
    let auth_admin = admin();

    let active_name = format!("Visible {}", Uuid::new_v4());
    let active_id = product_service::create_product(
        &pool,
        &auth_admin,
        payload(&active_name, vec![size("40", 7), size("39", 2)]),
    )
    .await?
    .data
    .unwrap()
    .product_id;

    let mut hidden = payload(&format!("Hidden {}", Uuid::new_v4()), vec![size("40", 7)]);
    hidden.is_active = Some("inactive".into());
    let hidden_id = product_service::create_product(&pool, &auth_admin, hidden)
        .await?
        .data
        .unwrap()
        .product_id;

    let listing = product_service::list_active_products(&pool).await?.data.unwrap();
    let visible = listing
        .items
        .iter()
        .find(|item| item.product.product_id == active_id)
        .expect("active product should be listed");
    // Sizes come back nested and sorted by size_value.
    assert_eq!(visible.sizes.len(), 2);
    assert_eq!(visible.sizes[0].size_value, "39");
    assert_eq!(visible.sizes[1].size_value, "40");

    assert!(
        listing
            .items
            .iter()
            .all(|item| item.product.product_id != hidden_id),
        "inactive product must not be listed"
    );

    Ok(())
}
