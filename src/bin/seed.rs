use argon2::{
    Argon2, PasswordHasher,
    password_hash::{rand_core::OsRng, SaltString},
};
use axum_storefront_api::{
    config::AppConfig,
    db::create_pool,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user_with_role(&pool, "admin@example.com", "admin123", "admin").await?;
    let user_id = ensure_user_with_role(&pool, "user@example.com", "user123", "user").await?;
    seed_products(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user_with_role(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let products = [
        (
            "Trail Runner",
            "men",
            1450000,
            "charcoal",
            vec![("41", 12), ("42", 20), ("43", 8)],
        ),
        (
            "Linen Summer Dress",
            "women",
            980000,
            "ivory",
            vec![("S", 15), ("M", 25), ("L", 10)],
        ),
        (
            "Canvas School Sneaker",
            "child",
            520000,
            "navy",
            vec![("30", 30), ("32", 18)],
        ),
    ];

    for (name, category, price, color, sizes) in products {
        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT product_id FROM products WHERE name = $1")
                .bind(name)
                .fetch_optional(pool)
                .await?;
        if existing.is_some() {
            continue;
        }

        let mut txn = pool.begin().await?;
        let product_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO products (product_id, name, main_category, price, color)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product_id)
        .bind(name)
        .bind(category)
        .bind(i64::from(price))
        .bind(color)
        .execute(&mut *txn)
        .await?;

        for (size_value, stock) in sizes {
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
            .execute(&mut *txn)
            .await?;
        }
        txn.commit().await?;
    }

    println!("Seeded products");
    Ok(())
}
