//! Product store: CRUD, filtered search and the rating attach/detach
//! operations that keep `average_rating`/`review_count` consistent with the
//! rating sequence.

use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{rating_stats, Product, ProductWithSeller, User};
use super::users;
use super::{USER_TYPE_BUYER, USER_TYPE_SELLER};

pub const PAGE_SIZE: i64 = 10;

pub struct NewProduct {
    pub user_id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: f64,
    pub negotiable: bool,
}

/// Create a product. Owning a product implies the seller role, so a buyer
/// owner is promoted in the same transaction; a failed insert rolls the
/// promotion back too.
pub async fn create(pool: &SqlitePool, new: NewProduct) -> sqlx::Result<Product> {
    let id = Uuid::new_v4().to_string();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE users SET user_type = ?, updated_at = datetime('now')
         WHERE id = ? AND user_type = ?",
    )
    .bind(USER_TYPE_SELLER)
    .bind(&new.user_id)
    .bind(USER_TYPE_BUYER)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO products (id, user_id, name, category, description, price, negotiable)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&new.user_id)
    .bind(&new.name)
    .bind(&new.category)
    .bind(&new.description)
    .bind(new.price)
    .bind(new.negotiable)
    .execute(&mut *tx)
    .await?;

    let product = sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(product)
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> sqlx::Result<Option<Product>> {
    sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_owner_and_name(
    pool: &SqlitePool,
    user_id: &str,
    name: &str,
) -> sqlx::Result<Option<Product>> {
    sqlx::query_as("SELECT * FROM products WHERE user_id = ? AND name = ?")
        .bind(user_id)
        .bind(name)
        .fetch_optional(pool)
        .await
}

pub async fn list_by_user(pool: &SqlitePool, user_id: &str) -> sqlx::Result<Vec<Product>> {
    sqlx::query_as("SELECT * FROM products WHERE user_id = ? ORDER BY created_at DESC")
        .bind(user_id)
        .fetch_all(pool)
        .await
}

#[derive(Debug, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub negotiable: Option<bool>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.negotiable.is_none()
    }
}

pub async fn update(pool: &SqlitePool, id: &str, update: &ProductUpdate) -> sqlx::Result<Product> {
    sqlx::query(
        "UPDATE products SET
            name = COALESCE(?, name),
            category = COALESCE(?, category),
            description = COALESCE(?, description),
            price = COALESCE(?, price),
            negotiable = COALESCE(?, negotiable),
            updated_at = datetime('now')
         WHERE id = ?",
    )
    .bind(&update.name)
    .bind(&update.category)
    .bind(&update.description)
    .bind(update.price)
    .bind(update.negotiable)
    .bind(id)
    .execute(pool)
    .await?;

    sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn delete(pool: &SqlitePool, id: &str) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM reviews WHERE product_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM wishlist_items WHERE product_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}

pub async fn set_images(pool: &SqlitePool, id: &str, urls: &[String]) -> sqlx::Result<()> {
    sqlx::query("UPDATE products SET images = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(Json(urls.to_vec()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ProductFilter {
    /// Case-insensitive substring match on the product name.
    pub name: Option<String>,
    /// Case-insensitive substring match on the category.
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Restrict to owners in this (city, state).
    pub seller_location: Option<(String, String)>,
    /// 1-indexed page.
    pub page: i64,
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, filter: &'a ProductFilter) {
    if let Some(name) = &filter.name {
        qb.push(" AND instr(lower(p.name), lower(");
        qb.push_bind(name);
        qb.push(")) > 0");
    }
    if let Some(category) = &filter.category {
        qb.push(" AND instr(lower(p.category), lower(");
        qb.push_bind(category);
        qb.push(")) > 0");
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND p.price >= ");
        qb.push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND p.price <= ");
        qb.push_bind(max);
    }
    if let Some((city, state)) = &filter.seller_location {
        qb.push(" AND u.city = ");
        qb.push_bind(city);
        qb.push(" AND u.state = ");
        qb.push_bind(state);
    }
}

/// Filtered, paginated search sorted by average rating descending. Returns
/// the total matched count alongside one page of results.
pub async fn search(
    pool: &SqlitePool,
    filter: &ProductFilter,
) -> sqlx::Result<(i64, Vec<ProductWithSeller>)> {
    let mut count_qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT COUNT(*) FROM products p JOIN users u ON u.id = p.user_id WHERE 1 = 1",
    );
    push_filters(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut page_qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT p.* FROM products p JOIN users u ON u.id = p.user_id WHERE 1 = 1",
    );
    push_filters(&mut page_qb, filter);
    page_qb.push(" ORDER BY p.average_rating DESC LIMIT ");
    page_qb.push_bind(PAGE_SIZE);
    page_qb.push(" OFFSET ");
    page_qb.push_bind((filter.page.max(1) - 1) * PAGE_SIZE);

    let page: Vec<Product> = page_qb.build_query_as().fetch_all(pool).await?;
    let with_sellers = attach_sellers(pool, page).await?;
    Ok((total, with_sellers))
}

/// Attach the owner summary to each product, preserving input order.
pub async fn attach_sellers(
    pool: &SqlitePool,
    products: Vec<Product>,
) -> sqlx::Result<Vec<ProductWithSeller>> {
    let mut owner_ids: Vec<String> = products.iter().map(|p| p.user_id.clone()).collect();
    owner_ids.sort();
    owner_ids.dedup();

    let sellers = users::sellers_for(pool, &owner_ids).await?;
    let by_id: HashMap<String, _> = sellers.into_iter().map(|s| (s.id.clone(), s)).collect();

    Ok(products
        .into_iter()
        .filter_map(|product| {
            let seller = by_id.get(&product.user_id)?.clone();
            Some(ProductWithSeller { product, seller })
        })
        .collect())
}

/// Sellers with a geolocation set that offer a product matching `name`.
/// Distance filtering happens in the location service.
pub async fn located_sellers_offering(pool: &SqlitePool, name: &str) -> sqlx::Result<Vec<User>> {
    sqlx::query_as(
        "SELECT DISTINCT u.* FROM users u
         JOIN products p ON p.user_id = u.id
         WHERE u.user_type = ?
           AND u.longitude IS NOT NULL
           AND u.latitude IS NOT NULL
           AND instr(lower(p.name), lower(?)) > 0",
    )
    .bind(super::USER_TYPE_SELLER)
    .bind(name)
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// Rating attach/detach
// ---------------------------------------------------------------------------

/// Push one rating value and recompute the aggregate. Runs on a transaction
/// connection so the read-modify-write is serialized with the review write.
pub async fn attach_rating(
    conn: &mut SqliteConnection,
    product_id: &str,
    rating: i64,
) -> sqlx::Result<()> {
    let product: Product = sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

    let mut ratings = product.ratings.0;
    ratings.push(rating);
    write_aggregate(conn, product_id, ratings).await
}

/// Remove one occurrence of a rating value and recompute the aggregate.
pub async fn detach_rating(
    conn: &mut SqliteConnection,
    product_id: &str,
    rating: i64,
) -> sqlx::Result<()> {
    let product: Product = sqlx::query_as("SELECT * FROM products WHERE id = ?")
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

    let mut ratings = product.ratings.0;
    if let Some(pos) = ratings.iter().position(|r| *r == rating) {
        ratings.remove(pos);
    }
    write_aggregate(conn, product_id, ratings).await
}

async fn write_aggregate(
    conn: &mut SqliteConnection,
    product_id: &str,
    ratings: Vec<i64>,
) -> sqlx::Result<()> {
    let (average, count) = rating_stats(&ratings);
    sqlx::query(
        "UPDATE products SET ratings = ?, average_rating = ?, review_count = ?,
            updated_at = datetime('now')
         WHERE id = ?",
    )
    .bind(Json(ratings))
    .bind(average)
    .bind(count)
    .bind(product_id)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub async fn insert_product(pool: &SqlitePool, user_id: &str, name: &str) -> Product {
        create(
            pool,
            NewProduct {
                user_id: user_id.to_string(),
                name: name.to_string(),
                category: "Furniture".to_string(),
                description: "A fine piece".to_string(),
                price: 100.0,
                negotiable: true,
            },
        )
        .await
        .unwrap()
    }
}
