//! User store: account CRUD, wishlist membership and the seller deletion
//! cascade.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{Product, ProductWithSeller, SellerSummary, User};
use super::products;

pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub city: String,
    pub state: String,
    pub description: Option<String>,
}

pub async fn create(pool: &SqlitePool, new: NewUser) -> sqlx::Result<User> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, phone, city, state, description)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&new.email)
    .bind(&new.password_hash)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&new.phone)
    .bind(&new.city)
    .bind(&new.state)
    .bind(&new.description)
    .execute(pool)
    .await?;

    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub city: Option<String>,
    pub state: Option<String>,
    pub phone: Option<String>,
    pub description: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.city.is_none()
            && self.state.is_none()
            && self.phone.is_none()
            && self.description.is_none()
    }
}

pub async fn update_profile(
    pool: &SqlitePool,
    id: &str,
    update: &ProfileUpdate,
) -> sqlx::Result<User> {
    sqlx::query(
        "UPDATE users SET
            city = COALESCE(?, city),
            state = COALESCE(?, state),
            phone = COALESCE(?, phone),
            description = COALESCE(?, description),
            updated_at = datetime('now')
         WHERE id = ?",
    )
    .bind(&update.city)
    .bind(&update.state)
    .bind(&update.phone)
    .bind(&update.description)
    .bind(id)
    .execute(pool)
    .await?;

    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn set_verified(pool: &SqlitePool, id: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET is_verified = 1, updated_at = datetime('now') WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_profile_pic(pool: &SqlitePool, id: &str, url: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET profile_pic = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(url)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_location(
    pool: &SqlitePool,
    id: &str,
    longitude: f64,
    latitude: f64,
) -> sqlx::Result<User> {
    sqlx::query(
        "UPDATE users SET longitude = ?, latitude = ?, updated_at = datetime('now') WHERE id = ?",
    )
    .bind(longitude)
    .bind(latitude)
    .bind(id)
    .execute(pool)
    .await?;

    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
}

/// Replace the password hash. Clears any pending reset secret and stamps the
/// password-changed timestamp.
pub async fn set_password(pool: &SqlitePool, id: &str, password_hash: &str) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE users SET
            password_hash = ?,
            reset_token = NULL,
            reset_token_expiry = NULL,
            password_updated_at = ?,
            updated_at = datetime('now')
         WHERE id = ?",
    )
    .bind(password_hash)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_reset_secret(
    pool: &SqlitePool,
    id: &str,
    digest: &str,
    expiry: &str,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET reset_token = ?, reset_token_expiry = ? WHERE id = ?")
        .bind(digest)
        .bind(expiry)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn clear_reset_secret(pool: &SqlitePool, id: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET reset_token = NULL, reset_token_expiry = NULL WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Look up a user by reset-secret digest, requiring an unexpired token.
/// A miss and an expired token are indistinguishable to the caller.
pub async fn find_by_reset_digest(pool: &SqlitePool, digest: &str) -> sqlx::Result<Option<User>> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE reset_token = ?")
        .bind(digest)
        .fetch_optional(pool)
        .await?;

    Ok(user.filter(|u| {
        u.reset_token_expiry
            .as_deref()
            .and_then(|e| chrono::DateTime::parse_from_rfc3339(e).ok())
            .is_some_and(|expiry| expiry > Utc::now())
    }))
}

// ---------------------------------------------------------------------------
// Wishlist
// ---------------------------------------------------------------------------

pub async fn wishlist_contains(
    pool: &SqlitePool,
    user_id: &str,
    product_id: &str,
) -> sqlx::Result<bool> {
    let count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM wishlist_items WHERE user_id = ? AND product_id = ?",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(pool)
    .await?;
    Ok(count.0 > 0)
}

/// Append a product to the wishlist. The primary key on (user_id, product_id)
/// rejects duplicates even if two requests race past the contains check.
pub async fn wishlist_add(pool: &SqlitePool, user_id: &str, product_id: &str) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO wishlist_items (user_id, product_id, position)
         SELECT ?, ?, COALESCE(MAX(position) + 1, 0) FROM wishlist_items WHERE user_id = ?",
    )
    .bind(user_id)
    .bind(product_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove a product from the wishlist; returns false when it was not present.
pub async fn wishlist_remove(
    pool: &SqlitePool,
    user_id: &str,
    product_id: &str,
) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM wishlist_items WHERE user_id = ? AND product_id = ?")
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Resolve the wishlist to full products with seller summaries, in insertion
/// order. Identifiers that no longer resolve are silently dropped by the
/// inner join.
pub async fn wishlist_products(
    pool: &SqlitePool,
    user_id: &str,
) -> sqlx::Result<Vec<ProductWithSeller>> {
    let rows: Vec<Product> = sqlx::query_as(
        "SELECT p.* FROM wishlist_items w
         JOIN products p ON p.id = w.product_id
         WHERE w.user_id = ?
         ORDER BY w.position ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    products::attach_sellers(pool, rows).await
}

// ---------------------------------------------------------------------------
// Deletion cascade
// ---------------------------------------------------------------------------

/// Delete a user. Products the user owns and reviews on those products go
/// with it; ratings the user attached to other sellers' products are detached
/// so the aggregate invariant holds. The whole cascade runs in one
/// transaction.
pub async fn delete(pool: &SqlitePool, id: &str) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    // Reviews this user left on products owned by someone else.
    let foreign_reviews: Vec<(String, i64)> = sqlx::query_as(
        "SELECT product_id, rating FROM reviews
         WHERE user_id = ?
           AND product_id NOT IN (SELECT id FROM products WHERE user_id = ?)",
    )
    .bind(id)
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    for (product_id, rating) in &foreign_reviews {
        products::detach_rating(&mut tx, product_id, *rating).await?;
    }

    sqlx::query(
        "DELETE FROM reviews
         WHERE user_id = ?
            OR product_id IN (SELECT id FROM products WHERE user_id = ?)",
    )
    .bind(id)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM wishlist_items WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM products WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

pub async fn sellers_for(pool: &SqlitePool, ids: &[String]) -> sqlx::Result<Vec<SellerSummary>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT id, first_name, last_name, description, profile_pic, user_type, city, state, phone
         FROM users WHERE id IN ({placeholders})"
    );
    let mut query = sqlx::query_as(&sql);
    for id in ids {
        query = query.bind(id);
    }
    query.fetch_all(pool).await
}


#[cfg(test)]
mod tests {
    use super::test_support::insert_user;
    use super::*;
    use crate::db::{self, products, reviews};

    #[tokio::test]
    async fn email_is_unique() {
        let pool = db::init_test().await;
        insert_user(&pool, "a@b.com").await;
        let dup = create(
            &pool,
            NewUser {
                email: "a@b.com".to_string(),
                password_hash: "h".to_string(),
                first_name: "B".to_string(),
                last_name: "C".to_string(),
                phone: "1".to_string(),
                city: "x".to_string(),
                state: "y".to_string(),
                description: None,
            },
        )
        .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn new_user_defaults() {
        let pool = db::init_test().await;
        let user = insert_user(&pool, "a@b.com").await;
        assert_eq!(user.user_type, "Buyer");
        assert!(!user.is_verified);
        assert!(user.reset_token.is_none());
    }

    #[tokio::test]
    async fn wishlist_has_no_duplicates_and_keeps_order() {
        let pool = db::init_test().await;
        let user = insert_user(&pool, "a@b.com").await;
        let seller = insert_user(&pool, "s@b.com").await;
        let p1 = products::test_support::insert_product(&pool, &seller.id, "Lamp").await;
        let p2 = products::test_support::insert_product(&pool, &seller.id, "Desk").await;

        wishlist_add(&pool, &user.id, &p1.id).await.unwrap();
        wishlist_add(&pool, &user.id, &p2.id).await.unwrap();
        assert!(wishlist_contains(&pool, &user.id, &p1.id).await.unwrap());

        // Duplicate insert is rejected by the primary key.
        assert!(wishlist_add(&pool, &user.id, &p1.id).await.is_err());

        let listed = wishlist_products(&pool, &user.id).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|p| p.product.name.as_str()).collect();
        assert_eq!(names, vec!["Lamp", "Desk"]);

        assert!(wishlist_remove(&pool, &user.id, &p1.id).await.unwrap());
        assert!(!wishlist_remove(&pool, &user.id, &p1.id).await.unwrap());
    }

    #[tokio::test]
    async fn wishlist_drops_dangling_products() {
        let pool = db::init_test().await;
        let user = insert_user(&pool, "a@b.com").await;
        let seller = insert_user(&pool, "s@b.com").await;
        let p1 = products::test_support::insert_product(&pool, &seller.id, "Lamp").await;
        wishlist_add(&pool, &user.id, &p1.id).await.unwrap();

        products::delete(&pool, &p1.id).await.unwrap();
        let listed = wishlist_products(&pool, &user.id).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn reset_secret_is_single_use() {
        let pool = db::init_test().await;
        let user = insert_user(&pool, "a@b.com").await;
        let secret = crate::auth::issue_reset_secret();
        set_reset_secret(&pool, &user.id, &secret.digest, &secret.expiry.to_rfc3339())
            .await
            .unwrap();

        let found = find_by_reset_digest(&pool, &secret.digest).await.unwrap();
        assert_eq!(found.unwrap().id, user.id);

        // Successful reset clears the digest; the same plaintext no longer
        // resolves.
        set_password(&pool, &user.id, "new-hash").await.unwrap();
        assert!(find_by_reset_digest(&pool, &secret.digest)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn expired_reset_secret_does_not_resolve() {
        let pool = db::init_test().await;
        let user = insert_user(&pool, "a@b.com").await;
        let past = (Utc::now() - chrono::Duration::minutes(1)).to_rfc3339();
        set_reset_secret(&pool, &user.id, "digest", &past).await.unwrap();
        assert!(find_by_reset_digest(&pool, "digest").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seller_deletion_cascades_to_products_and_reviews() {
        let pool = db::init_test().await;
        let seller = insert_user(&pool, "s@b.com").await;
        let reviewer = insert_user(&pool, "r@b.com").await;
        let p1 = products::test_support::insert_product(&pool, &seller.id, "Lamp").await;
        let p2 = products::test_support::insert_product(&pool, &seller.id, "Desk").await;
        reviews::create(&pool, &reviewer.id, &p1.id, 4, "nice").await.unwrap();
        reviews::create(&pool, &reviewer.id, &p2.id, 2, "meh").await.unwrap();

        delete(&pool, &seller.id).await.unwrap();

        assert!(find_by_id(&pool, &seller.id).await.unwrap().is_none());
        assert!(products::find_by_id(&pool, &p1.id).await.unwrap().is_none());
        assert!(products::find_by_id(&pool, &p2.id).await.unwrap().is_none());
        assert!(reviews::list_for_product(&pool, &p1.id).await.unwrap().is_empty());
        // The reviewer survives.
        assert!(find_by_id(&pool, &reviewer.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn buyer_deletion_detaches_their_ratings() {
        let pool = db::init_test().await;
        let seller = insert_user(&pool, "s@b.com").await;
        let buyer = insert_user(&pool, "b@b.com").await;
        let product = products::test_support::insert_product(&pool, &seller.id, "Lamp").await;
        reviews::create(&pool, &buyer.id, &product.id, 5, "great").await.unwrap();

        delete(&pool, &buyer.id).await.unwrap();

        let product = products::find_by_id(&pool, &product.id).await.unwrap().unwrap();
        assert_eq!(product.review_count, 0);
        assert_eq!(product.average_rating, 0.0);
        assert!(product.ratings.0.is_empty());
        // The seller and product survive.
        assert!(find_by_id(&pool, &seller.id).await.unwrap().is_some());
    }
}
