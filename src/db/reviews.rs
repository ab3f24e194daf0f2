//! Review store. Review writes and the product rating aggregate move
//! together inside one transaction.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{Review, ReviewAuthor, ReviewEdit, ReviewWithAuthor};
use super::products;

pub async fn create(
    pool: &SqlitePool,
    user_id: &str,
    product_id: &str,
    rating: i64,
    comment: &str,
) -> sqlx::Result<Review> {
    let id = Uuid::new_v4().to_string();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO reviews (id, user_id, product_id, rating, comment)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(product_id)
    .bind(rating)
    .bind(comment)
    .execute(&mut *tx)
    .await?;

    products::attach_rating(&mut tx, product_id, rating).await?;

    let review = sqlx::query_as("SELECT * FROM reviews WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(review)
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> sqlx::Result<Option<Review>> {
    sqlx::query_as("SELECT * FROM reviews WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_author_and_product(
    pool: &SqlitePool,
    user_id: &str,
    product_id: &str,
) -> sqlx::Result<Option<Review>> {
    sqlx::query_as("SELECT * FROM reviews WHERE user_id = ? AND product_id = ?")
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_for_product(
    pool: &SqlitePool,
    product_id: &str,
) -> sqlx::Result<Vec<ReviewWithAuthor>> {
    let reviews: Vec<Review> =
        sqlx::query_as("SELECT * FROM reviews WHERE product_id = ? ORDER BY created_at DESC")
            .bind(product_id)
            .fetch_all(pool)
            .await?;

    let mut out = Vec::with_capacity(reviews.len());
    for review in reviews {
        let author: ReviewAuthor =
            sqlx::query_as("SELECT id, first_name, last_name FROM users WHERE id = ?")
                .bind(&review.user_id)
                .fetch_one(pool)
                .await?;
        out.push(ReviewWithAuthor { review, author });
    }
    Ok(out)
}

/// Apply an author's edit. The pre-update state is appended to the edit
/// history and the product aggregate is moved from the old rating to the
/// new one in the same transaction.
pub async fn update(
    pool: &SqlitePool,
    review: &Review,
    rating: Option<i64>,
    comment: Option<&str>,
) -> sqlx::Result<Review> {
    let new_rating = rating.unwrap_or(review.rating);
    let new_comment = comment.unwrap_or(&review.comment);

    let mut history = review.edit_history.0.clone();
    history.push(ReviewEdit {
        rating: review.rating,
        comment: review.comment.clone(),
        edited_at: Utc::now().to_rfc3339(),
    });

    let mut tx = pool.begin().await?;
    products::detach_rating(&mut tx, &review.product_id, review.rating).await?;

    sqlx::query(
        "UPDATE reviews SET rating = ?, comment = ?, edit_history = ?,
            updated_at = datetime('now')
         WHERE id = ?",
    )
    .bind(new_rating)
    .bind(new_comment)
    .bind(Json(history))
    .bind(&review.id)
    .execute(&mut *tx)
    .await?;

    products::attach_rating(&mut tx, &review.product_id, new_rating).await?;

    let updated = sqlx::query_as("SELECT * FROM reviews WHERE id = ?")
        .bind(&review.id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        self, products::test_support::insert_product, users::test_support::insert_user,
    };

    #[tokio::test]
    async fn create_moves_product_aggregate() {
        let pool = db::init_test().await;
        let seller = insert_user(&pool, "s@b.com").await;
        let buyer = insert_user(&pool, "b@b.com").await;
        let product = insert_product(&pool, &seller.id, "Lamp").await;

        create(&pool, &buyer.id, &product.id, 4, "Solid lamp")
            .await
            .unwrap();

        let p = products::find_by_id(&pool, &product.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(p.review_count, 1);
        assert!((p.average_rating - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn one_review_per_author_and_product() {
        let pool = db::init_test().await;
        let seller = insert_user(&pool, "s@b.com").await;
        let buyer = insert_user(&pool, "b@b.com").await;
        let product = insert_product(&pool, &seller.id, "Lamp").await;

        create(&pool, &buyer.id, &product.id, 4, "first").await.unwrap();
        let dup = create(&pool, &buyer.id, &product.id, 5, "second").await;
        assert!(dup.is_err());

        // The failed attempt must not have touched the aggregate.
        let p = products::find_by_id(&pool, &product.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(p.review_count, 1);
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected() {
        let pool = db::init_test().await;
        let seller = insert_user(&pool, "s@b.com").await;
        let buyer = insert_user(&pool, "b@b.com").await;
        let product = insert_product(&pool, &seller.id, "Lamp").await;

        assert!(create(&pool, &buyer.id, &product.id, 6, "too high").await.is_err());
        assert!(create(&pool, &buyer.id, &product.id, -1, "too low").await.is_err());
    }

    #[tokio::test]
    async fn update_snapshots_history_and_rebalances_rating() {
        let pool = db::init_test().await;
        let seller = insert_user(&pool, "s@b.com").await;
        let buyer = insert_user(&pool, "b@b.com").await;
        let product = insert_product(&pool, &seller.id, "Lamp").await;

        let review = create(&pool, &buyer.id, &product.id, 2, "meh").await.unwrap();
        let updated = update(&pool, &review, Some(5), Some("actually great"))
            .await
            .unwrap();

        assert_eq!(updated.rating, 5);
        assert_eq!(updated.comment, "actually great");
        assert_eq!(updated.edit_history.0.len(), 1);
        assert_eq!(updated.edit_history.0[0].rating, 2);
        assert_eq!(updated.edit_history.0[0].comment, "meh");

        let p = products::find_by_id(&pool, &product.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(p.review_count, 1);
        assert!((p.average_rating - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn comment_only_update_keeps_rating() {
        let pool = db::init_test().await;
        let seller = insert_user(&pool, "s@b.com").await;
        let buyer = insert_user(&pool, "b@b.com").await;
        let product = insert_product(&pool, &seller.id, "Lamp").await;

        let review = create(&pool, &buyer.id, &product.id, 3, "ok").await.unwrap();
        let updated = update(&pool, &review, None, Some("still ok")).await.unwrap();
        assert_eq!(updated.rating, 3);

        let p = products::find_by_id(&pool, &product.id)
            .await
            .unwrap()
            .unwrap();
        assert!((p.average_rating - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn listing_attaches_author_names() {
        let pool = db::init_test().await;
        let seller = insert_user(&pool, "s@b.com").await;
        let buyer = insert_user(&pool, "b@b.com").await;
        let product = insert_product(&pool, &seller.id, "Lamp").await;
        create(&pool, &buyer.id, &product.id, 4, "nice").await.unwrap();

        let listed = list_for_product(&pool, &product.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].author.id, buyer.id);
        assert_eq!(listed[0].author.first_name, buyer.first_name);
    }
}
