//! Chat store: conversations between a buyer and a seller plus their
//! append-only message log.

use sqlx::SqlitePool;
use uuid::Uuid;

use super::models::{Chat, ChatMessage, ChatParticipant, ChatWithParticipants, MessageWithSender};

pub async fn create(pool: &SqlitePool, buyer_id: &str, seller_id: &str) -> sqlx::Result<Chat> {
    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO chats (id, buyer_id, seller_id) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(buyer_id)
        .bind(seller_id)
        .execute(pool)
        .await?;

    sqlx::query_as("SELECT * FROM chats WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> sqlx::Result<Option<Chat>> {
    sqlx::query_as("SELECT * FROM chats WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

async fn participant(pool: &SqlitePool, user_id: &str) -> sqlx::Result<ChatParticipant> {
    sqlx::query_as("SELECT id, first_name, last_name, email FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn with_participants(
    pool: &SqlitePool,
    chat: Chat,
) -> sqlx::Result<ChatWithParticipants> {
    let buyer = participant(pool, &chat.buyer_id).await?;
    let seller = participant(pool, &chat.seller_id).await?;
    Ok(ChatWithParticipants {
        chat,
        participants: vec![buyer, seller],
    })
}

pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: &str,
) -> sqlx::Result<Vec<ChatWithParticipants>> {
    let chats: Vec<Chat> = sqlx::query_as(
        "SELECT * FROM chats WHERE buyer_id = ? OR seller_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(chats.len());
    for chat in chats {
        out.push(with_participants(pool, chat).await?);
    }
    Ok(out)
}

pub async fn append_message(
    pool: &SqlitePool,
    chat_id: &str,
    sender_id: &str,
    content: &str,
    message_type: &str,
) -> sqlx::Result<ChatMessage> {
    let result = sqlx::query(
        "INSERT INTO messages (chat_id, sender_id, content, message_type) VALUES (?, ?, ?, ?)",
    )
    .bind(chat_id)
    .bind(sender_id)
    .bind(content)
    .bind(message_type)
    .execute(pool)
    .await?;

    sqlx::query_as("SELECT * FROM messages WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await
}

/// Messages in commit order (ids are monotonic per chat).
pub async fn list_messages(
    pool: &SqlitePool,
    chat_id: &str,
) -> sqlx::Result<Vec<MessageWithSender>> {
    let messages: Vec<ChatMessage> =
        sqlx::query_as("SELECT * FROM messages WHERE chat_id = ? ORDER BY id ASC")
            .bind(chat_id)
            .fetch_all(pool)
            .await?;

    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        let sender = participant(pool, &message.sender_id).await?;
        out.push(MessageWithSender { message, sender });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, users::test_support::insert_user, MESSAGE_TYPE_FILE, MESSAGE_TYPE_TEXT};

    #[tokio::test]
    async fn messages_keep_commit_order() {
        let pool = db::init_test().await;
        let buyer = insert_user(&pool, "b@b.com").await;
        let seller = insert_user(&pool, "s@b.com").await;
        let chat = create(&pool, &buyer.id, &seller.id).await.unwrap();

        append_message(&pool, &chat.id, &buyer.id, "hi", MESSAGE_TYPE_TEXT)
            .await
            .unwrap();
        append_message(&pool, &chat.id, &seller.id, "hello", MESSAGE_TYPE_TEXT)
            .await
            .unwrap();
        append_message(&pool, &chat.id, &buyer.id, "/f.png", MESSAGE_TYPE_FILE)
            .await
            .unwrap();

        let messages = list_messages(&pool, &chat.id).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.message.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello", "/f.png"]);
        assert!(messages.windows(2).all(|w| w[0].message.id < w[1].message.id));
        assert_eq!(messages[2].message.message_type, MESSAGE_TYPE_FILE);
    }

    #[tokio::test]
    async fn listing_covers_both_roles() {
        let pool = db::init_test().await;
        let a = insert_user(&pool, "a@b.com").await;
        let b = insert_user(&pool, "b@b.com").await;
        let c = insert_user(&pool, "c@b.com").await;
        create(&pool, &a.id, &b.id).await.unwrap();
        create(&pool, &c.id, &a.id).await.unwrap();
        create(&pool, &b.id, &c.id).await.unwrap();

        let chats = list_for_user(&pool, &a.id).await.unwrap();
        assert_eq!(chats.len(), 2);
        for chat in &chats {
            assert!(chat.participants.iter().any(|p| p.id == a.id));
            assert_eq!(chat.participants.len(), 2);
        }
    }

    #[tokio::test]
    async fn repeated_create_makes_distinct_chats() {
        let pool = db::init_test().await;
        let buyer = insert_user(&pool, "b@b.com").await;
        let seller = insert_user(&pool, "s@b.com").await;
        let first = create(&pool, &buyer.id, &seller.id).await.unwrap();
        let second = create(&pool, &buyer.id, &seller.id).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn message_to_unknown_chat_fails() {
        let pool = db::init_test().await;
        let buyer = insert_user(&pool, "b@b.com").await;
        let res = append_message(&pool, "no-such-chat", &buyer.id, "hi", MESSAGE_TYPE_TEXT).await;
        assert!(res.is_err());
    }
}
