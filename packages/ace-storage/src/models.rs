use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct Observable {
	pub observable_id: i64,
	pub r#type: String,
	pub content_hash: Vec<u8>,
	pub content: Vec<u8>,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct Tag {
	pub tag_id: i64,
	pub name: String,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct RebuildOutboxEntry {
	pub alert_id: Uuid,
	pub payload: Value,
	pub revision: i64,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
