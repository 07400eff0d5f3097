use async_trait::async_trait;
use chrono::Utc;
use log::{ error, info };
use redis::{ AsyncCommands, Client };
use std::collections::HashMap;
use std::error::Error;

use super::{ derive_title, sort_by_activity, SessionStore, StoreError, StoredMessage };
use crate::models::api::parse_timestamp;
use crate::models::chat::{ Role, SessionSummary };

/// Messages live in a list at `<prefix>messages:<id>`, metadata (timestamps,
/// custom title) in a hash at `<prefix>meta:<id>`.
pub struct RedisSessionStore {
    client: Client,
    key_prefix: String,
    scan_count: usize,
}

impl RedisSessionStore {
    pub fn new(
        host: &str,
        key_prefix: &str,
        scan_count: usize
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
            scan_count: scan_count.max(1),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn messages_key(&self, session_id: &str) -> String {
        format!("{}messages:{}", self.key_prefix, session_id)
    }

    fn meta_key(&self, session_id: &str) -> String {
        format!("{}meta:{}", self.key_prefix, session_id)
    }

    /// Registers the session; `activity` also bumps `updated_at`.
    async fn touch(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        session_id: &str,
        activity: bool
    ) -> Result<(), StoreError> {
        let key = self.meta_key(session_id);
        let now = Utc::now().to_rfc3339();
        let created: bool = conn.hset_nx(&key, "created_at", &now).await?;
        if created {
            info!("Created new session: {}", session_id);
            let _: bool = conn.hset_nx(&key, "updated_at", &now).await?;
        }
        if activity {
            let _: () = conn.hset(&key, "updated_at", &now).await?;
        }
        Ok(())
    }

    async fn session_ids(
        &self,
        conn: &mut redis::aio::MultiplexedConnection
    ) -> Result<Vec<String>, StoreError> {
        let meta_prefix = self.meta_key("");
        let pattern = format!("{}*", meta_prefix);
        let mut cursor: u64 = 0;
        let mut ids = Vec::new();
        loop {
            let (next, keys): (u64, Vec<String>) = redis
                ::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_count)
                .query_async(conn).await?;
            ids.extend(keys.into_iter().filter_map(|k| k.strip_prefix(&meta_prefix).map(str::to_string)));
            if next == 0 {
                break;
            }
            cursor = next;
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn summary(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        session_id: &str
    ) -> Result<SessionSummary, StoreError> {
        let meta: HashMap<String, String> = conn.hgetall(self.meta_key(session_id)).await?;
        let messages_key = self.messages_key(session_id);
        let message_count: usize = conn.llen(&messages_key).await?;
        let first: Option<String> = conn.lindex(&messages_key, 0).await?;
        let first = match first {
            Some(raw) => Some(serde_json::from_str::<StoredMessage>(&raw)?.content),
            None => None,
        };

        let now = Utc::now();
        let timestamp = |field: &str| {
            meta.get(field).and_then(|raw| parse_timestamp(raw)).unwrap_or(now)
        };
        Ok(SessionSummary {
            id: session_id.to_string(),
            title: meta
                .get("title")
                .cloned()
                .unwrap_or_else(|| derive_title(first.as_deref())),
            created_at: timestamp("created_at"),
            updated_at: timestamp("updated_at"),
            message_count,
            starred: false,
            archived: false,
            tags: Vec::new(),
        })
    }
}

/// LRANGE start index for the newest `limit` entries; `None` when nothing is wanted.
fn range_start(limit: Option<usize>) -> Option<isize> {
    match limit {
        None => Some(0),
        Some(0) => None,
        Some(n) => Some(-(n as isize)),
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let json_msg = serde_json::to_string(&StoredMessage::new(role, content))?;
        let _: i64 = conn.rpush(self.messages_key(session_id), &json_msg).await?;
        self.touch(&mut conn, session_id, true).await
    }

    async fn history(
        &self,
        session_id: &str,
        limit: Option<usize>
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let mut conn = self.get_connection().await?;
        self.touch(&mut conn, session_id, false).await?;
        let Some(start) = range_start(limit) else {
            return Ok(Vec::new());
        };
        let json_entries: Vec<String> = conn.lrange(self.messages_key(session_id), start, -1).await?;

        let mut messages = Vec::with_capacity(json_entries.len());
        for json_entry in &json_entries {
            match serde_json::from_str::<StoredMessage>(json_entry) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    error!("Error parsing history entry: {}", e);
                }
            }
        }
        Ok(messages)
    }

    async fn replace_last(&self, session_id: &str, role: Role, content: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let key = self.messages_key(session_id);
        let len: usize = conn.llen(&key).await?;
        if len == 0 {
            return Err(StoreError::NotFound(session_id.to_string()));
        }
        let json_msg = serde_json::to_string(&StoredMessage::new(role, content))?;
        let _: () = conn.lset(&key, -1, &json_msg).await?;
        self.touch(&mut conn, session_id, true).await
    }

    async fn reset(&self, session_id: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let _: () = redis
            ::cmd("DEL")
            .arg(self.messages_key(session_id))
            .arg(self.meta_key(session_id))
            .query_async(&mut conn).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let mut conn = self.get_connection().await?;
        let ids = self.session_ids(&mut conn).await?;
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            summaries.push(self.summary(&mut conn, &id).await?);
        }
        sort_by_activity(&mut summaries);
        Ok(summaries)
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let removed: i64 = redis
            ::cmd("DEL")
            .arg(self.messages_key(session_id))
            .arg(self.meta_key(session_id))
            .query_async(&mut conn).await?;
        if removed == 0 {
            return Err(StoreError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn set_title(&self, session_id: &str, title: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        self.touch(&mut conn, session_id, true).await?;
        let _: () = conn.hset(self.meta_key(session_id), "title", title).await?;
        Ok(())
    }
}
