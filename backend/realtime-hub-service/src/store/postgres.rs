//! PostgreSQL store on tokio-postgres + deadpool
//!
//! Multi-statement operations run inside one transaction. The partial unique
//! index on `(pair_low, pair_high)` backs the one-individual-conversation-per-pair
//! rule; a violation surfaces as `AppError::Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db_pool::{acquire_with_metrics, PgPool};
use deadpool_postgres::Client;
use tokio_postgres::Row;
use uuid::Uuid;

use super::ChatStore;
use crate::error::{AppError, AppResult, Entity};
use crate::models::{
    normalize_pair, Attachment, ChatRoom, Conversation, ConversationKind, Message, MessageKind,
    NewGroup, NewRoomMessage, Participant, RoomMessage, RoomMessageKind, SendMessage,
};

const SERVICE: &str = "realtime-hub-service";

pub const MIGRATION: &str = include_str!("../../migrations/0001_realtime_hub.sql");

const CONVERSATION_COLUMNS: &str = "c.id, c.kind, c.name, c.avatar_url, c.avatar_color, \
     c.last_message, c.last_message_sender_id, c.created_at, c.last_activity_at";

const PARTICIPANT_COLUMNS: &str =
    "conversation_id, user_id, is_active, is_muted, last_read_at, joined_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, sender_name, content, kind, \
     attachments, created_at, sequence";

const ROOM_COLUMNS: &str = "id, roadmap_id, roadmap_name, room_token, member_count, \
     message_count, is_active, created_at, last_message_at";

const ROOM_MESSAGE_COLUMNS: &str = "id, room_token, user_id, user_name, content, kind, \
     attachment_url, reply_to, is_pinned, is_deleted, created_at";

fn conversation_from_row(row: &Row) -> AppResult<Conversation> {
    let kind: String = row.get("kind");
    Ok(Conversation {
        id: row.get("id"),
        kind: ConversationKind::from_db(&kind)
            .ok_or_else(|| AppError::Internal(format!("unknown conversation kind {kind}")))?,
        name: row.get("name"),
        avatar_url: row.get("avatar_url"),
        avatar_color: row.get("avatar_color"),
        last_message: row.get("last_message"),
        last_message_sender_id: row.get("last_message_sender_id"),
        created_at: row.get("created_at"),
        last_activity_at: row.get("last_activity_at"),
    })
}

fn participant_from_row(row: &Row) -> Participant {
    Participant {
        conversation_id: row.get("conversation_id"),
        user_id: row.get("user_id"),
        is_active: row.get("is_active"),
        is_muted: row.get("is_muted"),
        last_read_at: row.get("last_read_at"),
        joined_at: row.get("joined_at"),
    }
}

fn message_from_row(row: &Row) -> AppResult<Message> {
    let kind: String = row.get("kind");
    let attachments: serde_json::Value = row.get("attachments");
    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        sender_name: row.get("sender_name"),
        content: row.get("content"),
        kind: MessageKind::from_db(&kind)
            .ok_or_else(|| AppError::Internal(format!("unknown message kind {kind}")))?,
        attachments: serde_json::from_value::<Vec<Attachment>>(attachments)
            .map_err(|e| AppError::Internal(format!("attachments decode: {e}")))?,
        created_at: row.get("created_at"),
        sequence: row.get("sequence"),
    })
}

fn room_from_row(row: &Row) -> ChatRoom {
    ChatRoom {
        id: row.get("id"),
        roadmap_id: row.get("roadmap_id"),
        roadmap_name: row.get("roadmap_name"),
        room_token: row.get("room_token"),
        member_count: row.get("member_count"),
        message_count: row.get("message_count"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        last_message_at: row.get("last_message_at"),
    }
}

fn room_message_from_row(row: &Row) -> AppResult<RoomMessage> {
    let kind: String = row.get("kind");
    Ok(RoomMessage {
        id: row.get("id"),
        room_token: row.get("room_token"),
        user_id: row.get("user_id"),
        user_name: row.get("user_name"),
        content: row.get("content"),
        kind: RoomMessageKind::from_db(&kind)
            .ok_or_else(|| AppError::Internal(format!("unknown room message kind {kind}")))?,
        attachment_url: row.get("attachment_url"),
        reply_to: row.get("reply_to"),
        is_pinned: row.get("is_pinned"),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
    })
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema; every statement is idempotent
    pub async fn migrate(&self) -> AppResult<()> {
        db_pool::migrate(&self.pool, "0001_realtime_hub", MIGRATION)
            .await
            .map_err(|e| AppError::StartServer(format!("migration: {e}")))
    }

    async fn client(&self) -> AppResult<Client> {
        Ok(acquire_with_metrics(&self.pool, SERVICE).await?)
    }

    async fn ensure_conversation(&self, client: &Client, conversation_id: Uuid) -> AppResult<()> {
        client
            .query_opt("SELECT 1 FROM conversations WHERE id = $1", &[&conversation_id])
            .await?
            .map(|_| ())
            .ok_or(AppError::NotFound(Entity::Conversation))
    }
}

async fn insert_participant(
    tx: &deadpool_postgres::Transaction<'_>,
    conversation_id: Uuid,
    user_id: i64,
    now: DateTime<Utc>,
) -> AppResult<()> {
    tx.execute(
        "INSERT INTO participants (conversation_id, user_id, is_active, last_read_at, joined_at) \
         VALUES ($1, $2, TRUE, $3, $3) \
         ON CONFLICT (conversation_id, user_id) DO UPDATE SET is_active = TRUE",
        &[&conversation_id, &user_id, &now],
    )
    .await?;
    Ok(())
}

#[async_trait]
impl ChatStore for PgStore {
    async fn find_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let client = self.client().await?;
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations c WHERE c.id = $1");
        client
            .query_opt(sql.as_str(), &[&id])
            .await?
            .as_ref()
            .map(conversation_from_row)
            .transpose()
    }

    async fn list_conversations_for_user(&self, user_id: i64) -> AppResult<Vec<Conversation>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c \
             JOIN participants p ON p.conversation_id = c.id \
             WHERE p.user_id = $1 AND p.is_active \
             ORDER BY c.last_activity_at DESC"
        );
        client
            .query(sql.as_str(), &[&user_id])
            .await?
            .iter()
            .map(conversation_from_row)
            .collect()
    }

    async fn find_individual(&self, a: i64, b: i64) -> AppResult<Option<Conversation>> {
        let (low, high) = normalize_pair(a, b);
        let client = self.client().await?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations c \
             WHERE c.kind = 'individual' AND c.pair_low = $1 AND c.pair_high = $2"
        );
        client
            .query_opt(sql.as_str(), &[&low, &high])
            .await?
            .as_ref()
            .map(conversation_from_row)
            .transpose()
    }

    async fn create_individual(&self, a: i64, b: i64) -> AppResult<Conversation> {
        let (low, high) = normalize_pair(a, b);
        let now = Utc::now();
        let conversation = Conversation::new(ConversationKind::Individual, now);

        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        tx.execute(
            "INSERT INTO conversations (id, kind, pair_low, pair_high, created_at, last_activity_at) \
             VALUES ($1, 'individual', $2, $3, $4, $4)",
            &[&conversation.id, &low, &high, &now],
        )
        .await?;
        insert_participant(&tx, conversation.id, low, now).await?;
        insert_participant(&tx, conversation.id, high, now).await?;
        tx.commit().await?;

        Ok(conversation)
    }

    async fn create_group(&self, creator: i64, group: NewGroup) -> AppResult<Conversation> {
        let now = Utc::now();
        let mut conversation = Conversation::new(ConversationKind::Group, now);
        conversation.name = Some(group.name);
        conversation.avatar_url = group.avatar_url;
        conversation.avatar_color = group.avatar_color;

        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        tx.execute(
            "INSERT INTO conversations \
             (id, kind, name, avatar_url, avatar_color, created_at, last_activity_at) \
             VALUES ($1, 'group', $2, $3, $4, $5, $5)",
            &[
                &conversation.id,
                &conversation.name,
                &conversation.avatar_url,
                &conversation.avatar_color,
                &now,
            ],
        )
        .await?;
        insert_participant(&tx, conversation.id, creator, now).await?;
        for member in &group.member_ids {
            insert_participant(&tx, conversation.id, *member, now).await?;
        }
        tx.commit().await?;

        Ok(conversation)
    }

    async fn add_participant(
        &self,
        conversation_id: Uuid,
        user_id: i64,
    ) -> AppResult<Participant> {
        let now = Utc::now();
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        let touched = tx
            .execute(
                "UPDATE conversations SET last_activity_at = GREATEST(last_activity_at, $2) \
                 WHERE id = $1",
                &[&conversation_id, &now],
            )
            .await?;
        if touched == 0 {
            return Err(AppError::NotFound(Entity::Conversation));
        }

        // Reactivation keeps the previous read cursor
        let sql = format!(
            "INSERT INTO participants (conversation_id, user_id, is_active, last_read_at, joined_at) \
             VALUES ($1, $2, TRUE, $3, $3) \
             ON CONFLICT (conversation_id, user_id) DO UPDATE SET is_active = TRUE \
             RETURNING {PARTICIPANT_COLUMNS}"
        );
        let row = tx
            .query_one(sql.as_str(), &[&conversation_id, &user_id, &now])
            .await?;
        tx.commit().await?;

        Ok(participant_from_row(&row))
    }

    async fn deactivate_participant(&self, conversation_id: Uuid, user_id: i64) -> AppResult<()> {
        let now = Utc::now();
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        let touched = tx
            .execute(
                "UPDATE conversations SET last_activity_at = GREATEST(last_activity_at, $2) \
                 WHERE id = $1",
                &[&conversation_id, &now],
            )
            .await?;
        if touched == 0 {
            return Err(AppError::NotFound(Entity::Conversation));
        }

        let updated = tx
            .execute(
                "UPDATE participants SET is_active = FALSE \
                 WHERE conversation_id = $1 AND user_id = $2",
                &[&conversation_id, &user_id],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound(Entity::Participant));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_participant(
        &self,
        conversation_id: Uuid,
        user_id: i64,
    ) -> AppResult<Option<Participant>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants \
             WHERE conversation_id = $1 AND user_id = $2"
        );
        Ok(client
            .query_opt(sql.as_str(), &[&conversation_id, &user_id])
            .await?
            .as_ref()
            .map(participant_from_row))
    }

    async fn list_participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants \
             WHERE conversation_id = $1 ORDER BY user_id"
        );
        Ok(client
            .query(sql.as_str(), &[&conversation_id])
            .await?
            .iter()
            .map(participant_from_row)
            .collect())
    }

    async fn set_participant_muted(
        &self,
        conversation_id: Uuid,
        user_id: i64,
        muted: bool,
    ) -> AppResult<Participant> {
        let client = self.client().await?;
        let sql = format!(
            "UPDATE participants SET is_muted = $3 \
             WHERE conversation_id = $1 AND user_id = $2 \
             RETURNING {PARTICIPANT_COLUMNS}"
        );
        let row = client
            .query_opt(sql.as_str(), &[&conversation_id, &user_id, &muted])
            .await?;
        match row {
            Some(row) => Ok(participant_from_row(&row)),
            None => {
                self.ensure_conversation(&client, conversation_id).await?;
                Err(AppError::NotFound(Entity::Participant))
            }
        }
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: i64,
        input: SendMessage,
    ) -> AppResult<Message> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        // Row lock serializes appends per conversation. The new timestamp is
        // pushed past last activity, which covers earlier messages and the
        // cursors set when participants joined.
        let locked = tx
            .query_opt(
                "SELECT next_sequence, last_activity_at FROM conversations \
                 WHERE id = $1 FOR UPDATE",
                &[&conversation_id],
            )
            .await?
            .ok_or(AppError::NotFound(Entity::Conversation))?;
        let sequence: i64 = locked.get("next_sequence");
        let last_activity: DateTime<Utc> = locked.get("last_activity_at");

        let active: Option<bool> = tx
            .query_opt(
                "SELECT is_active FROM participants WHERE conversation_id = $1 AND user_id = $2",
                &[&conversation_id, &sender_id],
            )
            .await?
            .map(|row| row.get("is_active"));
        if active != Some(true) {
            return Err(AppError::forbidden(
                "sender is not an active participant of the conversation",
            ));
        }

        let id = Uuid::new_v4();
        let attachments = serde_json::to_value(&input.attachments)
            .map_err(|e| AppError::Internal(format!("attachments encode: {e}")))?;
        let sql = format!(
            "INSERT INTO messages ({MESSAGE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, \
                 GREATEST(clock_timestamp(), $9::TIMESTAMPTZ + interval '1 microsecond'), \
                 $8) \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let row = tx
            .query_one(
                sql.as_str(),
                &[
                    &id,
                    &conversation_id,
                    &sender_id,
                    &input.sender_name,
                    &input.content,
                    &input.kind.to_db(),
                    &attachments,
                    &sequence,
                    &last_activity,
                ],
            )
            .await?;
        let message = message_from_row(&row)?;

        tx.execute(
            "UPDATE conversations SET next_sequence = next_sequence + 1, \
                 last_activity_at = GREATEST(last_activity_at, $2), \
                 last_message = $3, last_message_sender_id = $4 \
             WHERE id = $1",
            &[
                &conversation_id,
                &message.created_at,
                &message.content,
                &sender_id,
            ],
        )
        .await?;
        tx.execute(
            "UPDATE participants SET last_read_at = GREATEST(last_read_at, $3) \
             WHERE conversation_id = $1 AND user_id = $2",
            &[&conversation_id, &sender_id, &message.created_at],
        )
        .await?;
        tx.commit().await?;

        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        before: Option<i64>,
        limit: i64,
    ) -> AppResult<Vec<Message>> {
        let client = self.client().await?;
        let exists = client
            .query_opt("SELECT 1 FROM conversations WHERE id = $1", &[&conversation_id])
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(Entity::Conversation));
        }

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM ( \
                 SELECT {MESSAGE_COLUMNS} FROM messages \
                 WHERE conversation_id = $1 AND ($2::BIGINT IS NULL OR sequence < $2) \
                 ORDER BY sequence DESC LIMIT $3 \
             ) page ORDER BY sequence ASC"
        );
        client
            .query(sql.as_str(), &[&conversation_id, &before, &limit.max(0)])
            .await?
            .iter()
            .map(message_from_row)
            .collect()
    }

    async fn search_messages(
        &self,
        conversation_id: Uuid,
        keyword: &str,
        limit: i64,
    ) -> AppResult<Vec<Message>> {
        let client = self.client().await?;
        self.ensure_conversation(&client, conversation_id).await?;

        let pattern = keyword
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND content ILIKE '%' || $2 || '%' \
             ORDER BY sequence ASC LIMIT $3"
        );
        client
            .query(sql.as_str(), &[&conversation_id, &pattern, &limit.max(0)])
            .await?
            .iter()
            .map(message_from_row)
            .collect()
    }

    async fn pin_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        pinned_by: i64,
    ) -> AppResult<Message> {
        let client = self.client().await?;
        self.ensure_conversation(&client, conversation_id).await?;

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 AND conversation_id = $2"
        );
        let row = client
            .query_opt(sql.as_str(), &[&message_id, &conversation_id])
            .await?
            .ok_or(AppError::NotFound(Entity::Message))?;
        let message = message_from_row(&row)?;

        client
            .execute(
                "INSERT INTO conversation_pins (conversation_id, message_id, pinned_by) \
                 VALUES ($1, $2, $3) ON CONFLICT (conversation_id, message_id) DO NOTHING",
                &[&conversation_id, &message_id, &pinned_by],
            )
            .await?;
        Ok(message)
    }

    async fn unpin_message(&self, conversation_id: Uuid, message_id: Uuid) -> AppResult<()> {
        let client = self.client().await?;
        self.ensure_conversation(&client, conversation_id).await?;
        client
            .execute(
                "DELETE FROM conversation_pins WHERE conversation_id = $1 AND message_id = $2",
                &[&conversation_id, &message_id],
            )
            .await?;
        Ok(())
    }

    async fn pinned_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let client = self.client().await?;
        self.ensure_conversation(&client, conversation_id).await?;

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM ( \
                 SELECT m.*, p.pinned_at AS pin_order FROM conversation_pins p \
                 JOIN messages m ON m.id = p.message_id \
                 WHERE p.conversation_id = $1 \
             ) pinned ORDER BY pin_order, sequence"
        );
        client
            .query(sql.as_str(), &[&conversation_id])
            .await?
            .iter()
            .map(message_from_row)
            .collect()
    }

    async fn advance_read_cursor(
        &self,
        conversation_id: Uuid,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<DateTime<Utc>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "UPDATE participants SET last_read_at = GREATEST(last_read_at, $3) \
                 WHERE conversation_id = $1 AND user_id = $2 \
                 RETURNING last_read_at",
                &[&conversation_id, &user_id, &at],
            )
            .await?;

        match row {
            Some(row) => Ok(row.get("last_read_at")),
            None => {
                let exists = client
                    .query_opt("SELECT 1 FROM conversations WHERE id = $1", &[&conversation_id])
                    .await?;
                Err(AppError::NotFound(if exists.is_some() {
                    Entity::Participant
                } else {
                    Entity::Conversation
                }))
            }
        }
    }

    async fn count_unread(&self, conversation_id: Uuid, user_id: i64) -> AppResult<i64> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT ( \
                     SELECT count(*) FROM messages m \
                     WHERE m.conversation_id = p.conversation_id \
                       AND m.created_at > p.last_read_at \
                       AND m.sender_id <> p.user_id \
                 ) AS unread \
                 FROM participants p \
                 WHERE p.conversation_id = $1 AND p.user_id = $2",
                &[&conversation_id, &user_id],
            )
            .await?
            .ok_or(AppError::NotFound(Entity::Participant))?;
        Ok(row.get("unread"))
    }

    async fn find_room(&self, room_token: &str) -> AppResult<Option<ChatRoom>> {
        let client = self.client().await?;
        let sql = format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE room_token = $1");
        Ok(client
            .query_opt(sql.as_str(), &[&room_token])
            .await?
            .as_ref()
            .map(room_from_row))
    }

    async fn find_room_by_roadmap(&self, roadmap_id: i64) -> AppResult<Option<ChatRoom>> {
        let client = self.client().await?;
        let sql = format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE roadmap_id = $1");
        Ok(client
            .query_opt(sql.as_str(), &[&roadmap_id])
            .await?
            .as_ref()
            .map(room_from_row))
    }

    async fn create_room(&self, room: ChatRoom) -> AppResult<ChatRoom> {
        let client = self.client().await?;
        let sql = format!(
            "INSERT INTO chat_rooms ({ROOM_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {ROOM_COLUMNS}"
        );
        let row = client
            .query_one(
                sql.as_str(),
                &[
                    &room.id,
                    &room.roadmap_id,
                    &room.roadmap_name,
                    &room.room_token,
                    &room.member_count,
                    &room.message_count,
                    &room.is_active,
                    &room.created_at,
                    &room.last_message_at,
                ],
            )
            .await?;
        Ok(room_from_row(&row))
    }

    async fn join_room(&self, room_token: &str, user_id: i64) -> AppResult<ChatRoom> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        let lock_sql = format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE room_token = $1 FOR UPDATE");
        let room = tx
            .query_opt(lock_sql.as_str(), &[&room_token])
            .await?
            .as_ref()
            .map(room_from_row)
            .ok_or(AppError::NotFound(Entity::Room))?;

        let inserted = tx
            .execute(
                "INSERT INTO chat_room_members (room_token, user_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
                &[&room_token, &user_id],
            )
            .await?;
        if inserted == 0 {
            tx.commit().await?;
            return Ok(room);
        }

        let sql = format!(
            "UPDATE chat_rooms SET member_count = member_count + 1 \
             WHERE room_token = $1 RETURNING {ROOM_COLUMNS}"
        );
        let row = tx.query_one(sql.as_str(), &[&room_token]).await?;
        tx.commit().await?;
        Ok(room_from_row(&row))
    }

    async fn leave_room(&self, room_token: &str, user_id: i64) -> AppResult<ChatRoom> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        let lock_sql = format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE room_token = $1 FOR UPDATE");
        let room = tx
            .query_opt(lock_sql.as_str(), &[&room_token])
            .await?
            .as_ref()
            .map(room_from_row)
            .ok_or(AppError::NotFound(Entity::Room))?;

        let removed = tx
            .execute(
                "DELETE FROM chat_room_members WHERE room_token = $1 AND user_id = $2",
                &[&room_token, &user_id],
            )
            .await?;
        if removed == 0 {
            tx.commit().await?;
            return Ok(room);
        }

        let sql = format!(
            "UPDATE chat_rooms SET member_count = GREATEST(member_count - 1, 0) \
             WHERE room_token = $1 RETURNING {ROOM_COLUMNS}"
        );
        let row = tx.query_one(sql.as_str(), &[&room_token]).await?;
        tx.commit().await?;
        Ok(room_from_row(&row))
    }

    async fn append_room_message(
        &self,
        room_token: &str,
        user_id: i64,
        input: NewRoomMessage,
    ) -> AppResult<RoomMessage> {
        let now = Utc::now();
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        let touched = tx
            .execute(
                "UPDATE chat_rooms SET message_count = message_count + 1, last_message_at = $2 \
                 WHERE room_token = $1",
                &[&room_token, &now],
            )
            .await?;
        if touched == 0 {
            return Err(AppError::NotFound(Entity::Room));
        }

        let sql = format!(
            "INSERT INTO chat_room_messages ({ROOM_MESSAGE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, FALSE, $9) \
             RETURNING {ROOM_MESSAGE_COLUMNS}"
        );
        let row = tx
            .query_one(
                sql.as_str(),
                &[
                    &Uuid::new_v4(),
                    &room_token,
                    &user_id,
                    &input.user_name,
                    &input.content,
                    &input.kind.to_db(),
                    &input.attachment_url,
                    &input.reply_to,
                    &now,
                ],
            )
            .await?;
        tx.commit().await?;
        room_message_from_row(&row)
    }

    async fn recent_room_messages(
        &self,
        room_token: &str,
        limit: i64,
    ) -> AppResult<Vec<RoomMessage>> {
        let client = self.client().await?;
        let exists = client
            .query_opt("SELECT 1 FROM chat_rooms WHERE room_token = $1", &[&room_token])
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(Entity::Room));
        }

        let sql = format!(
            "SELECT {ROOM_MESSAGE_COLUMNS} FROM ( \
                 SELECT {ROOM_MESSAGE_COLUMNS} FROM chat_room_messages \
                 WHERE room_token = $1 AND NOT is_deleted \
                 ORDER BY created_at DESC LIMIT $2 \
             ) recent ORDER BY created_at ASC"
        );
        client
            .query(sql.as_str(), &[&room_token, &limit.max(0)])
            .await?
            .iter()
            .map(room_message_from_row)
            .collect()
    }

    async fn set_room_message_pinned(
        &self,
        message_id: Uuid,
        pinned: bool,
    ) -> AppResult<RoomMessage> {
        let client = self.client().await?;
        let sql = format!(
            "UPDATE chat_room_messages SET is_pinned = $2 \
             WHERE id = $1 AND NOT is_deleted RETURNING {ROOM_MESSAGE_COLUMNS}"
        );
        let row = client
            .query_opt(sql.as_str(), &[&message_id, &pinned])
            .await?
            .ok_or(AppError::NotFound(Entity::Message))?;
        room_message_from_row(&row)
    }

    async fn pinned_room_messages(&self, room_token: &str) -> AppResult<Vec<RoomMessage>> {
        let client = self.client().await?;
        let exists = client
            .query_opt("SELECT 1 FROM chat_rooms WHERE room_token = $1", &[&room_token])
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(Entity::Room));
        }

        let sql = format!(
            "SELECT {ROOM_MESSAGE_COLUMNS} FROM chat_room_messages \
             WHERE room_token = $1 AND is_pinned AND NOT is_deleted \
             ORDER BY created_at ASC"
        );
        client
            .query(sql.as_str(), &[&room_token])
            .await?
            .iter()
            .map(room_message_from_row)
            .collect()
    }

    async fn soft_delete_room_message(
        &self,
        message_id: Uuid,
        user_id: i64,
    ) -> AppResult<RoomMessage> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                "SELECT user_id, room_token FROM chat_room_messages \
                 WHERE id = $1 AND NOT is_deleted FOR UPDATE",
                &[&message_id],
            )
            .await?
            .ok_or(AppError::NotFound(Entity::Message))?;
        let author: i64 = row.get("user_id");
        let room_token: String = row.get("room_token");
        if author != user_id {
            return Err(AppError::forbidden("only the author may delete a message"));
        }

        let sql = format!(
            "UPDATE chat_room_messages SET is_deleted = TRUE, is_pinned = FALSE \
             WHERE id = $1 RETURNING {ROOM_MESSAGE_COLUMNS}"
        );
        let row = tx.query_one(sql.as_str(), &[&message_id]).await?;
        tx.execute(
            "UPDATE chat_rooms SET message_count = GREATEST(message_count - 1, 0) \
             WHERE room_token = $1",
            &[&room_token],
        )
        .await?;
        tx.commit().await?;
        room_message_from_row(&row)
    }
}
