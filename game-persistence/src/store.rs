use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
};
use thiserror::Error;
use tracing::warn;

use crate::entities::{prelude::*, rooms};
use game_types::{ChatEntry, Room, RoomId, SessionId, CHAT_HISTORY_LIMIT};

/// Optimistic saves are retried this many times before the mutation is
/// abandoned.
pub const SAVE_RETRY_LIMIT: usize = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("room not found")]
    NotFound,
    #[error("version conflict")]
    VersionConflict,
    #[error("room state serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Db(#[from] DbErr),
}

/// CRUD over the `rooms` table with optimistic concurrency, plus the targeted
/// atomic updates used on hot paths.
pub struct RoomStore {
    db: DatabaseConnection,
}

impl RoomStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, room: &Room) -> Result<(), StoreError> {
        let model = rooms::ActiveModel {
            id: Set(room.room_id.as_str().to_string()),
            version: Set(0),
            state: Set(serde_json::to_value(room)?),
            last_activity: Set(room.last_activity),
        };
        Rooms::insert(model).exec(&self.db).await?;
        Ok(())
    }

    pub async fn load(&self, room_id: &RoomId) -> Result<(Room, i64), StoreError> {
        let model = Rooms::find_by_id(room_id.as_str())
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound)?;
        let room: Room = serde_json::from_value(model.state)?;
        Ok((room, model.version))
    }

    /// Conditional save keyed on the version read at load time. A concurrent
    /// writer having bumped the version (or the room having been deleted)
    /// surfaces as `VersionConflict`.
    pub async fn save(&self, room: &Room, expected_version: i64) -> Result<i64, StoreError> {
        let next = expected_version + 1;
        let result = Rooms::update_many()
            .col_expr(rooms::Column::State, Expr::value(serde_json::to_value(room)?))
            .col_expr(rooms::Column::Version, Expr::value(next))
            .col_expr(rooms::Column::LastActivity, Expr::value(room.last_activity))
            .filter(rooms::Column::Id.eq(room.room_id.as_str()))
            .filter(rooms::Column::Version.eq(expected_version))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::VersionConflict);
        }
        Ok(next)
    }

    pub async fn delete(&self, room_id: &RoomId) -> Result<bool, StoreError> {
        let result = Rooms::delete_by_id(room_id.as_str()).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn exists(&self, room_id: &RoomId) -> Result<bool, StoreError> {
        Ok(Rooms::find_by_id(room_id.as_str()).one(&self.db).await?.is_some())
    }

    /// Every room currently in the store. The sweeper and health surface
    /// iterate this; rooms whose state fails to decode are skipped with a
    /// warning rather than poisoning the scan.
    pub async fn list(&self) -> Result<Vec<(Room, i64)>, StoreError> {
        let models = Rooms::find().all(&self.db).await?;
        let mut out = Vec::with_capacity(models.len());
        for model in models {
            match serde_json::from_value::<Room>(model.state) {
                Ok(room) => out.push((room, model.version)),
                Err(err) => warn!("Skipping undecodable room {}: {}", model.id, err),
            }
        }
        Ok(out)
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        use sea_orm::PaginatorTrait;
        Ok(Rooms::find().count(&self.db).await?)
    }

    /// Load–mutate–save with retry. `mutate` must be a pure function of the
    /// room: it may run once per attempt.
    pub async fn update_room<T>(
        &self,
        room_id: &RoomId,
        mutate: impl Fn(&mut Room) -> T,
    ) -> Result<(Room, T), StoreError> {
        for attempt in 0..SAVE_RETRY_LIMIT {
            let (mut room, version) = self.load(room_id).await?;
            let out = mutate(&mut room);
            match self.save(&room, version).await {
                Ok(_) => return Ok((room, out)),
                Err(StoreError::VersionConflict) => {
                    warn!(
                        "Version conflict updating room {} (attempt {}/{})",
                        room_id,
                        attempt + 1,
                        SAVE_RETRY_LIMIT
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Err(StoreError::VersionConflict)
    }

    /// Atomic chat append with ring-trim to the most recent
    /// `CHAT_HISTORY_LIMIT` records.
    pub async fn append_chat(&self, room_id: &RoomId, entry: ChatEntry) -> Result<(), StoreError> {
        self.update_room(room_id, |room| {
            room.chat.push(entry.clone());
            if room.chat.len() > CHAT_HISTORY_LIMIT {
                let excess = room.chat.len() - CHAT_HISTORY_LIMIT;
                room.chat.drain(0..excess);
            }
            room.last_activity = Utc::now();
        })
        .await?;
        Ok(())
    }

    /// Credits a correct guess exactly once per `(session, turn)`. Returns
    /// whether the guess was newly credited; the drawer and already-credited
    /// sessions are never counted, which keeps the broadcast-before-persist
    /// fast path idempotent.
    pub async fn apply_correct_guess(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        points: i64,
    ) -> Result<bool, StoreError> {
        for _ in 0..SAVE_RETRY_LIMIT {
            let (mut room, version) = self.load(room_id).await?;

            if room.is_drawer(session_id) || room.correct_guessers.contains(session_id) {
                return Ok(false);
            }
            let Some(player) = room.player_mut(session_id) else {
                return Ok(false);
            };
            player.score += points;
            room.correct_guessers.push(session_id.clone());
            room.round_points.insert(session_id.clone(), points);
            room.last_activity = Utc::now();

            match self.save(&room, version).await {
                Ok(_) => return Ok(true),
                Err(StoreError::VersionConflict) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(StoreError::VersionConflict)
    }

    /// Bumps the activity column only; no version change, safe to
    /// fire-and-forget from hot paths.
    pub async fn touch_activity(&self, room_id: &RoomId) -> Result<(), StoreError> {
        Rooms::update_many()
            .col_expr(rooms::Column::LastActivity, Expr::value(Utc::now()))
            .filter(rooms::Column::Id.eq(room_id.as_str()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Liveness probe for the health surface.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await?;
        Ok(())
    }
}
