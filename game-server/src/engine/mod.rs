use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use game_core::rooms::{
    advance_rotation, apply_settings, begin_choosing, begin_drawing, begin_game, finish_game,
    finish_turn, join, mark_disconnected, new_player, new_room, rebind_session, remove_player,
    time_left,
};
use game_core::{GuessOutcome, ScoringEngine, WordBank, due_reveals, mask_word, pick_hidden_index};
use game_persistence::{RoomStore, StoreError};
use game_types::{
    ChatEntry, GameSnapshot, MIN_PLAYERS_TO_START, RejectReason, Room, RoomId, RoomPhase,
    RoomSettings, ServerMessage, SessionId,
};

use crate::gateway::{Gateway, SocketId};

/// Bounded window for the drawer to pick among the offered words.
pub const CHOOSE_SECONDS: u32 = 8;
/// Pause between turns while results are on screen.
pub const INTERMISSION_SECONDS: u64 = 5;
pub const TICK_MILLIS: u64 = 1000;
/// A disconnected player keeps their seat this long before being dropped
/// from the roster.
pub const DISCONNECT_GRACE_SECONDS: u64 = 60;
/// Upper bound on the stored stroke snapshot.
pub const DRAWING_SNAPSHOT_LIMIT: usize = 10_000;

const ROOM_ID_ATTEMPTS: usize = 5;

/// The authoritative per-room turn engine. Owns every process-level keyed
/// map: per-room transition locks, tick/choose/intermission timer handles,
/// end-turn flags, pending word candidates, and disconnect-grace timers.
pub struct Engine {
    store: Arc<RoomStore>,
    gateway: Arc<Gateway>,
    words: WordBank,
    locks: DashMap<String, Arc<Mutex<()>>>,
    tickers: DashMap<String, JoinHandle<()>>,
    choose_timers: DashMap<String, JoinHandle<()>>,
    intermissions: DashMap<String, JoinHandle<()>>,
    removal_timers: DashMap<String, JoinHandle<()>>,
    /// End-turn-in-progress flags; re-entrant end attempts are dropped.
    ending: DashMap<String, ()>,
    /// Word candidates offered to the current drawer, per room.
    pending_words: DashMap<String, Vec<String>>,
    started_at: Instant,
}

impl Engine {
    pub fn new(store: Arc<RoomStore>, gateway: Arc<Gateway>, words: WordBank) -> Self {
        Self {
            store,
            gateway,
            words,
            locks: DashMap::new(),
            tickers: DashMap::new(),
            choose_timers: DashMap::new(),
            intermissions: DashMap::new(),
            removal_timers: DashMap::new(),
            ending: DashMap::new(),
            pending_words: DashMap::new(),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    fn key(room_id: &RoomId) -> String {
        room_id.as_str().to_string()
    }

    fn removal_key(room_id: &RoomId, session_id: &SessionId) -> String {
        format!("{}:{}", room_id, session_id)
    }

    fn lock_for(&self, room_id: &RoomId) -> Arc<Mutex<()>> {
        self.locks
            .entry(Self::key(room_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn map_store_err(err: StoreError) -> String {
        match err {
            StoreError::NotFound => RejectReason::RoomNotFound.message(),
            other => {
                error!("Store failure: {}", other);
                "Internal server error".to_string()
            }
        }
    }

    // ---- room membership -------------------------------------------------

    pub async fn create_room(
        self: &Arc<Self>,
        socket_id: SocketId,
        name: String,
        avatar: [u8; 4],
        session_id: Option<SessionId>,
    ) -> Result<(), String> {
        let session_id = session_id.unwrap_or_else(SessionId::generate);
        let now = Utc::now();

        let mut room = new_room(RoomId::generate(), RoomSettings::default(), now);
        for _ in 0..ROOM_ID_ATTEMPTS {
            match self.store.exists(&room.room_id).await {
                Ok(false) => break,
                Ok(true) => room.room_id = RoomId::generate(),
                Err(err) => return Err(Self::map_store_err(err)),
            }
        }

        let player = new_player(
            session_id.clone(),
            socket_id.to_string(),
            name,
            avatar,
            now,
        );
        join(&mut room, player, now).map_err(|r| r.message())?;

        self.store.create(&room).await.map_err(Self::map_store_err)?;
        self.gateway
            .bind(socket_id, session_id.clone(), room.room_id.clone())
            .await;

        info!("Room {} created by session {}", room.room_id, session_id);
        let _ = self
            .gateway
            .send(
                socket_id,
                ServerMessage::RoomCreated {
                    room_id: room.room_id.clone(),
                    session_id,
                    players: room.player_views(),
                    settings: room.settings(),
                },
            )
            .await;
        Ok(())
    }

    pub async fn join_room(
        self: &Arc<Self>,
        socket_id: SocketId,
        room_id: &RoomId,
        name: String,
        avatar: [u8; 4],
        session_id: Option<SessionId>,
    ) -> Result<(), String> {
        let session_id = session_id.unwrap_or_else(SessionId::generate);
        let now = Utc::now();
        let player = new_player(
            session_id.clone(),
            socket_id.to_string(),
            name,
            avatar,
            now,
        );

        let (room, joined) = self
            .store
            .update_room(room_id, |r| join(r, player.clone(), now))
            .await
            .map_err(Self::map_store_err)?;
        joined.map_err(|r| r.message())?;

        self.cancel_removal(room_id, &session_id);
        self.gateway
            .bind(socket_id, session_id.clone(), room_id.clone())
            .await;

        let game_state = room
            .game_started
            .then(|| self.snapshot_for(&room, &session_id));
        let _ = self
            .gateway
            .send(
                socket_id,
                ServerMessage::RoomJoined {
                    room_id: room.room_id.clone(),
                    session_id: session_id.clone(),
                    players: room.player_views(),
                    settings: room.settings(),
                    game_state,
                },
            )
            .await;
        self.gateway
            .broadcast_except(
                &room,
                &session_id,
                ServerMessage::PlayerJoined {
                    players: room.player_views(),
                },
            )
            .await;
        info!("Session {} joined room {}", session_id, room_id);
        Ok(())
    }

    /// Idempotent re-bind of a durable session to a fresh transport; replays
    /// the full running state to the caller.
    pub async fn reconnect(
        self: &Arc<Self>,
        socket_id: SocketId,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<(), String> {
        let (check, _) = self
            .store
            .load(room_id)
            .await
            .map_err(Self::map_store_err)?;
        if check.player(session_id).is_none() {
            return Err(RejectReason::SessionUnknown.message());
        }

        self.cancel_removal(room_id, session_id);

        let socket = socket_id.to_string();
        let now = Utc::now();
        let (room, _) = self
            .store
            .update_room(room_id, |r| {
                rebind_session(r, session_id, socket.clone(), now)
            })
            .await
            .map_err(Self::map_store_err)?;

        self.gateway
            .bind(socket_id, session_id.clone(), room_id.clone())
            .await;

        let _ = self
            .gateway
            .send(
                socket_id,
                ServerMessage::ReconnectionSuccess {
                    game_state: self.snapshot_for(&room, session_id),
                },
            )
            .await;
        self.gateway
            .broadcast_except(
                &room,
                session_id,
                ServerMessage::PlayerReconnected {
                    session_id: session_id.clone(),
                    players: room.player_views(),
                },
            )
            .await;
        info!("Session {} reconnected to room {}", session_id, room_id);
        Ok(())
    }

    pub async fn disconnect(self: &Arc<Self>, room_id: &RoomId, session_id: &SessionId) {
        let now = Utc::now();
        let result = self
            .store
            .update_room(room_id, |r| mark_disconnected(r, session_id, now))
            .await;

        match result {
            Ok((room, true)) => {
                self.gateway
                    .broadcast(
                        &room,
                        ServerMessage::PlayerDisconnected {
                            session_id: session_id.clone(),
                            players: room.player_views(),
                        },
                    )
                    .await;
                info!("Session {} disconnected from room {}", session_id, room_id);
                self.schedule_removal(room_id, session_id);
            }
            Ok((_, false)) => {}
            Err(StoreError::NotFound) => {}
            Err(err) => warn!("Failed to record disconnect in room {}: {}", room_id, err),
        }
    }

    fn schedule_removal(self: &Arc<Self>, room_id: &RoomId, session_id: &SessionId) {
        let engine = Arc::clone(self);
        let rid = room_id.clone();
        let sid = session_id.clone();
        let key = Self::removal_key(room_id, session_id);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(DISCONNECT_GRACE_SECONDS)).await;
            engine
                .removal_timers
                .remove(&Self::removal_key(&rid, &sid));
            engine.prune_disconnected(&rid, &sid).await;
        });
        if let Some(old) = self.removal_timers.insert(key, handle) {
            old.abort();
        }
    }

    fn cancel_removal(&self, room_id: &RoomId, session_id: &SessionId) {
        if let Some((_, handle)) = self
            .removal_timers
            .remove(&Self::removal_key(room_id, session_id))
        {
            handle.abort();
        }
    }

    /// Drops a player whose disconnect grace expired; re-indexes rotation,
    /// announces a host shift, and winds the game down when too few remain.
    async fn prune_disconnected(self: &Arc<Self>, room_id: &RoomId, session_id: &SessionId) {
        let mut end_turn_needed = false;
        {
            let lock = self.lock_for(room_id);
            let _guard = lock.lock().await;

            let (room, _) = match self.store.load(room_id).await {
                Ok(v) => v,
                Err(StoreError::NotFound) => return,
                Err(err) => {
                    warn!("Prune load failed for room {}: {}", room_id, err);
                    return;
                }
            };
            match room.player(session_id) {
                Some(p) if !p.is_connected => {}
                _ => return,
            }

            let (room, outcome) = match self
                .store
                .update_room(room_id, |r| remove_player(r, session_id))
                .await
            {
                Ok(v) => v,
                Err(err) => {
                    warn!("Prune update failed for room {}: {}", room_id, err);
                    return;
                }
            };
            if !outcome.removed {
                return;
            }
            info!("Removed session {} from room {}", session_id, room_id);

            if room.players.is_empty() {
                drop(_guard);
                self.delete_room(room_id).await;
                return;
            }

            self.gateway
                .broadcast(
                    &room,
                    ServerMessage::PlayerDisconnected {
                        session_id: session_id.clone(),
                        players: room.player_views(),
                    },
                )
                .await;
            if outcome.host_changed {
                self.gateway
                    .broadcast(
                        &room,
                        ServerMessage::HostChanged {
                            players: room.player_views(),
                        },
                    )
                    .await;
            }

            if room.game_started {
                if room.players.len() < MIN_PLAYERS_TO_START {
                    self.finish_game_locked(room_id).await;
                } else if outcome.was_drawer
                    && matches!(room.phase, RoomPhase::Choosing | RoomPhase::Drawing)
                {
                    end_turn_needed = true;
                }
            }
        }
        if end_turn_needed {
            self.end_turn(room_id).await;
        }
    }

    // ---- lobby operations ------------------------------------------------

    pub async fn update_settings(
        self: &Arc<Self>,
        room_id: &RoomId,
        session_id: &SessionId,
        settings: RoomSettings,
    ) -> Result<(), String> {
        let (room, _) = self
            .store
            .load(room_id)
            .await
            .map_err(Self::map_store_err)?;
        if !room.is_host(session_id) {
            return Err(RejectReason::NotHost.message());
        }
        if room.game_started {
            return Err(RejectReason::GameAlreadyStarted.message());
        }

        let now = Utc::now();
        let (room, _) = self
            .store
            .update_room(room_id, |r| apply_settings(r, settings.clone(), now))
            .await
            .map_err(Self::map_store_err)?;

        self.gateway
            .broadcast(
                &room,
                ServerMessage::SettingsUpdated {
                    settings: room.settings(),
                },
            )
            .await;
        Ok(())
    }

    pub async fn start_game(
        self: &Arc<Self>,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<(), String> {
        {
            let lock = self.lock_for(room_id);
            let _guard = lock.lock().await;

            let (room, _) = self
                .store
                .load(room_id)
                .await
                .map_err(Self::map_store_err)?;
            if !room.is_host(session_id) {
                return Err(RejectReason::NotHost.message());
            }
            if room.game_started {
                return Err(RejectReason::GameAlreadyStarted.message());
            }
            if room.players.len() < MIN_PLAYERS_TO_START {
                return Err(RejectReason::NeedMorePlayers.message());
            }

            let now = Utc::now();
            let (room, _) = self
                .store
                .update_room(room_id, |r| begin_game(r, now))
                .await
                .map_err(Self::map_store_err)?;

            info!("Game started in room {}", room_id);
            self.gateway
                .broadcast(
                    &room,
                    ServerMessage::GameStarted {
                        players: room.player_views(),
                        round: room.round,
                        max_rounds: room.max_rounds,
                    },
                )
                .await;
        }
        self.start_turn(room_id).await;
        Ok(())
    }

    // ---- turn progression ------------------------------------------------

    /// Enters CHOOSING for the current drawer: offers word candidates and
    /// arms the auto-pick timeout.
    async fn start_turn(self: &Arc<Self>, room_id: &RoomId) {
        let lock = self.lock_for(room_id);
        let _guard = lock.lock().await;

        let (room, _) = match self.store.load(room_id).await {
            Ok(v) => v,
            Err(StoreError::NotFound) => {
                self.clear_room_tasks(room_id);
                return;
            }
            Err(err) => {
                error!("Failed to load room {} for new turn: {}", room_id, err);
                return;
            }
        };
        if !room.game_started {
            return;
        }
        if room.players.len() < MIN_PLAYERS_TO_START {
            self.finish_game_locked(room_id).await;
            return;
        }

        let now = Utc::now();
        let (room, _) = match self
            .store
            .update_room(room_id, |r| begin_choosing(r, now))
            .await
        {
            Ok(v) => v,
            Err(err) => {
                error!("Failed to enter choosing in room {}: {}", room_id, err);
                return;
            }
        };

        let Some(drawer) = room.drawer() else {
            return;
        };
        let drawer_session = drawer.session_id.clone();
        let drawer_name = drawer.name.clone();

        let candidates = {
            let mut rng = rand::thread_rng();
            self.words.pick_candidates(
                room.word_count as usize,
                &room.custom_words,
                room.custom_word_probability,
                &mut rng,
            )
        };
        self.pending_words
            .insert(Self::key(room_id), candidates.clone());

        info!(
            "Room {}: drawer {} choosing among {} words (round {}/{})",
            room_id,
            drawer_name,
            candidates.len(),
            room.round,
            room.max_rounds
        );

        self.gateway
            .send_to_session(
                &room,
                &drawer_session,
                ServerMessage::SelectWord {
                    words: candidates,
                    seconds: CHOOSE_SECONDS,
                },
            )
            .await;
        self.gateway
            .broadcast_except(
                &room,
                &drawer_session,
                ServerMessage::DrawerSelecting {
                    drawer_name,
                    players: room.player_views(),
                },
            )
            .await;

        let engine = Arc::clone(self);
        let rid = room_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(CHOOSE_SECONDS as u64)).await;
            // Take ourselves out of the timer map before doing any work so
            // the drawing transition never aborts a live task.
            engine.choose_timers.remove(&Engine::key(&rid));
            engine.auto_select_word(&rid).await;
        });
        if let Some(old) = self.choose_timers.insert(Self::key(room_id), handle) {
            old.abort();
        }
    }

    /// Drawer picked a word inside the selection window.
    pub async fn word_selected(
        self: &Arc<Self>,
        room_id: &RoomId,
        session_id: &SessionId,
        word: String,
    ) -> Result<(), String> {
        let (room, _) = self
            .store
            .load(room_id)
            .await
            .map_err(Self::map_store_err)?;
        if room.phase != RoomPhase::Choosing {
            return Err(RejectReason::InvalidInput {
                reason: "No word selection is open".to_string(),
            }
            .message());
        }
        if !room.is_drawer(session_id) {
            return Err(RejectReason::NotDrawer.message());
        }
        let candidates = self
            .pending_words
            .get(&Self::key(room_id))
            .map(|c| c.clone())
            .unwrap_or_default();
        if !candidates.contains(&word) {
            return Err(RejectReason::InvalidInput {
                reason: "That word was not offered".to_string(),
            }
            .message());
        }

        if let Some((_, handle)) = self.choose_timers.remove(&Self::key(room_id)) {
            handle.abort();
        }
        self.begin_drawing_phase(room_id, word).await;
        Ok(())
    }

    /// Selection window elapsed; pick uniformly from the offered candidates.
    async fn auto_select_word(self: &Arc<Self>, room_id: &RoomId) {
        let candidates = self
            .pending_words
            .get(&Self::key(room_id))
            .map(|c| c.clone())
            .unwrap_or_default();
        if candidates.is_empty() {
            return;
        }
        let word = {
            let mut rng = rand::thread_rng();
            candidates[rng.gen_range(0..candidates.len())].clone()
        };
        self.begin_drawing_phase(room_id, word).await;
    }

    async fn begin_drawing_phase(self: &Arc<Self>, room_id: &RoomId, word: String) {
        let lock = self.lock_for(room_id);
        let _guard = lock.lock().await;

        let (room, _) = match self.store.load(room_id).await {
            Ok(v) => v,
            Err(_) => return,
        };
        // A racing auto-pick or manual pick already moved the room on.
        if room.phase != RoomPhase::Choosing || !room.game_started {
            return;
        }

        self.pending_words.remove(&Self::key(room_id));

        let now = Utc::now();
        let (room, _) = match self
            .store
            .update_room(room_id, |r| begin_drawing(r, word.clone(), now))
            .await
        {
            Ok(v) => v,
            Err(err) => {
                error!("Failed to enter drawing in room {}: {}", room_id, err);
                return;
            }
        };

        let Some(drawer) = room.drawer() else {
            return;
        };
        let drawer_session = drawer.session_id.clone();
        let tl = time_left(&room, Utc::now());

        info!("Room {}: drawing phase started", room_id);
        self.gateway
            .send_to_session(
                &room,
                &drawer_session,
                ServerMessage::YourWord { word: word.clone() },
            )
            .await;
        self.gateway
            .broadcast_except(
                &room,
                &drawer_session,
                ServerMessage::HintUpdate {
                    hint: mask_word(&word, &[]),
                    time_left: tl,
                },
            )
            .await;

        self.spawn_ticker(room_id);
    }

    fn spawn_ticker(self: &Arc<Self>, room_id: &RoomId) {
        let engine = Arc::clone(self);
        let rid = room_id.clone();
        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(TICK_MILLIS));
            // The first tick of a tokio interval fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                match engine.tick_room(&rid).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => {
                        // A failed tick is logged and swallowed; the loop
                        // must outlive any single iteration's failure.
                        warn!("Tick failed for room {}: {}", rid, err);
                    }
                }
            }
        });
        if let Some(old) = self.tickers.insert(Self::key(room_id), handle) {
            old.abort();
        }
    }

    /// One heartbeat: refresh the clock, reveal due hints, broadcast the
    /// tick, and check the end-of-turn conditions. Returns whether the loop
    /// should keep running.
    async fn tick_room(self: &Arc<Self>, room_id: &RoomId) -> anyhow::Result<bool> {
        let (room, _) = match self.store.load(room_id).await {
            Ok(v) => v,
            Err(StoreError::NotFound) => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        if room.phase != RoomPhase::Drawing {
            return Ok(false);
        }

        let now = Utc::now();
        let tl = time_left(&room, now);

        let due = due_reveals(room.draw_time, tl);
        let room = if room.revealed_letters.len() < due {
            let (updated, mask) = self
                .store
                .update_room(room_id, |r| {
                    let word = r.current_word.clone().unwrap_or_default();
                    let mut rng = rand::thread_rng();
                    while r.revealed_letters.len() < due {
                        match pick_hidden_index(&word, &r.revealed_letters, &mut rng) {
                            Some(i) => r.revealed_letters.push(i),
                            None => break,
                        }
                    }
                    mask_word(&word, &r.revealed_letters)
                })
                .await?;
            let hint = ServerMessage::HintUpdate {
                hint: mask,
                time_left: tl,
            };
            match updated.drawer().map(|d| d.session_id.clone()) {
                Some(drawer_session) => {
                    self.gateway
                        .broadcast_except(&updated, &drawer_session, hint)
                        .await
                }
                None => self.gateway.broadcast(&updated, hint).await,
            }
            updated
        } else {
            room
        };

        self.gateway
            .broadcast(&room, ServerMessage::Tick { time_left: tl })
            .await;

        let everyone_scored =
            room.eligible_guessers() > 0 && room.correct_guessers.len() >= room.eligible_guessers();
        if tl == 0 || everyone_scored {
            let engine = Arc::clone(self);
            let rid = room_id.clone();
            tokio::spawn(async move {
                engine.end_turn(&rid).await;
            });
            return Ok(false);
        }
        Ok(true)
    }

    /// Serialized end-of-turn: guarded by the per-room flag so racing ticks,
    /// guess handlers, and drawer departures collapse into one transition.
    pub async fn end_turn(self: &Arc<Self>, room_id: &RoomId) {
        if self.ending.insert(Self::key(room_id), ()).is_some() {
            return;
        }

        if let Some((_, handle)) = self.tickers.remove(&Self::key(room_id)) {
            handle.abort();
        }
        if let Some((_, handle)) = self.choose_timers.remove(&Self::key(room_id)) {
            handle.abort();
        }
        self.pending_words.remove(&Self::key(room_id));

        let lock = self.lock_for(room_id);
        let _guard = lock.lock().await;

        let (room, _) = match self.store.load(room_id).await {
            Ok(v) => v,
            Err(_) => {
                self.ending.remove(&Self::key(room_id));
                return;
            }
        };
        if !matches!(room.phase, RoomPhase::Drawing | RoomPhase::Choosing) {
            self.ending.remove(&Self::key(room_id));
            return;
        }

        let word = room.current_word.clone().unwrap_or_default();
        let correct = room.correct_guessers.clone();
        let bonus = ScoringEngine::drawer_bonus(correct.len());

        let now = Utc::now();
        let (room, _) = match self
            .store
            .update_room(room_id, |r| finish_turn(r, bonus, now))
            .await
        {
            Ok(v) => v,
            Err(err) => {
                error!("Failed to finish turn in room {}: {}", room_id, err);
                self.ending.remove(&Self::key(room_id));
                return;
            }
        };

        info!(
            "Room {}: turn ended, word '{}', {} correct, drawer bonus {}",
            room_id,
            word,
            correct.len(),
            bonus
        );
        self.gateway
            .broadcast(
                &room,
                ServerMessage::TurnEnded {
                    word,
                    players: room.player_views(),
                    correct_guessers: correct,
                    drawer_bonus: bonus,
                },
            )
            .await;

        let engine = Arc::clone(self);
        let rid = room_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(INTERMISSION_SECONDS)).await;
            engine.intermissions.remove(&Engine::key(&rid));
            engine.advance_after_intermission(&rid).await;
        });
        if let Some(old) = self.intermissions.insert(Self::key(room_id), handle) {
            old.abort();
        }

        // Cleared only once the intermission is scheduled.
        self.ending.remove(&Self::key(room_id));
    }

    /// INTERMISSION → CHOOSING (rotating the drawer), or GAMEOVER once the
    /// post-increment round exceeds the limit.
    async fn advance_after_intermission(self: &Arc<Self>, room_id: &RoomId) {
        let game_over;
        {
            let lock = self.lock_for(room_id);
            let _guard = lock.lock().await;

            let (room, _) = match self.store.load(room_id).await {
                Ok(v) => v,
                Err(_) => return,
            };
            if !room.game_started || room.phase != RoomPhase::Intermission {
                return;
            }

            let (room, _) = match self
                .store
                .update_room(room_id, |r| advance_rotation(r))
                .await
            {
                Ok(v) => v,
                Err(err) => {
                    error!("Failed to rotate drawer in room {}: {}", room_id, err);
                    return;
                }
            };

            game_over = room.round > room.max_rounds as u32
                || room.players.len() < MIN_PLAYERS_TO_START;
            if game_over {
                self.finish_game_locked(room_id).await;
            }
        }
        if !game_over {
            self.start_turn(room_id).await;
        }
    }

    /// Terminal transition; the caller holds the room lock.
    async fn finish_game_locked(self: &Arc<Self>, room_id: &RoomId) {
        let now = Utc::now();
        let (room, _) = match self
            .store
            .update_room(room_id, |r| finish_game(r, now))
            .await
        {
            Ok(v) => v,
            Err(err) => {
                error!("Failed to finish game in room {}: {}", room_id, err);
                return;
            }
        };
        info!("Game over in room {}", room_id);
        self.gateway
            .broadcast(
                &room,
                ServerMessage::GameOver {
                    players: room.player_views(),
                },
            )
            .await;
        self.clear_room_tasks(room_id);
    }

    // ---- in-game traffic -------------------------------------------------

    pub async fn handle_guess(
        self: &Arc<Self>,
        room_id: &RoomId,
        session_id: &SessionId,
        guess: String,
    ) -> Result<(), String> {
        let (room, _) = self
            .store
            .load(room_id)
            .await
            .map_err(Self::map_store_err)?;
        let Some(player) = room.player(session_id) else {
            return Err(RejectReason::NotInRoom.message());
        };
        let name = player.name.clone();

        let now = Utc::now();
        let tl = time_left(&room, now);
        let in_drawing = room.phase == RoomPhase::Drawing;
        let is_drawer = room.is_drawer(session_id);
        let already_scored = room.correct_guessers.contains(session_id);

        if in_drawing {
            let word = room.current_word.clone().unwrap_or_default();
            match ScoringEngine::evaluate_guess(&guess, &word, tl) {
                GuessOutcome::Correct { points } if !is_drawer && !already_scored => {
                    // Broadcast before persisting; the store's conditional
                    // credit keeps a racing duplicate harmless.
                    self.gateway
                        .broadcast(
                            &room,
                            ServerMessage::CorrectGuess {
                                session_id: session_id.clone(),
                                name,
                                points,
                            },
                        )
                        .await;
                    match self
                        .store
                        .apply_correct_guess(room_id, session_id, points)
                        .await
                    {
                        Ok(true) => {
                            let done = self
                                .store
                                .load(room_id)
                                .await
                                .map(|(r, _)| {
                                    r.eligible_guessers() > 0
                                        && r.correct_guessers.len() >= r.eligible_guessers()
                                })
                                .unwrap_or(false);
                            if done {
                                self.end_turn(room_id).await;
                            }
                        }
                        Ok(false) => {}
                        Err(err) => {
                            error!(
                                "Failed to persist correct guess in room {}: {}",
                                room_id, err
                            );
                        }
                    }
                    return Ok(());
                }
                GuessOutcome::Correct { .. } => {
                    // The drawer and already-credited guessers cannot score
                    // again, and echoing the word would leak it.
                    return Ok(());
                }
                GuessOutcome::Close if !is_drawer && !already_scored => {
                    self.gateway
                        .send_to_session(&room, session_id, ServerMessage::CloseGuess)
                        .await;
                    // A close guess still lands in chat below.
                }
                _ => {}
            }
        }

        let entry = ChatEntry {
            session_id: session_id.clone(),
            name,
            msg: guess,
            ts: now,
        };
        self.gateway
            .broadcast(
                &room,
                ServerMessage::Chat {
                    message: entry.clone(),
                },
            )
            .await;
        self.persist_chat(room_id, entry);
        Ok(())
    }

    pub async fn chat(
        self: &Arc<Self>,
        room_id: &RoomId,
        session_id: &SessionId,
        msg: String,
    ) -> Result<(), String> {
        let (room, _) = self
            .store
            .load(room_id)
            .await
            .map_err(Self::map_store_err)?;
        let Some(player) = room.player(session_id) else {
            return Err(RejectReason::NotInRoom.message());
        };

        let entry = ChatEntry {
            session_id: session_id.clone(),
            name: player.name.clone(),
            msg,
            ts: Utc::now(),
        };
        self.gateway
            .broadcast(
                &room,
                ServerMessage::Chat {
                    message: entry.clone(),
                },
            )
            .await;
        self.persist_chat(room_id, entry);
        Ok(())
    }

    fn persist_chat(&self, room_id: &RoomId, entry: ChatEntry) {
        // Fire-and-forget: chat latency never waits on the store.
        let store = Arc::clone(&self.store);
        let rid = room_id.clone();
        tokio::spawn(async move {
            if let Err(err) = store.append_chat(&rid, entry).await {
                warn!("Failed to persist chat in room {}: {}", rid, err);
            }
        });
    }

    pub async fn draw(
        self: &Arc<Self>,
        room_id: &RoomId,
        session_id: &SessionId,
        lines: Vec<serde_json::Value>,
    ) -> Result<(), String> {
        let (room, _) = self
            .store
            .load(room_id)
            .await
            .map_err(Self::map_store_err)?;
        if room.player(session_id).is_none() {
            return Err(RejectReason::NotInRoom.message());
        }

        self.gateway
            .broadcast_except(&room, session_id, ServerMessage::Draw {
                lines: lines.clone(),
            })
            .await;

        // Fire-and-forget snapshot update for late joiners and reconnects.
        let store = Arc::clone(&self.store);
        let rid = room_id.clone();
        tokio::spawn(async move {
            let result = store
                .update_room(&rid, |r| {
                    r.current_drawing.extend(lines.iter().cloned());
                    if r.current_drawing.len() > DRAWING_SNAPSHOT_LIMIT {
                        let excess = r.current_drawing.len() - DRAWING_SNAPSHOT_LIMIT;
                        r.current_drawing.drain(0..excess);
                    }
                    r.last_activity = Utc::now();
                })
                .await;
            if let Err(err) = result {
                warn!("Failed to persist drawing in room {}: {}", rid, err);
            }
        });
        Ok(())
    }

    pub async fn clear_canvas(
        self: &Arc<Self>,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<(), String> {
        let (check, _) = self
            .store
            .load(room_id)
            .await
            .map_err(Self::map_store_err)?;
        if check.player(session_id).is_none() {
            return Err(RejectReason::NotInRoom.message());
        }

        let (room, _) = self
            .store
            .update_room(room_id, |r| {
                r.current_drawing.clear();
                r.last_activity = Utc::now();
            })
            .await
            .map_err(Self::map_store_err)?;

        self.gateway
            .broadcast_except(&room, session_id, ServerMessage::ClearCanvas)
            .await;
        Ok(())
    }

    // ---- teardown --------------------------------------------------------

    /// Deletes the room and tears down every timer, flag, and binding that
    /// referenced it.
    pub async fn delete_room(self: &Arc<Self>, room_id: &RoomId) {
        match self.store.delete(room_id).await {
            Ok(true) => info!("Deleted room {}", room_id),
            Ok(false) => {}
            Err(err) => warn!("Failed to delete room {}: {}", room_id, err),
        }
        self.clear_room_tasks(room_id);
        self.gateway.remove_room_bindings(room_id).await;
        self.locks.remove(&Self::key(room_id));
    }

    fn clear_room_tasks(&self, room_id: &RoomId) {
        let key = Self::key(room_id);
        for map in [&self.tickers, &self.choose_timers, &self.intermissions] {
            if let Some((_, handle)) = map.remove(&key) {
                handle.abort();
            }
        }
        let prefix = format!("{}:", room_id);
        let stale: Vec<String> = self
            .removal_timers
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| e.key().clone())
            .collect();
        for k in stale {
            if let Some((_, handle)) = self.removal_timers.remove(&k) {
                handle.abort();
            }
        }
        self.ending.remove(&key);
        self.pending_words.remove(&key);
    }

    // Test helper methods
    pub fn offered_words(&self, room_id: &RoomId) -> Option<Vec<String>> {
        self.pending_words.get(&Self::key(room_id)).map(|w| w.clone())
    }

    // ---- snapshots -------------------------------------------------------

    fn snapshot_for(&self, room: &Room, session_id: &SessionId) -> GameSnapshot {
        let now = Utc::now();
        let is_drawer = room.is_drawer(session_id);
        let word_hint = match (&room.current_word, is_drawer) {
            (Some(word), false) => Some(mask_word(word, &room.revealed_letters)),
            _ => None,
        };
        GameSnapshot {
            room_id: room.room_id.clone(),
            phase: room.phase,
            game_started: room.game_started,
            players: room.player_views(),
            round: room.round,
            max_rounds: room.max_rounds,
            time_left: time_left(room, now),
            word_hint,
            your_word: if is_drawer {
                room.current_word.clone()
            } else {
                None
            },
            current_drawing: room.current_drawing.clone(),
            chat: room.chat.clone(),
            settings: room.settings(),
        }
    }
}
