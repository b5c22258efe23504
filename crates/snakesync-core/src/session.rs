use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::EngineConfig;
use crate::debounce::DirectionScheduler;
use crate::game_state::GameState;
use crate::gateway::{SessionHandle, SyncGateway};
use crate::geometry::{BoardSize, Direction, EmptyBoard};
use crate::input::InputEvent;
use crate::pause::PauseTracker;
use crate::record::{RecordField, SessionFields};
use crate::reducer::{PlayState, SharedConfig, Tick, place_fruit, play};
use crate::time::unix_seconds;

/// Where the orchestrator is in the play session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for a start input.
    Idle,
    /// Processing ticks and writing to the store.
    Active,
    /// The last game finished and its record is finalized.
    Ended,
}

/// Per-player session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub player_id: String,
    pub board: BoardSize,
    pub initial_length: usize,
    pub seed: Option<u64>,
}

impl SessionConfig {
    pub fn new(player_id: impl Into<String>, board: BoardSize, engine: &EngineConfig) -> Self {
        Self {
            player_id: player_id.into(),
            board,
            initial_length: engine.initial_length,
            seed: engine.seed,
        }
    }
}

struct ActiveSession {
    handle: SessionHandle,
    state: PlayState,
    last_published: Option<PlayState>,
    finalized: bool,
}

/// Drives one player's games: start/restart, per-window reducer steps,
/// publishing to the store and finalization.
pub struct SessionOrchestrator {
    config: SessionConfig,
    gateway: Arc<dyn SyncGateway>,
    rng: StdRng,
    phase: SessionPhase,
    scheduler: DirectionScheduler,
    pause: PauseTracker,
    active: Option<ActiveSession>,
}

impl SessionOrchestrator {
    /// Fails when `config.board` has no cells.
    pub fn new(config: SessionConfig, gateway: Arc<dyn SyncGateway>) -> Result<Self, EmptyBoard> {
        if config.board.is_empty() {
            return Err(EmptyBoard(config.board));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            config,
            gateway,
            rng,
            phase: SessionPhase::Idle,
            scheduler: DirectionScheduler::new(),
            pause: PauseTracker::new(),
            active: None,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn player_id(&self) -> &str {
        &self.config.player_id
    }

    /// Local state of the current (or last) game.
    pub fn state(&self) -> Option<&PlayState> {
        self.active.as_ref().map(|a| &a.state)
    }

    pub fn session_handle(&self) -> Option<&SessionHandle> {
        self.active.as_ref().map(|a| &a.handle)
    }

    pub fn held_direction(&self) -> Option<Direction> {
        self.scheduler.held()
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// Begin a new game, finalizing the previous one first. Nothing carries over.
    pub fn start(&mut self) -> SessionHandle {
        self.end_active();

        let handle = self.gateway.create_session(&self.config.player_id);
        if let Err(e) = self
            .gateway
            .register_disconnect_fallback(&handle, SessionFields::ended())
        {
            tracing::warn!(session_id = %handle, error = %e, "Failed to register disconnect fallback");
        }

        self.scheduler = DirectionScheduler::new();
        self.pause = PauseTracker::new();

        let state = PlayState::initial(
            self.config.player_id.clone(),
            self.config.board,
            self.config.initial_length,
        );

        if self.gateway.read_fruit_position().is_none() {
            let fruit = place_fruit(self.config.board, &state.snake, &mut self.rng);
            if let Err(e) = self.gateway.set_fruit_position(fruit) {
                tracing::warn!(error = %e, "Failed to place initial fruit");
            }
        }

        tracing::info!(
            session_id = %handle,
            player_id = %self.config.player_id,
            "Session started"
        );

        self.active = Some(ActiveSession {
            handle: handle.clone(),
            state,
            last_published: None,
            finalized: false,
        });
        self.phase = SessionPhase::Active;
        handle
    }

    /// Route one input event. Returns true if it started a new game.
    pub fn handle_input(&mut self, event: InputEvent) -> bool {
        if let InputEvent::Key(code) = event
            && code.is_start()
        {
            self.start();
            return true;
        }

        if self.phase != SessionPhase::Active {
            return false;
        }

        if let InputEvent::Key(code) = event {
            self.scheduler.push_code(code);
        }
        self.pause.handle(event);
        false
    }

    /// Close the current decision window and advance the game.
    ///
    /// Returns every state that changed during this window, in order.
    pub fn tick(&mut self) -> Vec<PlayState> {
        if self.phase != SessionPhase::Active {
            return Vec::new();
        }

        let decisions = self.scheduler.close_window();
        let paused = self.pause.sample();
        let mut frames = Vec::new();

        for direction in decisions {
            let Some(active) = self.active.as_mut() else {
                break;
            };

            let tick = Tick {
                direction,
                shared: SharedConfig {
                    fruit: self.gateway.read_fruit_position(),
                    board: self.config.board,
                },
                paused,
            };
            let outcome = play(&active.state, &tick, &mut self.rng);

            if let Some(fruit) = outcome.relocated_fruit {
                tracing::debug!(
                    session_id = %active.handle,
                    x = fruit.x,
                    y = fruit.y,
                    score = outcome.state.score,
                    "Fruit eaten"
                );
                if let Err(e) = self.gateway.set_fruit_position(fruit) {
                    tracing::warn!(session_id = %active.handle, error = %e, "Failed to publish fruit");
                }
            }

            if outcome.state == active.state {
                continue;
            }
            active.state = outcome.state;
            publish(self.gateway.as_ref(), active);
            frames.push(active.state.clone());

            if active.state.state.is_terminal() {
                tracing::info!(
                    session_id = %active.handle,
                    score = active.state.score,
                    length = active.state.snake.len(),
                    "Snake collided with itself"
                );
                self.end_active();
                break;
            }
        }

        frames
    }

    /// Graceful termination of the tick stream.
    pub fn finish(&mut self) {
        self.end_active();
    }

    /// Force the current record to `ended`, at most once per game.
    fn end_active(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if !active.finalized {
            match self
                .gateway
                .set_field(&active.handle, RecordField::State(GameState::Ended))
            {
                // The record is final; keep the fallback only if the write failed.
                Ok(()) => {
                    if let Err(e) = self.gateway.cancel_disconnect_fallback(&active.handle) {
                        tracing::warn!(session_id = %active.handle, error = %e, "Failed to cancel disconnect fallback");
                    }
                },
                Err(e) => {
                    tracing::warn!(session_id = %active.handle, error = %e, "Failed to finalize session");
                },
            }
            active.finalized = true;
            tracing::info!(
                session_id = %active.handle,
                score = active.state.score,
                "Session finalized"
            );
        }
        self.phase = SessionPhase::Ended;
    }
}

/// Mirror a changed state to the store. `loaded` states and repeats are skipped.
fn publish(gateway: &dyn SyncGateway, active: &mut ActiveSession) {
    if active.state.state == GameState::Loaded
        || active.last_published.as_ref() == Some(&active.state)
    {
        return;
    }

    match SessionFields::from_state(&active.state, unix_seconds()) {
        Ok(fields) => {
            if let Err(e) = gateway.update(&active.handle, fields) {
                tracing::warn!(session_id = %active.handle, error = %e, "Session update failed");
            }
        },
        Err(e) => {
            tracing::error!(session_id = %active.handle, error = %e, "Failed to encode snake");
        },
    }
    active.last_published = Some(active.state.clone());
}
