//! Client sync loop: pushes local input and folds host state into mirrors

use crate::game::{ClientWorld, MirrorUpdate, PlayerMirrors, RemotePlayer, RunMirror};
use crate::input::InputManager;
use log::{debug, info, warn};
use shared::{
    ClientId, DamageMessage, EnemyStateMessage, GameStateMessage, MessageBody, MessageListener,
    NetworkMessage, Role, Session, SessionError, SyncRates,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// State shared between the input task and the session's listener dispatch
struct ClientCore<W> {
    session: Session,
    world: Arc<W>,
    mirrors: PlayerMirrors,
    run: RunMirror,
    input: Mutex<InputManager>,
    /// Set once the link this loop was started on has ended.
    detached: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// Keeps a joined client in step with its host
pub struct GameClient<W: ClientWorld> {
    core: Arc<ClientCore<W>>,
    rates: SyncRates,
    listener: Option<Arc<dyn MessageListener>>,
    scheduler: Option<JoinHandle<()>>,
}

impl<W: ClientWorld> GameClient<W> {
    pub fn new(session: Session, world: Arc<W>, rates: SyncRates) -> Self {
        Self {
            core: Arc::new(ClientCore::new(session, world)),
            rates,
            listener: None,
            scheduler: None,
        }
    }

    /// Registers the state listener and starts the input rate.
    ///
    /// The session must already be connected to a host.
    pub fn start(&mut self) -> Result<(), SessionError> {
        let role = self.core.session.role();
        if role != Role::Client {
            return Err(SessionError::WrongRole {
                expected: Role::Client,
                actual: role,
            });
        }
        if self.scheduler.is_some() {
            if !self.core.is_detached() {
                return Ok(());
            }
            // The previous link ended on its own and its task has already
            // been told to exit
            self.scheduler = None;
            self.release_listener();
        }

        self.core.detached.store(false, Ordering::SeqCst);
        self.core.shutdown.send_replace(false);
        let shutdown_rx = self.core.shutdown.subscribe();

        let listener: Arc<dyn MessageListener> = self.core.clone();
        self.core.session.add_listener(Arc::clone(&listener));
        self.listener = Some(listener);

        let handle = tokio::spawn(run_input_sync(
            Arc::clone(&self.core),
            self.rates,
            shutdown_rx,
        ));
        self.scheduler = Some(handle);

        info!("Game client started: input every {:?}", self.rates.input);
        Ok(())
    }

    /// Stops the input task, unregisters the listener and drops all mirrors.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.scheduler.take() {
            self.core.shutdown.send_replace(true);
            if let Err(e) = handle.await {
                warn!("Input task ended abnormally: {}", e);
            }
        }
        self.release_listener();
        self.core.mirrors.clear();
        self.core.run.clear();
        info!("Game client stopped");
    }

    fn release_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.core.session.remove_listener(&listener);
        }
    }

    /// False once stopped, or once the session's link to the host has ended.
    /// A reconnected session needs another [`GameClient::start`].
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some() && !self.core.is_detached()
    }

    pub fn session(&self) -> &Session {
        &self.core.session
    }

    pub fn remote_player_count(&self) -> usize {
        self.core.mirrors.len()
    }

    pub fn remote_players(&self) -> Vec<RemotePlayer> {
        self.core.mirrors.all()
    }

    pub fn remote_player(&self, client_id: ClientId) -> Option<RemotePlayer> {
        self.core.mirrors.get(client_id)
    }

    /// Latest global run state received from the host
    pub fn run_state(&self) -> Option<GameStateMessage> {
        self.core.run.get()
    }
}

async fn run_input_sync<W: ClientWorld>(
    core: Arc<ClientCore<W>>,
    rates: SyncRates,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut input_tick = interval(rates.input);
    input_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = input_tick.tick() => core.sync_input(),
        }
    }

    debug!("Input task exiting");
}

impl<W: ClientWorld> ClientCore<W> {
    fn new(session: Session, world: Arc<W>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            session,
            world,
            mirrors: PlayerMirrors::new(),
            run: RunMirror::new(),
            input: Mutex::new(InputManager::new()),
            detached: AtomicBool::new(false),
            shutdown,
        }
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    /// Stops the input task and drops everything mirrored from the old link.
    fn detach(&self) {
        if !self.detached.swap(true, Ordering::SeqCst) {
            info!("Host link ended; client sync stopped");
        }
        self.shutdown.send_replace(true);
        self.mirrors.clear();
        self.run.clear();
    }

    fn sync_input(&self) {
        // Nothing to send until the host has assigned us an id
        let Some(client_id) = self.session.client_id() else {
            return;
        };

        let snapshot = self.world.local_input();
        let message = self
            .input
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .sample(client_id, &snapshot);
        self.session.send(&NetworkMessage::new(message));
    }

    fn handle_enemy_state(&self, enemy: &EnemyStateMessage) {
        if !enemy.is_alive {
            if self.world.remove_enemy(enemy.enemy_id) {
                debug!("Enemy {} is dead", enemy.enemy_id);
            }
            return;
        }

        let position = (enemy.position_x, enemy.position_y);
        if !self.world.update_enemy(enemy.enemy_id, position, enemy.health) {
            debug!(
                "Unmirrored enemy {}: type={}, pos=({}, {})",
                enemy.enemy_id, enemy.enemy_type, enemy.position_x, enemy.position_y
            );
        }
    }

    fn handle_damage(&self, own_id: Option<ClientId>, damage: &DamageMessage) {
        if own_id == Some(damage.target_id) {
            self.world
                .damage_local_player(damage.damage, damage.is_critical);
        } else if !self
            .world
            .damage_enemy(damage.target_id, damage.damage, damage.is_critical)
        {
            warn!(
                "Damage from {} for unknown target {}",
                damage.source_id, damage.target_id
            );
        }
    }

    fn handle_message(&self, own_id: Option<ClientId>, message: &NetworkMessage) {
        match &message.body {
            MessageBody::PlayerState(state) => {
                match self.mirrors.apply(own_id, state, message.timestamp) {
                    MirrorUpdate::Created => info!("New remote player {}", state.client_id),
                    MirrorUpdate::Updated => debug!(
                        "Updated remote player {}: pos=({}, {})",
                        state.client_id, state.position_x, state.position_y
                    ),
                    MirrorUpdate::Ignored => {}
                }
            }
            MessageBody::EnemyState(enemy) => self.handle_enemy_state(enemy),
            MessageBody::GameState(run) => {
                debug!(
                    "Game state update: time={}, difficulty={}",
                    run.game_time, run.difficulty_level
                );
                self.run.apply(run);
            }
            MessageBody::Damage(damage) => self.handle_damage(own_id, damage),
            MessageBody::Spawn(spawn) => self.world.on_spawn(spawn),
            MessageBody::Disconnection(left) => {
                if !self.session.is_client() {
                    self.detach();
                } else if let Some(client_id) = left.client_id {
                    if self.mirrors.remove(client_id).is_some() {
                        info!("Remote player {} left: {}", client_id, left.reason);
                    }
                }
            }
            MessageBody::Connection(verdict) => {
                if verdict.accepted {
                    info!("Joined as client {:?}: {}", verdict.client_id, verdict.server_message);
                } else if !verdict.server_message.is_empty() {
                    warn!("Join refused: {}", verdict.server_message);
                }
            }
            MessageBody::Chat(chat) => info!("[chat] {}: {}", chat.player_name, chat.message),
            other => debug!("Client ignoring {:?} message", other.message_type()),
        }
    }
}

impl<W: ClientWorld> MessageListener for ClientCore<W> {
    fn on_message(&self, message: &NetworkMessage) {
        if self.is_detached() {
            return;
        }
        self.handle_message(self.session.client_id(), message);
    }
}
