//! Host sync loop: periodic state broadcast and client message relay

use crate::client_manager::ClientManager;
use crate::game::{EnemyTracker, HostWorld};
use log::{debug, info, warn};
use shared::{
    ClientId, ConnectionMessage, GameStateMessage, MessageBody, MessageListener, NetworkMessage,
    PlayerStateMessage, Role, Session, SessionError, SyncRates, HOST_CLIENT_ID,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// State shared between the scheduler task and the session's listener dispatch
struct ServerCore<W> {
    session: Session,
    world: Arc<W>,
    players: ClientManager,
    enemies: EnemyTracker,
}

/// Publishes the host's authoritative state while the session is hosting
pub struct GameServer<W: HostWorld> {
    core: Arc<ServerCore<W>>,
    rates: SyncRates,
    listener: Option<Arc<dyn MessageListener>>,
    scheduler: Option<(watch::Sender<bool>, JoinHandle<()>)>,
}

impl<W: HostWorld> GameServer<W> {
    pub fn new(session: Session, world: Arc<W>, rates: SyncRates) -> Self {
        Self {
            core: Arc::new(ServerCore {
                session,
                world,
                players: ClientManager::new(),
                enemies: EnemyTracker::new(),
            }),
            rates,
            listener: None,
            scheduler: None,
        }
    }

    /// Registers the relay listener and starts the three sync rates.
    ///
    /// The session must already be hosting.
    pub fn start(&mut self) -> Result<(), SessionError> {
        let role = self.core.session.role();
        if role != Role::Host {
            return Err(SessionError::WrongRole {
                expected: Role::Host,
                actual: role,
            });
        }
        if self.scheduler.is_some() {
            return Ok(());
        }

        let session = &self.core.session;
        self.core
            .players
            .add_player(HOST_CLIENT_ID, &session.player_name());
        for (client_id, name) in session.roster() {
            self.core.players.add_player(client_id, &name);
        }

        let listener: Arc<dyn MessageListener> = self.core.clone();
        session.add_listener(Arc::clone(&listener));
        self.listener = Some(listener);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_schedule(Arc::clone(&self.core), self.rates, shutdown_rx));
        self.scheduler = Some((shutdown_tx, handle));

        info!(
            "Game server started: players every {:?}, enemies every {:?}, game state every {:?}",
            self.rates.player, self.rates.enemy, self.rates.game_state
        );
        Ok(())
    }

    /// Stops the scheduler and unregisters the listener. No sync task runs
    /// after this returns.
    pub async fn stop(&mut self) {
        if let Some((shutdown_tx, handle)) = self.scheduler.take() {
            let _ = shutdown_tx.send(true);
            if let Err(e) = handle.await {
                warn!("Sync scheduler ended abnormally: {}", e);
            }
        }
        if let Some(listener) = self.listener.take() {
            self.core.session.remove_listener(&listener);
        }
        self.core.players.clear();
        info!("Game server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn session(&self) -> &Session {
        &self.core.session
    }

    pub fn player_count(&self) -> usize {
        self.core.players.len()
    }

    pub fn tracked_enemy_count(&self) -> usize {
        self.core.enemies.len()
    }

    pub fn player_state(&self, client_id: ClientId) -> Option<PlayerStateMessage> {
        self.core
            .players
            .snapshot()
            .into_iter()
            .find(|state| state.client_id == client_id)
    }
}

/// Drives all host-side sync rates from one task
async fn run_schedule<W: HostWorld>(
    core: Arc<ServerCore<W>>,
    rates: SyncRates,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut player_tick = interval(rates.player);
    let mut enemy_tick = interval(rates.enemy);
    let mut game_state_tick = interval(rates.game_state);
    for tick in [&mut player_tick, &mut enemy_tick, &mut game_state_tick] {
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = player_tick.tick() => core.sync_local_player(),
            _ = enemy_tick.tick() => core.sync_enemies(),
            _ = game_state_tick.tick() => core.sync_game_state(),
        }
    }

    debug!("Sync scheduler exiting");
}

impl<W: HostWorld> ServerCore<W> {
    fn local_player_state(&self) -> PlayerStateMessage {
        let state = PlayerStateMessage::from_snapshot(HOST_CLIENT_ID, &self.world.local_player());
        self.players.update_state(&state);
        state
    }

    fn sync_local_player(&self) {
        let state = self.local_player_state();
        self.session.send(&NetworkMessage::new(state));
    }

    fn sync_enemies(&self) {
        let live = self.world.live_enemies();
        let updates = self
            .enemies
            .sync(&live, |handle| self.session.entity_id_of(handle));

        for update in updates {
            self.session.send(&NetworkMessage::new(update));
        }
    }

    fn sync_game_state(&self) {
        let run = GameStateMessage::from_run(&self.world.run_state());
        self.session.send(&NetworkMessage::new(run));
    }

    /// Sends the joiner everything it would otherwise wait a full cycle for
    fn catch_up(&self, client_id: ClientId) {
        let session = &self.session;
        session.send_to(
            client_id,
            &NetworkMessage::new(GameStateMessage::from_run(&self.world.run_state())),
        );

        for enemy in self.enemies.snapshot() {
            session.send_to(client_id, &NetworkMessage::new(enemy));
        }

        self.local_player_state();
        for state in self.players.snapshot() {
            if state.client_id != client_id {
                session.send_to(client_id, &NetworkMessage::new(state));
            }
        }

        debug!("Sent catch-up snapshot to client {}", client_id);
    }

    fn handle_connection(&self, joined: &ConnectionMessage) {
        let Some(client_id) = joined.client_id else {
            warn!("Join from '{}' carried no client id", joined.player_name);
            return;
        };
        if client_id == HOST_CLIENT_ID {
            return;
        }

        self.players.add_player(client_id, &joined.player_name);
        self.catch_up(client_id);
    }

    fn handle_message(&self, message: &NetworkMessage) {
        match &message.body {
            MessageBody::Connection(joined) => self.handle_connection(joined),
            MessageBody::Disconnection(left) => {
                if let Some(client_id) = left.client_id {
                    if self.players.remove_player(client_id) {
                        self.session.send_except(client_id, message);
                    }
                }
            }
            MessageBody::PlayerState(state) => {
                if self.players.update_state(state) {
                    self.session.send_except(state.client_id, message);
                } else {
                    warn!("Player state for untracked client {}", state.client_id);
                }
            }
            MessageBody::Input(input) => {
                if self.players.contains(input.client_id) {
                    self.session.send_except(input.client_id, message);
                } else {
                    warn!("Input from untracked client {}", input.client_id);
                }
            }
            MessageBody::Chat(chat) => {
                info!("[chat] {}: {}", chat.player_name, chat.message);
                self.session.send_except(chat.client_id, message);
            }
            MessageBody::Experience(experience) => {
                debug!(
                    "Client {} reports {} total experience",
                    experience.client_id, experience.total_experience
                );
                self.session.send_except(experience.client_id, message);
            }
            MessageBody::Damage(damage) => {
                self.session.send_except(damage.source_id, message);
            }
            MessageBody::EnemyState(_) | MessageBody::Spawn(_) => {
                // Enemies and spawns are the host's to publish
                warn!("Ignoring client-sent {:?} message", message.message_type());
            }
            other => {
                debug!("Host ignoring {:?} message", other.message_type());
            }
        }
    }
}

impl<W: HostWorld> MessageListener for ServerCore<W> {
    fn on_message(&self, message: &NetworkMessage) {
        self.handle_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{EnemySnapshot, EntityHandle, NetConfig, PlayerSnapshot, RunSnapshot};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct StaticWorld {
        enemies: Mutex<Vec<EnemySnapshot>>,
    }

    impl HostWorld for StaticWorld {
        fn local_player(&self) -> PlayerSnapshot {
            PlayerSnapshot {
                position: (50.0, 60.0),
                ..PlayerSnapshot::default()
            }
        }

        fn live_enemies(&self) -> Vec<EnemySnapshot> {
            self.enemies.lock().unwrap().clone()
        }

        fn run_state(&self) -> RunSnapshot {
            RunSnapshot {
                game_time: 12.5,
                difficulty_level: 2,
                ..RunSnapshot::default()
            }
        }
    }

    fn fast_rates() -> SyncRates {
        SyncRates {
            player: Duration::from_millis(20),
            enemy: Duration::from_millis(20),
            game_state: Duration::from_millis(20),
            input: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_start_requires_host_role() {
        let session = Session::new(NetConfig::loopback());
        let mut server = GameServer::new(session, Arc::new(StaticWorld::default()), fast_rates());

        match server.start() {
            Err(SessionError::WrongRole { expected, actual }) => {
                assert_eq!(expected, Role::Host);
                assert_eq!(actual, Role::Idle);
            }
            other => panic!("Expected WrongRole, got {:?}", other),
        }
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_start_and_stop_manage_listener() {
        let session = Session::new(NetConfig::loopback());
        assert_ok!(session.start_host("Host").await);

        let mut server =
            GameServer::new(session.clone(), Arc::new(StaticWorld::default()), fast_rates());
        assert_ok!(server.start());
        assert!(server.is_running());
        assert_eq!(session.listener_count(), 1);
        assert_eq!(server.player_count(), 1);
        assert_ok!(server.start());
        assert_eq!(session.listener_count(), 1);

        // The scheduler records the host's own state as it publishes it
        tokio::time::sleep(Duration::from_millis(60)).await;
        let host_state = server.player_state(HOST_CLIENT_ID).unwrap();
        assert_eq!(host_state.position_x, 50.0);

        server.stop().await;
        assert!(!server.is_running());
        assert_eq!(session.listener_count(), 0);
        session.stop();
        assert_err!(server.start());
    }

    #[tokio::test]
    async fn test_enemy_sync_mints_registry_ids() {
        let session = Session::new(NetConfig::loopback());
        assert_ok!(session.start_host("Host").await);

        let world = Arc::new(StaticWorld::default());
        world.enemies.lock().unwrap().push(EnemySnapshot {
            handle: EntityHandle(900),
            enemy_type: "FastEnemy".to_string(),
            position: (1.0, 2.0),
            health: 20,
            alive: true,
        });

        let mut server = GameServer::new(session.clone(), Arc::clone(&world), fast_rates());
        assert_ok!(server.start());
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(server.tracked_enemy_count(), 1);
        assert!(session.registry().get(&EntityHandle(900)).is_some());

        world.enemies.lock().unwrap().clear();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(server.tracked_enemy_count(), 0);

        server.stop().await;
        session.stop();
    }

    #[test]
    fn test_relay_ignores_untracked_players() {
        let core = ServerCore {
            session: Session::new(NetConfig::loopback()),
            world: Arc::new(StaticWorld::default()),
            players: ClientManager::new(),
            enemies: EnemyTracker::new(),
        };

        core.handle_message(&NetworkMessage::new(PlayerStateMessage {
            client_id: 4,
            ..PlayerStateMessage::default()
        }));
        assert!(core.players.is_empty());

        core.handle_message(&NetworkMessage::new(ConnectionMessage {
            client_id: Some(4),
            player_name: "Dana".to_string(),
            ..ConnectionMessage::default()
        }));
        assert!(core.players.contains(4));

        core.handle_message(&NetworkMessage::new(shared::DisconnectionMessage {
            client_id: Some(4),
            reason: "Client disconnected".to_string(),
        }));
        assert!(!core.players.contains(4));
    }
}
