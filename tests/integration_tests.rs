//! Integration tests for networked multiplayer components
//!
//! These tests run real hosts and clients over loopback sockets and validate
//! the sync loops end to end.

use client::console::ConsoleWorld;
use client::network::GameClient;
use server::game::HostWorld;
use server::network::GameServer;
use shared::{
    ChatMessage, DamageMessage, EnemySnapshot, ExperienceMessage, EntityHandle, MessageBody, MessageListener, MessageType,
    NetConfig, NetworkMessage, PlayerSnapshot, PlayerStateMessage, RunSnapshot, Session,
    SyncRates,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Host world whose contents tests change directly
struct ScriptedWorld {
    player: Mutex<PlayerSnapshot>,
    enemies: Mutex<Vec<EnemySnapshot>>,
    run: Mutex<RunSnapshot>,
}

impl ScriptedWorld {
    fn new() -> Self {
        Self {
            player: Mutex::new(PlayerSnapshot {
                position: (320.0, 240.0),
                ..PlayerSnapshot::default()
            }),
            enemies: Mutex::new(Vec::new()),
            run: Mutex::new(RunSnapshot {
                game_time: 42.0,
                difficulty_level: 3,
                ..RunSnapshot::default()
            }),
        }
    }

    fn add_enemy(&self, handle: u64, position: (f32, f32)) {
        self.enemies.lock().unwrap().push(EnemySnapshot {
            handle: EntityHandle(handle),
            enemy_type: "BasicEnemy".to_string(),
            position,
            health: 30,
            alive: true,
        });
    }

    fn remove_enemy(&self, handle: u64) {
        self.enemies
            .lock()
            .unwrap()
            .retain(|enemy| enemy.handle != EntityHandle(handle));
    }
}

impl HostWorld for ScriptedWorld {
    fn local_player(&self) -> PlayerSnapshot {
        self.player.lock().unwrap().clone()
    }

    fn live_enemies(&self) -> Vec<EnemySnapshot> {
        self.enemies.lock().unwrap().clone()
    }

    fn run_state(&self) -> RunSnapshot {
        self.run.lock().unwrap().clone()
    }
}

fn fast_rates() -> SyncRates {
    SyncRates {
        player: Duration::from_millis(30),
        enemy: Duration::from_millis(30),
        game_state: Duration::from_millis(30),
        input: Duration::from_millis(20),
    }
}

/// Rates slow enough that only the first, immediate tick fires during a test
fn idle_rates() -> SyncRates {
    SyncRates {
        player: Duration::from_secs(60),
        enemy: Duration::from_secs(60),
        game_state: Duration::from_secs(60),
        input: Duration::from_secs(60),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

struct Host {
    session: Session,
    world: Arc<ScriptedWorld>,
    server: GameServer<ScriptedWorld>,
}

async fn start_host(rates: SyncRates) -> Host {
    start_host_with(rates, ScriptedWorld::new()).await
}

async fn start_host_with(rates: SyncRates, world: ScriptedWorld) -> Host {
    let session = Session::new(NetConfig::loopback());
    session.start_host("Host").await.unwrap();

    let world = Arc::new(world);
    let mut server = GameServer::new(session.clone(), Arc::clone(&world), rates);
    server.start().unwrap();

    Host {
        session,
        world,
        server,
    }
}

fn config_for(host: &Session) -> NetConfig {
    NetConfig {
        tcp_port: host.local_tcp_addr().unwrap().port(),
        udp_port: host.local_udp_addr().unwrap().port(),
        discovery_port: host.local_discovery_addr().unwrap().port(),
        ..NetConfig::loopback()
    }
}

struct Joined {
    session: Session,
    world: Arc<ConsoleWorld>,
    client: GameClient<ConsoleWorld>,
}

async fn join(host: &Session, name: &str, rates: SyncRates) -> Joined {
    let session = Session::new(config_for(host));
    session.connect_to_host(LOCALHOST, name).await.unwrap();

    let world = Arc::new(ConsoleWorld::new());
    let mut client = GameClient::new(session.clone(), Arc::clone(&world), rates);
    client.start().unwrap();

    assert!(wait_until(|| session.client_id().is_some()).await);
    Joined {
        session,
        world,
        client,
    }
}

/// Everything a session's listeners received
fn record(session: &Session) -> Arc<Mutex<Vec<NetworkMessage>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: Arc<dyn MessageListener> = Arc::new(move |message: &NetworkMessage| {
        sink.lock().unwrap().push(message.clone());
    });
    session.add_listener(listener);
    seen
}

/// HOST/CLIENT SYNC TESTS
mod sync_tests {
    use super::*;

    /// A joined client mirrors the host's player, enemies and run state
    #[tokio::test]
    async fn client_mirrors_host_state() {
        let mut host = start_host(fast_rates()).await;
        host.world.add_enemy(1, (10.0, 20.0));
        host.world.add_enemy(2, (30.0, 40.0));

        let mut alice = join(&host.session, "Alice", fast_rates()).await;

        assert!(wait_until(|| alice.client.remote_player(0).is_some()).await);
        assert!(wait_until(|| alice.world.enemy_count() == 2).await);
        assert!(wait_until(|| alice.client.run_state().is_some()).await);

        let host_mirror = alice.client.remote_player(0).unwrap();
        assert_eq!(host_mirror.position, (320.0, 240.0));
        assert_eq!(alice.client.run_state().unwrap().difficulty_level, 3);

        // The host knows Alice by her assigned id
        let alice_id = alice.session.client_id().unwrap();
        assert!(wait_until(|| host
            .session
            .roster()
            .contains(&(alice_id, "Alice".to_string())))
        .await);
        assert!(wait_until(|| host.server.player_count() == 2).await);

        // Our own id is never mirrored
        assert!(alice.client.remote_player(alice_id).is_none());

        alice.client.stop().await;
        alice.session.disconnect();
        host.server.stop().await;
        host.session.stop();
    }

    /// A late joiner receives the catch-up snapshot without waiting a cycle
    #[tokio::test]
    async fn late_joiner_gets_catch_up_snapshot() {
        let world = ScriptedWorld::new();
        world.add_enemy(5, (1.0, 1.0));
        world.add_enemy(6, (2.0, 2.0));
        let mut host = start_host_with(idle_rates(), world).await;

        // The first tick fires immediately and registers both enemies; the
        // next one is a minute away
        assert!(wait_until(|| host.server.tracked_enemy_count() == 2).await);

        let mut bob = join(&host.session, "Bob", idle_rates()).await;

        assert!(wait_until(|| bob.world.enemy_count() == 2).await);
        assert!(wait_until(|| bob.client.remote_player(0).is_some()).await);
        assert_eq!(bob.client.run_state().unwrap().game_time, 42.0);

        for handle in [5, 6] {
            let id = host.session.registry().get(&EntityHandle(handle)).unwrap();
            assert!(bob.world.enemy(id).is_some());
        }

        bob.client.stop().await;
        bob.session.disconnect();
        host.server.stop().await;
        host.session.stop();
    }

    /// An enemy leaving the host's world is removed on the client
    #[tokio::test]
    async fn departed_enemy_removed_on_client() {
        let mut host = start_host(fast_rates()).await;
        host.world.add_enemy(7, (0.0, 0.0));
        host.world.add_enemy(8, (0.0, 0.0));

        let mut carol = join(&host.session, "Carol", fast_rates()).await;
        let seen = record(&carol.session);
        assert!(wait_until(|| carol.world.enemy_count() == 2).await);

        host.world.remove_enemy(7);
        let gone = host.session.registry().get(&EntityHandle(7)).unwrap();

        assert!(wait_until(|| carol.world.enemy(gone).is_none()).await);
        assert_eq!(carol.world.enemy_count(), 1);

        // Let a few more enemy cycles pass: the retired id stays dead
        sleep(Duration::from_millis(150)).await;
        let reports: Vec<bool> = seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match &m.body {
                MessageBody::EnemyState(enemy) if enemy.enemy_id == gone => Some(enemy.is_alive),
                _ => None,
            })
            .collect();
        let first_death = reports.iter().position(|alive| !alive).unwrap();
        assert_eq!(first_death, reports.len() - 1);

        carol.client.stop().await;
        carol.session.disconnect();
        host.server.stop().await;
        host.session.stop();
    }
}

/// RELAY TESTS
mod relay_tests {
    use super::*;

    /// Player state from one client reaches the other, stamped with its id
    #[tokio::test]
    async fn player_state_relayed_between_clients() {
        let mut host = start_host(fast_rates()).await;
        let mut alice = join(&host.session, "Alice", fast_rates()).await;
        let mut bob = join(&host.session, "Bob", fast_rates()).await;
        let alice_id = alice.session.client_id().unwrap();

        alice.session.send(&NetworkMessage::new(PlayerStateMessage {
            client_id: 9999,
            position_x: 77.0,
            position_y: 88.0,
            health: 64,
            ..PlayerStateMessage::default()
        }));

        assert!(wait_until(|| bob.client.remote_player(alice_id).is_some()).await);
        let mirror = bob.client.remote_player(alice_id).unwrap();
        assert_eq!(mirror.position, (77.0, 88.0));
        assert_eq!(mirror.health, 64);
        assert!(bob.client.remote_player(9999).is_none());

        // The host kept it for future joiners
        assert!(host.server.player_state(alice_id).is_some());

        // And Alice never mirrors herself
        sleep(Duration::from_millis(50)).await;
        assert!(alice.client.remote_player(alice_id).is_none());

        for joined in [&mut alice, &mut bob] {
            joined.client.stop().await;
            joined.session.disconnect();
        }
        host.server.stop().await;
        host.session.stop();
    }

    /// Input pushed by a client's sync loop is relayed to other clients
    #[tokio::test]
    async fn input_relayed_to_other_clients() {
        let mut host = start_host(fast_rates()).await;
        let mut alice = join(&host.session, "Alice", fast_rates()).await;
        let mut bob = join(&host.session, "Bob", fast_rates()).await;
        let alice_id = alice.session.client_id().unwrap();
        let seen = record(&bob.session);

        assert!(wait_until(|| {
            seen.lock().unwrap().iter().any(|m| {
                matches!(&m.body, MessageBody::Input(input) if input.client_id == alice_id)
            })
        })
        .await);

        // Normalized movement arrives intact
        let input = seen
            .lock()
            .unwrap()
            .iter()
            .find_map(|m| match &m.body {
                MessageBody::Input(input) if input.client_id == alice_id => Some(input.clone()),
                _ => None,
            })
            .unwrap();
        let length = (input.move_x * input.move_x + input.move_y * input.move_y).sqrt();
        assert!((length - 1.0).abs() < 1e-3);
        assert!(input.is_firing);

        for joined in [&mut alice, &mut bob] {
            joined.client.stop().await;
            joined.session.disconnect();
        }
        host.server.stop().await;
        host.session.stop();
    }

    /// Chat goes to every other client but not back to the sender
    #[tokio::test]
    async fn chat_relayed_to_others_only() {
        let mut host = start_host(idle_rates()).await;
        let mut alice = join(&host.session, "Alice", idle_rates()).await;
        let mut bob = join(&host.session, "Bob", idle_rates()).await;
        let alice_seen = record(&alice.session);
        let bob_seen = record(&bob.session);

        alice.session.send(&NetworkMessage::new(ChatMessage {
            player_name: "Alice".to_string(),
            message: "gg".to_string(),
            ..ChatMessage::default()
        }));

        let chats = |seen: &Arc<Mutex<Vec<NetworkMessage>>>| {
            seen.lock()
                .unwrap()
                .iter()
                .filter(|m| m.message_type() == MessageType::Chat)
                .count()
        };
        assert!(wait_until(|| chats(&bob_seen) == 1).await);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(chats(&alice_seen), 0);

        for joined in [&mut alice, &mut bob] {
            joined.client.stop().await;
            joined.session.disconnect();
        }
        host.server.stop().await;
        host.session.stop();
    }

    /// Level-ups and hits reach the other players, credited to the sender
    #[tokio::test]
    async fn experience_and_damage_relayed_to_others() {
        let mut host = start_host(idle_rates()).await;
        let mut alice = join(&host.session, "Alice", idle_rates()).await;
        let mut bob = join(&host.session, "Bob", idle_rates()).await;
        let alice_id = alice.session.client_id().unwrap();
        let alice_seen = record(&alice.session);
        let bob_seen = record(&bob.session);

        alice.session.send(&NetworkMessage::new(ExperienceMessage {
            client_id: 9999,
            experience_gained: 50,
            total_experience: 500,
            new_level: 4,
            is_level_up: true,
        }));
        alice.session.send(&NetworkMessage::new(DamageMessage {
            source_id: 9999,
            target_id: 4242,
            damage: 12,
            is_critical: false,
        }));

        assert!(wait_until(|| {
            bob_seen.lock().unwrap().iter().any(|m| {
                matches!(&m.body, MessageBody::Damage(hit) if hit.source_id == alice_id)
            })
        })
        .await);
        let experience = bob_seen
            .lock()
            .unwrap()
            .iter()
            .find_map(|m| match &m.body {
                MessageBody::Experience(experience) => Some(experience.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(experience.client_id, alice_id);
        assert_eq!(experience.new_level, 4);
        assert!(experience.is_level_up);

        // Nothing comes back to the sender
        sleep(Duration::from_millis(50)).await;
        assert!(!alice_seen.lock().unwrap().iter().any(|m| matches!(
            m.message_type(),
            MessageType::Experience | MessageType::Damage
        )));

        for joined in [&mut alice, &mut bob] {
            joined.client.stop().await;
            joined.session.disconnect();
        }
        host.server.stop().await;
        host.session.stop();
    }

    /// A departing player is dropped from the roster and from other mirrors
    #[tokio::test]
    async fn disconnect_cleans_up_everywhere() {
        let mut host = start_host(fast_rates()).await;
        let mut alice = join(&host.session, "Alice", fast_rates()).await;
        let mut bob = join(&host.session, "Bob", fast_rates()).await;
        let alice_id = alice.session.client_id().unwrap();

        alice.session.send(&NetworkMessage::new(PlayerStateMessage::default()));
        assert!(wait_until(|| bob.client.remote_player(alice_id).is_some()).await);

        alice.client.stop().await;
        alice.session.disconnect();

        assert!(wait_until(|| !host
            .session
            .roster()
            .iter()
            .any(|(id, _)| *id == alice_id))
        .await);
        assert!(wait_until(|| bob.client.remote_player(alice_id).is_none()).await);
        assert!(wait_until(|| host.server.player_count() == 2).await);

        bob.client.stop().await;
        bob.session.disconnect();
        host.server.stop().await;
        host.session.stop();
    }
}

/// LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// A client finds a host through discovery and joins it
    #[tokio::test]
    async fn discover_then_join() {
        let mut host = start_host(idle_rates()).await;

        let seeker = Session::new(config_for(&host.session));
        let found = seeker.discover().await;
        assert_eq!(found, vec![LOCALHOST]);

        seeker.connect_to_host(found[0], "Finder").await.unwrap();
        assert!(wait_until(|| seeker.client_id().is_some()).await);
        assert!(seeker.client_id() != Some(0));

        seeker.disconnect();
        host.server.stop().await;
        host.session.stop();
    }

    /// Client ids are never reused within one hosting session
    #[tokio::test]
    async fn client_ids_are_not_reused() {
        let mut host = start_host(idle_rates()).await;

        let first = Session::new(config_for(&host.session));
        first.connect_to_host(LOCALHOST, "First").await.unwrap();
        assert!(wait_until(|| first.client_id().is_some()).await);
        let first_id = first.client_id().unwrap();
        first.disconnect();

        let second = Session::new(config_for(&host.session));
        second.connect_to_host(LOCALHOST, "Second").await.unwrap();
        assert!(wait_until(|| second.client_id().is_some()).await);
        assert_ne!(second.client_id(), Some(first_id));

        second.disconnect();
        host.server.stop().await;
        host.session.stop();
    }

    /// Losing the host returns a client to idle and clears its mirrors
    #[tokio::test]
    async fn host_shutdown_resets_clients() {
        let mut host = start_host(fast_rates()).await;
        let mut alice = join(&host.session, "Alice", fast_rates()).await;
        assert!(wait_until(|| alice.client.remote_player_count() > 0).await);

        host.server.stop().await;
        host.session.stop();

        assert!(wait_until(|| !alice.session.is_connected()).await);
        assert!(wait_until(|| alice.client.remote_player_count() == 0).await);
        assert!(alice.session.client_id().is_none());

        alice.client.stop().await;
    }

    /// A stopped sync loop no longer pushes input
    #[tokio::test]
    async fn stopped_client_sends_nothing() {
        let mut host = start_host(idle_rates()).await;
        let host_seen = record(&host.session);
        let mut alice = join(&host.session, "Alice", fast_rates()).await;

        alice.client.stop().await;
        sleep(Duration::from_millis(50)).await;
        let before = host_seen
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.message_type() == MessageType::Input)
            .count();

        sleep(Duration::from_millis(150)).await;
        let after = host_seen
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.message_type() == MessageType::Input)
            .count();
        assert_eq!(before, after);

        alice.session.disconnect();
        host.server.stop().await;
        host.session.stop();
    }
}
