//! Typed message protocol exchanged between host and clients.
//!
//! Every message is a [`NetworkMessage`]: a capture timestamp plus exactly one
//! [`MessageBody`] variant. The variant's [`MessageType`] is the discriminant
//! written on the wire, and receivers always dispatch on it with a closed
//! `match`; nothing is ever inferred from field shape.

use serde::{Deserialize, Serialize};

use crate::registry::EntityHandle;

/// Connection identifier assigned by the transport. `0` is the host.
pub type ClientId = u32;

/// Network identity minted by the [`EntityRegistry`](crate::EntityRegistry).
pub type EntityId = u32;

/// The host's own local player. Assigned at host start, never reassigned.
pub const HOST_CLIENT_ID: ClientId = 0;

/// Wire discriminant, one fixed tag per concrete message variant.
///
/// Tags are append-only: new variants get new numbers, existing numbers never
/// change meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Connection = 0,
    Disconnection = 1,
    PlayerState = 2,
    EnemyState = 3,
    GameState = 4,
    Input = 5,
    Spawn = 6,
    Damage = 7,
    Experience = 8,
    Chat = 9,
}

impl MessageType {
    pub const ALL: [MessageType; 10] = [
        MessageType::Connection,
        MessageType::Disconnection,
        MessageType::PlayerState,
        MessageType::EnemyState,
        MessageType::GameState,
        MessageType::Input,
        MessageType::Spawn,
        MessageType::Damage,
        MessageType::Experience,
        MessageType::Chat,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Resolves a wire tag. Returns `None` for tags this build does not know.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.tag() == tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeaponType {
    #[default]
    Simple,
    Spread,
    Beam,
    Burst,
    Melee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MapType {
    #[default]
    Forest,
    Desert,
    Dungeon,
    Castle,
    Graveyard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DifficultyLevel {
    Easy,
    #[default]
    Normal,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerUpType {
    Health,
    Experience,
    Speed,
    Damage,
}

/// What a [`SpawnMessage`] brings into the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpawnKind {
    Player,
    #[default]
    Enemy,
    PowerUp,
}

impl SpawnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SpawnKind::Player => "player",
            SpawnKind::Enemy => "enemy",
            SpawnKind::PowerUp => "powerup",
        }
    }
}

/// Join request (client to host) and join verdict (host to client).
///
/// `client_id` is `None` on the request; the host fills it in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectionMessage {
    pub client_id: Option<ClientId>,
    pub player_name: String,
    pub is_host: bool,
    pub accepted: bool,
    pub server_message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DisconnectionMessage {
    pub client_id: Option<ClientId>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStateMessage {
    pub client_id: ClientId,
    pub position_x: f32,
    pub position_y: f32,
    pub direction_x: f32,
    pub direction_y: f32,
    pub health: i32,
    pub speed: f32,
    pub is_dashing: bool,
    pub is_auto_targeting: bool,
    pub weapon_type: WeaponType,
    pub experience_points: i32,
    pub level: i32,
}

impl Default for PlayerStateMessage {
    fn default() -> Self {
        Self {
            client_id: HOST_CLIENT_ID,
            position_x: 0.0,
            position_y: 0.0,
            direction_x: 0.0,
            direction_y: 0.0,
            health: 100,
            speed: 200.0,
            is_dashing: false,
            is_auto_targeting: false,
            weapon_type: WeaponType::Simple,
            experience_points: 0,
            level: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyStateMessage {
    pub enemy_id: EntityId,
    pub enemy_type: String,
    pub position_x: f32,
    pub position_y: f32,
    pub health: i32,
    pub is_alive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateMessage {
    pub game_time: f32,
    pub difficulty_level: i32,
    pub map_type: MapType,
    pub difficulty: DifficultyLevel,
    pub boss_spawned: bool,
    pub boss_announced: bool,
    pub game_over: bool,
    pub game_won: bool,
}

impl Default for GameStateMessage {
    fn default() -> Self {
        Self {
            game_time: 0.0,
            difficulty_level: 1,
            map_type: MapType::Forest,
            difficulty: DifficultyLevel::Normal,
            boss_spawned: false,
            boss_announced: false,
            game_over: false,
            game_won: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InputMessage {
    pub client_id: ClientId,
    pub move_x: f32,
    pub move_y: f32,
    pub is_firing: bool,
    pub is_charging: bool,
    pub is_dashing: bool,
    pub switch_weapon: bool,
    pub toggle_auto_target: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpawnMessage {
    pub entity_type: SpawnKind,
    pub entity_id: EntityId,
    pub position_x: f32,
    pub position_y: f32,
    /// Set for enemy spawns.
    pub enemy_type: String,
    /// Set for power-up spawns.
    pub power_up_type: Option<PowerUpType>,
}

/// A hit landed by `source_id` on `target_id`. Either id may be a client id
/// or an entity id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DamageMessage {
    pub source_id: u32,
    pub target_id: u32,
    pub damage: i32,
    pub is_critical: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExperienceMessage {
    pub client_id: ClientId,
    pub experience_gained: i32,
    pub total_experience: i32,
    pub new_level: i32,
    pub is_level_up: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    pub client_id: ClientId,
    pub player_name: String,
    pub message: String,
    pub is_system_message: bool,
}

/// The closed set of message payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Connection(ConnectionMessage),
    Disconnection(DisconnectionMessage),
    PlayerState(PlayerStateMessage),
    EnemyState(EnemyStateMessage),
    GameState(GameStateMessage),
    Input(InputMessage),
    Spawn(SpawnMessage),
    Damage(DamageMessage),
    Experience(ExperienceMessage),
    Chat(ChatMessage),
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Connection(_) => MessageType::Connection,
            MessageBody::Disconnection(_) => MessageType::Disconnection,
            MessageBody::PlayerState(_) => MessageType::PlayerState,
            MessageBody::EnemyState(_) => MessageType::EnemyState,
            MessageBody::GameState(_) => MessageType::GameState,
            MessageBody::Input(_) => MessageType::Input,
            MessageBody::Spawn(_) => MessageType::Spawn,
            MessageBody::Damage(_) => MessageType::Damage,
            MessageBody::Experience(_) => MessageType::Experience,
            MessageBody::Chat(_) => MessageType::Chat,
        }
    }
}

macro_rules! impl_into_body {
    ($($payload:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$payload> for MessageBody {
                fn from(payload: $payload) -> Self {
                    MessageBody::$variant(payload)
                }
            }
        )*
    };
}

impl_into_body! {
    ConnectionMessage => Connection,
    DisconnectionMessage => Disconnection,
    PlayerStateMessage => PlayerState,
    EnemyStateMessage => EnemyState,
    GameStateMessage => GameState,
    InputMessage => Input,
    SpawnMessage => Spawn,
    DamageMessage => Damage,
    ExperienceMessage => Experience,
    ChatMessage => Chat,
}

/// A timestamped message. Immutable once built; the timestamp is captured at
/// construction and only used for display and ordering heuristics.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMessage {
    pub timestamp: u64,
    pub body: MessageBody,
}

impl NetworkMessage {
    pub fn new(body: impl Into<MessageBody>) -> Self {
        Self {
            timestamp: crate::now_millis(),
            body: body.into(),
        }
    }

    pub fn with_timestamp(timestamp: u64, body: impl Into<MessageBody>) -> Self {
        Self {
            timestamp,
            body: body.into(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }
}

/// Gameplay values for one player at the moment of capture.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub position: (f32, f32),
    pub direction: (f32, f32),
    pub health: i32,
    pub speed: f32,
    pub is_dashing: bool,
    pub is_auto_targeting: bool,
    pub weapon_type: WeaponType,
    pub experience_points: i32,
    pub level: i32,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            position: (0.0, 0.0),
            direction: (0.0, 0.0),
            health: 100,
            speed: 200.0,
            is_dashing: false,
            is_auto_targeting: false,
            weapon_type: WeaponType::Simple,
            experience_points: 0,
            level: 1,
        }
    }
}

/// One live enemy as the host's simulation sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct EnemySnapshot {
    pub handle: EntityHandle,
    pub enemy_type: String,
    pub position: (f32, f32),
    pub health: i32,
    pub alive: bool,
}

/// Global run state: clock, difficulty and outcome flags.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSnapshot {
    pub game_time: f32,
    pub difficulty_level: i32,
    pub map_type: MapType,
    pub difficulty: DifficultyLevel,
    pub boss_spawned: bool,
    pub boss_announced: bool,
    pub game_over: bool,
    pub game_won: bool,
}

impl PlayerStateMessage {
    pub fn from_snapshot(client_id: ClientId, player: &PlayerSnapshot) -> Self {
        Self {
            client_id,
            position_x: player.position.0,
            position_y: player.position.1,
            direction_x: player.direction.0,
            direction_y: player.direction.1,
            health: player.health,
            speed: player.speed,
            is_dashing: player.is_dashing,
            is_auto_targeting: player.is_auto_targeting,
            weapon_type: player.weapon_type,
            experience_points: player.experience_points,
            level: player.level,
        }
    }
}

impl EnemyStateMessage {
    pub fn from_snapshot(enemy_id: EntityId, enemy: &EnemySnapshot) -> Self {
        Self {
            enemy_id,
            enemy_type: enemy.enemy_type.clone(),
            position_x: enemy.position.0,
            position_y: enemy.position.1,
            health: enemy.health,
            is_alive: enemy.alive,
        }
    }
}

impl GameStateMessage {
    pub fn from_run(run: &RunSnapshot) -> Self {
        Self {
            game_time: run.game_time,
            difficulty_level: run.difficulty_level,
            map_type: run.map_type,
            difficulty: run.difficulty,
            boss_spawned: run.boss_spawned,
            boss_announced: run.boss_announced,
            game_over: run.game_over,
            game_won: run.game_won,
        }
    }
}
