use serde::Serialize;
use tokio::sync::watch;

use crate::config::BotConfig;
use crate::nav_structs::{MoveGoal, ServerAddress, Vec3};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    #[default]
    Disconnected,
    Connecting,
    InGame,
    Reconnecting,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PatrolPhase {
    #[default]
    Idle,
    Wandering {
        target: MoveGoal,
    },
    Waiting,
    Returning,
}

/// Everything the dashboard shows. Written by the controller and the patrol task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotStatus {
    pub state: ClientState,
    pub server: ServerAddress,
    pub username: String,
    pub position: Option<Vec3>,
    pub center: Option<Vec3>,
    pub radius: f64,
    pub wander_enabled: bool,
    pub phase: PatrolPhase,
    pub last_error: Option<String>,
    pub last_disconnect: Option<String>,
    pub reconnect_attempts: u32,
    pub teleports: u32,
}

impl BotStatus {
    pub fn from_config(config: &BotConfig) -> Self {
        BotStatus {
            state: ClientState::Disconnected,
            server: config.server.clone(),
            username: config.username.clone(),
            position: None,
            center: config.center,
            radius: config.radius,
            wander_enabled: config.wander_enabled,
            phase: PatrolPhase::Idle,
            last_error: None,
            last_disconnect: None,
            reconnect_attempts: 0,
            teleports: 0,
        }
    }

    /// One-line summary, used for the `!status` chat reply.
    pub fn summary(&self) -> String {
        let center = self
            .center
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unset".to_string());
        let wander = if self.wander_enabled { "on" } else { "off" };
        format!(
            "wander {wander}, center {center}, radius {}, teleports {}",
            self.radius, self.teleports
        )
    }
}

pub type StatusSender = watch::Sender<BotStatus>;
pub type StatusReceiver = watch::Receiver<BotStatus>;

pub fn status_channel(config: &BotConfig) -> (StatusSender, StatusReceiver) {
    watch::channel(BotStatus::from_config(config))
}
