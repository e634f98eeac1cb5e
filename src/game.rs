//! The boundary to the game client library. Protocol handling, physics and
//! pathfinding all live on the other side of these traits.

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::nav_structs::{MoveGoal, ServerAddress, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// The bot entered (or re-entered) the world.
    Spawn,
    /// Position sampled once per client tick.
    Position(Vec3),
    Chat {
        sender: Option<String>,
        message: String,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("could not join {server}: {reason}")]
    Join {
        server: ServerAddress,
        reason: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MoveError {
    #[error("no path to {0}")]
    NoPath(MoveGoal),
    #[error("movement to {goal} timed out after {millis}ms")]
    Timeout { goal: MoveGoal, millis: u64 },
    #[error("movement interrupted: {0}")]
    Interrupted(String),
}

pub type EventReceiver = mpsc::UnboundedReceiver<GameEvent>;

/// One live connection to a server.
pub trait GameSession: Send + Sync + 'static {
    fn position(&self) -> Vec3;

    /// Resolves once the bot stands at `goal`, or with the reason it can't.
    fn goto(&self, goal: MoveGoal) -> impl Future<Output = Result<(), MoveError>> + Send;

    /// Drop whatever path is being followed.
    fn stop(&self);

    fn chat(&self, message: &str);

    fn disconnect(&self);
}

pub trait GameConnector: Send + Sync + 'static {
    type Session: GameSession;

    fn connect(
        &self,
        server: &ServerAddress,
        username: &str,
    ) -> impl Future<Output = Result<(Self::Session, EventReceiver), ConnectError>> + Send;
}
