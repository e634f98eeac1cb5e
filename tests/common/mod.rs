#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use wander_bot::game::{ConnectError, EventReceiver, GameConnector, GameEvent, GameSession, MoveError};
use wander_bot::nav_structs::{MoveGoal, ServerAddress, Vec3};
use wander_bot::status::StatusReceiver;
use wander_bot::{BotConfig, BotStatus};

#[derive(Default)]
struct WorldState {
    connects: Vec<(ServerAddress, String)>,
    fail_connects: u32,
    hang_connects: u32,
    position: Vec3,
    goals: Vec<MoveGoal>,
    stops: u32,
    chats: Vec<String>,
    disconnects: u32,
    events: Option<mpsc::UnboundedSender<GameEvent>>,
}

/// A pretend server: connections always land in the same world, and moves
/// take half a second of (paused) tokio time.
#[derive(Clone, Default)]
pub struct FakeWorld {
    state: Arc<Mutex<WorldState>>,
}

impl FakeWorld {
    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            world: self.clone(),
        }
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().unwrap().fail_connects = count;
    }

    /// The next `count` connection attempts never finish.
    pub fn hang_next_connects(&self, count: u32) {
        self.state.lock().unwrap().hang_connects = count;
    }

    pub fn set_position(&self, position: Vec3) {
        self.state.lock().unwrap().position = position;
    }

    pub fn connects(&self) -> Vec<(ServerAddress, String)> {
        self.state.lock().unwrap().connects.clone()
    }

    pub fn goals(&self) -> Vec<MoveGoal> {
        self.state.lock().unwrap().goals.clone()
    }

    pub fn stops(&self) -> u32 {
        self.state.lock().unwrap().stops
    }

    pub fn chats(&self) -> Vec<String> {
        self.state.lock().unwrap().chats.clone()
    }

    pub fn disconnects(&self) -> u32 {
        self.state.lock().unwrap().disconnects
    }

    /// Pushes an event into the current session, if there is one.
    pub fn send(&self, event: GameEvent) {
        let state = self.state.lock().unwrap();
        let events = state.events.as_ref().expect("no live session");
        events.send(event).expect("controller dropped the session");
    }

    /// Moves the bot without walking and reports the new position.
    pub fn teleport(&self, position: Vec3) {
        self.set_position(position);
        self.send(GameEvent::Position(position));
    }

    pub async fn wait_for_connects(&self, count: usize) {
        within(Duration::from_secs(300), async {
            while self.connects().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
    }

    pub async fn wait_for_goals(&self, count: usize) {
        within(Duration::from_secs(300), async {
            while self.goals().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
    }
}

pub struct FakeConnector {
    world: FakeWorld,
}

pub struct FakeSession {
    world: FakeWorld,
}

impl GameConnector for FakeConnector {
    type Session = FakeSession;

    async fn connect(
        &self,
        server: &ServerAddress,
        username: &str,
    ) -> Result<(FakeSession, EventReceiver), ConnectError> {
        let hang = {
            let mut state = self.world.state.lock().unwrap();
            state.connects.push((server.clone(), username.to_string()));
            let hang = state.hang_connects > 0;
            state.hang_connects = state.hang_connects.saturating_sub(1);
            hang
        };
        if hang {
            std::future::pending::<()>().await;
        }
        let mut state = self.world.state.lock().unwrap();
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(ConnectError::Join {
                server: server.clone(),
                reason: "connection refused".to_string(),
            });
        }
        let (events, receiver) = mpsc::unbounded_channel();
        state.events = Some(events);
        Ok((
            FakeSession {
                world: self.world.clone(),
            },
            receiver,
        ))
    }
}

impl GameSession for FakeSession {
    fn position(&self) -> Vec3 {
        self.world.state.lock().unwrap().position
    }

    async fn goto(&self, goal: MoveGoal) -> Result<(), MoveError> {
        self.world.state.lock().unwrap().goals.push(goal);
        tokio::time::sleep(Duration::from_millis(500)).await;
        let mut state = self.world.state.lock().unwrap();
        match goal {
            MoveGoal::Block(block) => {
                state.position = Vec3::new(
                    block.x as f64 + 0.5,
                    block.y as f64,
                    block.z as f64 + 0.5,
                )
            }
            MoveGoal::Column { x, z } => {
                state.position.x = x as f64 + 0.5;
                state.position.z = z as f64 + 0.5;
            }
        }
        Ok(())
    }

    fn stop(&self) {
        self.world.state.lock().unwrap().stops += 1;
    }

    fn chat(&self, message: &str) {
        self.world
            .state
            .lock()
            .unwrap()
            .chats
            .push(message.to_string());
    }

    fn disconnect(&self) {
        let mut state = self.world.state.lock().unwrap();
        state.disconnects += 1;
        state.events = None;
    }
}

pub fn test_config() -> BotConfig {
    BotConfig {
        username: "Patroller".to_string(),
        radius: 16.0,
        wait_min_ms: 200,
        wait_max_ms: 400,
        move_timeout_ms: 10_000,
        retry_delay_ms: 1_000,
        reconnect_delay_ms: 1_000,
        max_reconnect_delay_ms: 4_000,
        seed: Some(42),
        ..BotConfig::default()
    }
}

pub async fn within<F: std::future::Future>(limit: Duration, fut: F) -> F::Output {
    tokio::time::timeout(limit, fut)
        .await
        .expect("condition not reached in time")
}

pub async fn wait_status(
    status: &mut StatusReceiver,
    predicate: impl FnMut(&BotStatus) -> bool,
) -> BotStatus {
    within(Duration::from_secs(300), async {
        status
            .wait_for(predicate)
            .await
            .expect("controller stopped")
            .clone()
    })
    .await
}

static NEXT_DIR: AtomicU32 = AtomicU32::new(0);

pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "wander_bot_{tag}_{}_{}",
        std::process::id(),
        NEXT_DIR.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
