//! `GameConnector` backed by azalea and its pathfinder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use azalea::pathfinder::goals::{BlockPosGoal, XZGoal};
use azalea::pathfinder::PathfinderClientExt;
use azalea::{Account, Client, Event};
use tokio::sync::mpsc;
use tracing::debug;

use crate::game::{ConnectError, EventReceiver, GameConnector, GameEvent, GameSession, MoveError};
use crate::nav_structs::{horizontal_distance, MoveGoal, ServerAddress, Vec3};

/// How often a running `goto` checks whether the bot has arrived.
const ARRIVAL_POLL: Duration = Duration::from_millis(250);
/// Close enough to a block goal's center to count as standing in it.
const ARRIVAL_SLACK: f64 = 0.75;

#[derive(Debug, Default, Clone, Copy)]
pub struct AzaleaConnector;

pub struct AzaleaSession {
    client: Client,
    connected: Arc<AtomicBool>,
}

fn position_of(client: &Client) -> Vec3 {
    let pos = client.position();
    Vec3::new(pos.x, pos.y, pos.z)
}

fn arrived(position: Vec3, goal: MoveGoal) -> bool {
    match goal {
        MoveGoal::Block(block) => {
            let target = Vec3::new(
                block.x as f64 + 0.5,
                block.y as f64,
                block.z as f64 + 0.5,
            );
            position.block().y == block.y && horizontal_distance(position, target) <= ARRIVAL_SLACK
        }
        MoveGoal::Column { x, z } => {
            let block = position.block();
            block.x == x && block.z == z
        }
    }
}

/// `None` while a move is still under way.
fn goto_progress(connected: bool, position: Vec3, goal: MoveGoal) -> Option<Result<(), MoveError>> {
    if !connected {
        return Some(Err(MoveError::Interrupted(format!(
            "connection lost on the way to {goal}"
        ))));
    }
    arrived(position, goal).then_some(Ok(()))
}

impl GameSession for AzaleaSession {
    fn position(&self) -> Vec3 {
        position_of(&self.client)
    }

    async fn goto(&self, goal: MoveGoal) -> Result<(), MoveError> {
        match goal {
            MoveGoal::Block(block) => self.client.start_goto(BlockPosGoal(azalea::BlockPos::new(
                block.x, block.y, block.z,
            ))),
            MoveGoal::Column { x, z } => self.client.start_goto(XZGoal { x, z }),
        }
        let mut ticker = tokio::time::interval(ARRIVAL_POLL);
        loop {
            ticker.tick().await;
            let connected = self.connected.load(Ordering::Acquire);
            if let Some(outcome) = goto_progress(connected, position_of(&self.client), goal) {
                return outcome;
            }
        }
    }

    fn stop(&self) {
        self.client.stop_pathfinding();
    }

    fn chat(&self, message: &str) {
        self.client.chat(message);
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.client.disconnect();
    }
}

impl GameConnector for AzaleaConnector {
    type Session = AzaleaSession;

    async fn connect(
        &self,
        server: &ServerAddress,
        username: &str,
    ) -> Result<(AzaleaSession, EventReceiver), ConnectError> {
        let account = Account::offline(username);
        let address = server.to_string();
        let (client, mut incoming) = Client::join(&account, address.as_str())
            .await
            .map_err(|err| ConnectError::Join {
                server: server.clone(),
                reason: err.to_string(),
            })?;

        let (events, receiver) = mpsc::unbounded_channel();
        let tick_client = client.clone();
        let connected = Arc::new(AtomicBool::new(true));
        let stream_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(event) = incoming.recv().await {
                let event = match event {
                    Event::Spawn => GameEvent::Spawn,
                    Event::Tick => GameEvent::Position(position_of(&tick_client)),
                    Event::Chat(packet) => GameEvent::Chat {
                        sender: packet.sender(),
                        message: packet.content(),
                    },
                    Event::Disconnect(reason) => {
                        stream_connected.store(false, Ordering::Release);
                        GameEvent::Disconnected {
                        reason: reason
                            .map(|text| text.to_string())
                            .unwrap_or_else(|| "disconnected by server".to_string()),
                        }
                    }
                    _ => continue,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            stream_connected.store(false, Ordering::Release);
            debug!("azalea event stream ended");
        });

        Ok((AzaleaSession { client, connected }, receiver))
    }
}
