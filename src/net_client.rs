use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::game::{EventReceiver, GameConnector, GameEvent, GameSession};
use crate::nav_structs::{ServerAddress, Vec3};
use crate::patrol::{PatrolHandle, PatrolSettings};
use crate::status::{status_channel, BotStatus, ClientState, StatusReceiver, StatusSender};
use crate::teleport::TeleportDetector;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    #[error("the bot is not in game, so it has no position to use")]
    NotInGame,
    #[error("invalid center: {0}")]
    InvalidCenter(String),
    #[error("change applied but could not be saved: {0}")]
    Persist(String),
    #[error("bot controller is not running")]
    Closed,
}

pub type ControlReply = oneshot::Sender<Result<BotStatus, ControlError>>;

#[derive(Debug)]
pub enum ControlCommand {
    /// `None` means "wherever the bot is standing".
    SetCenter {
        center: Option<Vec3>,
        reply: ControlReply,
    },
    /// `None` flips the current setting.
    SetWandering {
        enabled: Option<bool>,
        reply: ControlReply,
    },
    SwitchServer {
        server: ServerAddress,
        reply: ControlReply,
    },
    Shutdown,
}

/// Cloneable front door to a running [`BotClient`].
#[derive(Debug, Clone)]
pub struct BotHandle {
    commands: mpsc::UnboundedSender<ControlCommand>,
    status: StatusReceiver,
}

impl BotHandle {
    pub fn status(&self) -> BotStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> StatusReceiver {
        self.status.clone()
    }

    pub async fn set_center(&self, center: Option<Vec3>) -> Result<BotStatus, ControlError> {
        self.request(|reply| ControlCommand::SetCenter { center, reply })
            .await
    }

    pub async fn set_wandering(&self, enabled: Option<bool>) -> Result<BotStatus, ControlError> {
        self.request(|reply| ControlCommand::SetWandering { enabled, reply })
            .await
    }

    pub async fn switch_server(&self, server: ServerAddress) -> Result<BotStatus, ControlError> {
        self.request(|reply| ControlCommand::SwitchServer { server, reply })
            .await
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(ControlCommand::Shutdown);
    }

    async fn request(
        &self,
        build: impl FnOnce(ControlReply) -> ControlCommand,
    ) -> Result<BotStatus, ControlError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| ControlError::Closed)?;
        response.await.map_err(|_| ControlError::Closed)?
    }
}

/// What the run loop does after the current step ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Connect,
    Reconnect,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Reconnect,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    Wander(Option<bool>),
    Center,
    Status,
}

pub fn parse_chat_command(message: &str) -> Option<ChatCommand> {
    let mut words = message.split_whitespace();
    match words.next()? {
        "!wander" => match words.next() {
            None => Some(ChatCommand::Wander(None)),
            Some("on") => Some(ChatCommand::Wander(Some(true))),
            Some("off") => Some(ChatCommand::Wander(Some(false))),
            Some(_) => None,
        },
        "!center" => Some(ChatCommand::Center),
        "!status" => Some(ChatCommand::Status),
        _ => None,
    }
}

/// Keeps the bot connected, owns the patrol task and applies control commands.
pub struct BotClient<C: GameConnector> {
    connector: Arc<C>,
    config: BotConfig,
    config_path: Option<PathBuf>,
    status: StatusSender,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    patrol: PatrolHandle,
    teleport: TeleportDetector,
    rng: StdRng,
    failures: u32,
    spawned: bool,
}

impl<C: GameConnector> BotClient<C> {
    /// `config_path` is where changes get saved; `None` keeps them in memory.
    pub fn new(connector: C, config: BotConfig, config_path: Option<PathBuf>) -> (Self, BotHandle) {
        let (status, status_rx) = status_channel(&config);
        let (command_tx, commands) = mpsc::unbounded_channel();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let client = BotClient {
            connector: Arc::new(connector),
            teleport: TeleportDetector::new(config.teleport_threshold),
            config,
            config_path,
            status,
            commands,
            patrol: PatrolHandle::new(),
            rng,
            failures: 0,
            spawned: false,
        };
        let handle = BotHandle {
            commands: command_tx,
            status: status_rx,
        };
        (client, handle)
    }

    pub async fn run(mut self) {
        let mut next = Next::Connect;
        while next != Next::Shutdown {
            next = match next {
                Next::Connect => self.connect_and_play().await,
                Next::Reconnect => self.wait_reconnect().await,
                Next::Shutdown => Next::Shutdown,
            };
        }
        self.patrol.abandon(&self.status).await;
        self.status.send_modify(|s| {
            s.state = ClientState::Disconnected;
            s.position = None;
        });
        info!("bot controller stopped");
    }

    async fn connect_and_play(&mut self) -> Next {
        let server = self.config.server.clone();
        let username = self.config.username.clone();
        self.spawned = false;
        self.status.send_modify(|s| {
            s.state = ClientState::Connecting;
            s.server = server.clone();
        });
        info!(%server, %username, "connecting");

        let connector = Arc::clone(&self.connector);
        let attempt = async move { connector.connect(&server, &username).await };
        tokio::pin!(attempt);

        let result = loop {
            tokio::select! {
                result = &mut attempt => break result,
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        return Next::Shutdown;
                    };
                    match self.handle_offline(command) {
                        Flow::Continue => {}
                        Flow::Reconnect => return Next::Connect,
                        Flow::Shutdown => return Next::Shutdown,
                    }
                }
            }
        };

        match result {
            Ok((session, events)) => {
                info!(server = %self.config.server, "connected");
                self.play(Arc::new(session), events).await
            }
            Err(err) => {
                warn!(error = %err, "connection failed");
                self.status
                    .send_modify(|s| s.last_disconnect = Some(err.to_string()));
                Next::Reconnect
            }
        }
    }

    async fn wait_reconnect(&mut self) -> Next {
        let delay = self.config.reconnect_delay(self.failures);
        self.failures = self.failures.saturating_add(1);
        let attempt = self.failures;
        self.status.send_modify(|s| {
            s.state = ClientState::Reconnecting;
            s.reconnect_attempts = attempt;
        });
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt, "waiting to reconnect"
        );

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Next::Connect,
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        return Next::Shutdown;
                    };
                    match self.handle_offline(command) {
                        Flow::Continue => {}
                        Flow::Reconnect => return Next::Connect,
                        Flow::Shutdown => return Next::Shutdown,
                    }
                }
            }
        }
    }

    async fn play(&mut self, session: Arc<C::Session>, mut events: EventReceiver) -> Next {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(GameEvent::Spawn) => self.on_spawn(&session).await,
                    Some(GameEvent::Position(position)) => {
                        self.on_position(&session, position).await
                    }
                    Some(GameEvent::Chat { sender, message }) => {
                        self.on_chat(&session, sender.as_deref(), &message).await
                    }
                    Some(GameEvent::Disconnected { reason }) => {
                        self.end_session(reason).await;
                        return Next::Reconnect;
                    }
                    None => {
                        self.end_session("connection closed".to_string()).await;
                        return Next::Reconnect;
                    }
                },
                command = self.commands.recv() => {
                    let flow = match command {
                        Some(command) => self.handle_in_game(&session, command).await,
                        None => Flow::Shutdown,
                    };
                    match flow {
                        Flow::Continue => {}
                        Flow::Reconnect => {
                            self.leave(&session, "switching server").await;
                            self.failures = 0;
                            return Next::Connect;
                        }
                        Flow::Shutdown => {
                            self.leave(&session, "shutting down").await;
                            return Next::Shutdown;
                        }
                    }
                }
            }
        }
    }

    async fn on_spawn(&mut self, session: &Arc<C::Session>) {
        let position = session.position();
        self.spawned = true;
        self.failures = 0;
        self.teleport.reset();
        self.teleport.observe(position);
        self.status.send_modify(|s| {
            s.state = ClientState::InGame;
            s.position = Some(position);
            s.reconnect_attempts = 0;
        });
        info!(%position, "spawned");

        if self.config.center.is_none() {
            info!(center = %position, "no center configured, using spawn position");
            self.config.center = Some(position);
            self.status.send_modify(|s| s.center = Some(position));
            let _ = self.persist();
        }
        if self.config.wander_enabled {
            self.start_patrol(session).await;
        }
    }

    async fn on_position(&mut self, session: &Arc<C::Session>, position: Vec3) {
        self.status
            .send_if_modified(|s| s.position.replace(position) != Some(position));
        let Some(jump) = self.teleport.observe(position) else {
            return;
        };
        info!(distance = jump, %position, "teleport detected");
        self.status.send_modify(|s| s.teleports += 1);
        if self.patrol.is_running() {
            self.start_patrol(session).await;
        }
    }

    async fn on_chat(&mut self, session: &Arc<C::Session>, sender: Option<&str>, message: &str) {
        if !self.config.chat_commands || sender == Some(self.config.username.as_str()) {
            return;
        }
        let Some(command) = parse_chat_command(message) else {
            return;
        };
        debug!(?sender, ?command, "chat command");
        let reply = match command {
            ChatCommand::Wander(enabled) => {
                let result = self.apply_wandering(session, enabled).await;
                let state = if self.config.wander_enabled { "on" } else { "off" };
                match result {
                    Ok(_) => format!("wandering {state}"),
                    Err(err) => format!("wandering {state} ({err})"),
                }
            }
            ChatCommand::Center => {
                let position = session.position();
                match self.apply_center(Some(session), position).await {
                    Ok(_) => format!("center set to {position}"),
                    Err(err) => err.to_string(),
                }
            }
            ChatCommand::Status => {
                let summary = self.status.borrow().summary();
                summary
            }
        };
        session.chat(&reply);
    }

    async fn handle_in_game(&mut self, session: &Arc<C::Session>, command: ControlCommand) -> Flow {
        match command {
            ControlCommand::SetCenter { center, reply } => {
                let result = match center {
                    Some(center) => self.apply_center(Some(session), center).await,
                    None if self.spawned => {
                        let position = session.position();
                        self.apply_center(Some(session), position).await
                    }
                    None => Err(ControlError::NotInGame),
                };
                let _ = reply.send(result);
                Flow::Continue
            }
            ControlCommand::SetWandering { enabled, reply } => {
                let result = self.apply_wandering(session, enabled).await;
                let _ = reply.send(result);
                Flow::Continue
            }
            ControlCommand::SwitchServer { server, reply } => {
                let result = self.apply_server(server);
                let _ = reply.send(result);
                Flow::Reconnect
            }
            ControlCommand::Shutdown => Flow::Shutdown,
        }
    }

    /// Commands that arrive while there is no session to act on.
    fn handle_offline(&mut self, command: ControlCommand) -> Flow {
        match command {
            ControlCommand::SetCenter { center, reply } => {
                let result = match center {
                    Some(center) => self.store_center(center),
                    None => Err(ControlError::NotInGame),
                };
                let _ = reply.send(result);
                Flow::Continue
            }
            ControlCommand::SetWandering { enabled, reply } => {
                let result = self.store_wandering(enabled);
                let _ = reply.send(result);
                Flow::Continue
            }
            ControlCommand::SwitchServer { server, reply } => {
                let result = self.apply_server(server);
                let _ = reply.send(result);
                self.failures = 0;
                Flow::Reconnect
            }
            ControlCommand::Shutdown => Flow::Shutdown,
        }
    }

    async fn apply_center(
        &mut self,
        session: Option<&Arc<C::Session>>,
        center: Vec3,
    ) -> Result<BotStatus, ControlError> {
        let result = self.store_center(center);
        if matches!(result, Err(ControlError::InvalidCenter(_))) {
            return result;
        }
        if let Some(session) = session {
            if self.patrol.is_running() {
                self.start_patrol(session).await;
            }
        }
        result.map(|_| self.status.borrow().clone())
    }

    fn store_center(&mut self, center: Vec3) -> Result<BotStatus, ControlError> {
        if !center.is_finite() {
            return Err(ControlError::InvalidCenter(format!(
                "coordinates must be finite, got {center}"
            )));
        }
        self.config.center = Some(center);
        self.status.send_modify(|s| s.center = Some(center));
        info!(%center, "patrol center set");
        self.persist()?;
        Ok(self.status.borrow().clone())
    }

    async fn apply_wandering(
        &mut self,
        session: &Arc<C::Session>,
        enabled: Option<bool>,
    ) -> Result<BotStatus, ControlError> {
        let result = self.store_wandering(enabled);
        if !self.config.wander_enabled {
            self.patrol.stop(session.as_ref(), &self.status).await;
        } else if self.spawned && !self.patrol.is_running() {
            self.start_patrol(session).await;
        }
        result.map(|_| self.status.borrow().clone())
    }

    fn store_wandering(&mut self, enabled: Option<bool>) -> Result<BotStatus, ControlError> {
        let enabled = enabled.unwrap_or(!self.config.wander_enabled);
        self.config.wander_enabled = enabled;
        self.status.send_modify(|s| s.wander_enabled = enabled);
        info!(enabled, "wandering toggled");
        self.persist()?;
        Ok(self.status.borrow().clone())
    }

    fn apply_server(&mut self, server: ServerAddress) -> Result<BotStatus, ControlError> {
        info!(from = %self.config.server, to = %server, "switching server");
        self.config.server = server.clone();
        self.status.send_modify(|s| {
            s.server = server;
            s.reconnect_attempts = 0;
        });
        self.persist()?;
        Ok(self.status.borrow().clone())
    }

    async fn start_patrol(&mut self, session: &Arc<C::Session>) {
        let Some(center) = self.config.center else {
            warn!("cannot patrol without a center");
            return;
        };
        let settings = PatrolSettings::new(&self.config, center);
        let rng = StdRng::seed_from_u64(self.rng.gen());
        self.patrol
            .start(Arc::clone(session), settings, self.status.clone(), rng)
            .await;
    }

    async fn leave(&mut self, session: &Arc<C::Session>, reason: &str) {
        self.patrol.stop(session.as_ref(), &self.status).await;
        session.disconnect();
        self.spawned = false;
        let reason = reason.to_string();
        self.status.send_modify(|s| {
            s.state = ClientState::Disconnected;
            s.position = None;
            s.last_disconnect = Some(reason);
        });
    }

    async fn end_session(&mut self, reason: String) {
        warn!(%reason, "disconnected");
        self.patrol.abandon(&self.status).await;
        self.spawned = false;
        self.status.send_modify(|s| {
            s.state = ClientState::Reconnecting;
            s.position = None;
            s.last_disconnect = Some(reason);
        });
    }

    fn persist(&self) -> Result<(), ControlError> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };
        self.config.save(path).map_err(|err| {
            warn!(error = %err, path = %path.display(), "failed to save config");
            ControlError::Persist(err.to_string())
        })
    }
}
