use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::game::{GameSession, MoveError};
use crate::nav_structs::{horizontal_distance, random_point_in_radius, MoveGoal, Vec3};
use crate::status::{PatrolPhase, StatusSender};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatrolSettings {
    pub center: Vec3,
    pub radius: f64,
    pub wait_min: Duration,
    pub wait_max: Duration,
    pub move_timeout: Duration,
    pub retry_delay: Duration,
}

impl PatrolSettings {
    pub fn new(config: &BotConfig, center: Vec3) -> Self {
        PatrolSettings {
            center,
            radius: config.radius,
            wait_min: Duration::from_millis(config.wait_min_ms),
            wait_max: Duration::from_millis(config.wait_max_ms),
            move_timeout: Duration::from_millis(config.move_timeout_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    fn center_goal(&self) -> MoveGoal {
        MoveGoal::Block(self.center.block())
    }

    fn random_wait<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.wait_min.as_millis() as u64;
        let max = self.wait_max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min..=max.max(min)))
    }
}

/// Owns the spawned random-walk task. At most one walk runs at a time.
#[derive(Debug, Default)]
pub struct PatrolHandle {
    task: Option<JoinHandle<()>>,
}

impl PatrolHandle {
    pub fn new() -> Self {
        PatrolHandle { task: None }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts a fresh walk, replacing any walk already in progress.
    pub async fn start<S: GameSession>(
        &mut self,
        session: Arc<S>,
        settings: PatrolSettings,
        status: StatusSender,
        rng: StdRng,
    ) {
        self.stop(session.as_ref(), &status).await;
        info!(
            center = %settings.center,
            radius = settings.radius,
            "patrol started"
        );
        self.task = Some(tokio::spawn(walk(session, settings, status, rng)));
    }

    /// Cancels the walk and halts the pathfinder. Safe to call when idle.
    pub async fn stop<S: GameSession>(&mut self, session: &S, status: &StatusSender) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Wait for the abort to land so the task can't write a phase after ours.
            let _ = task.await;
            session.stop();
            info!("patrol stopped");
        }
        status.send_if_modified(|s| {
            let changed = s.phase != PatrolPhase::Idle;
            s.phase = PatrolPhase::Idle;
            changed
        });
    }

    /// Forgets the walk without touching the session, for when the session is gone.
    pub async fn abandon(&mut self, status: &StatusSender) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        status.send_modify(|s| s.phase = PatrolPhase::Idle);
    }
}

impl Drop for PatrolHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn walk<S: GameSession>(
    session: Arc<S>,
    settings: PatrolSettings,
    status: StatusSender,
    mut rng: StdRng,
) {
    loop {
        if let Err(err) = cycle(session.as_ref(), &settings, &status, &mut rng).await {
            warn!(
                error = %err,
                retry_ms = settings.retry_delay.as_millis() as u64,
                "patrol move failed, retrying"
            );
            session.stop();
            status.send_modify(|s| {
                s.last_error = Some(err.to_string());
                s.phase = PatrolPhase::Waiting;
            });
            sleep(settings.retry_delay).await;
        }
    }
}

async fn cycle<S: GameSession>(
    session: &S,
    settings: &PatrolSettings,
    status: &StatusSender,
    rng: &mut StdRng,
) -> Result<(), MoveError> {
    let here = session.position();
    if horizontal_distance(here, settings.center) > settings.radius {
        debug!(position = %here, "outside patrol radius, heading to center first");
        set_phase(status, PatrolPhase::Returning);
        move_to(session, settings.center_goal(), settings, status).await?;
    }

    let point = random_point_in_radius(settings.center, settings.radius, rng).block();
    let target = MoveGoal::Column {
        x: point.x,
        z: point.z,
    };
    debug!(%target, "wandering");
    set_phase(status, PatrolPhase::Wandering { target });
    move_to(session, target, settings, status).await?;

    set_phase(status, PatrolPhase::Waiting);
    sleep(settings.random_wait(rng)).await;

    set_phase(status, PatrolPhase::Returning);
    move_to(session, settings.center_goal(), settings, status).await?;

    set_phase(status, PatrolPhase::Waiting);
    sleep(settings.random_wait(rng)).await;
    Ok(())
}

async fn move_to<S: GameSession>(
    session: &S,
    goal: MoveGoal,
    settings: &PatrolSettings,
    status: &StatusSender,
) -> Result<(), MoveError> {
    match timeout(settings.move_timeout, session.goto(goal)).await {
        Ok(Ok(())) => {
            status.send_if_modified(|s| s.last_error.take().is_some());
            Ok(())
        }
        Ok(Err(err)) => Err(err),
        Err(_) => Err(MoveError::Timeout {
            goal,
            millis: settings.move_timeout.as_millis() as u64,
        }),
    }
}

fn set_phase(status: &StatusSender, phase: PatrolPhase) {
    status.send_modify(|s| s.phase = phase);
}
