pub mod config;
pub mod dashboard;
pub mod game;
pub mod nav_structs;
pub mod net_client;
pub mod patrol;
pub mod status;
pub mod teleport;

#[cfg(feature = "azalea")]
pub mod azalea_client;

pub use config::BotConfig;
pub use game::{GameConnector, GameEvent, GameSession};
pub use net_client::{BotClient, BotHandle};
pub use status::BotStatus;
