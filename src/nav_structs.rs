use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SERVER_PORT: u16 = 25565;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    pub fn block(&self) -> BlockPos {
        BlockPos {
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Where the pathfinder should take the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MoveGoal {
    /// Stand in this exact block.
    Block(BlockPos),
    /// Reach this x/z column at whatever height the terrain allows.
    Column { x: i32, z: i32 },
}

impl fmt::Display for MoveGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveGoal::Block(pos) => write!(f, "block {} {} {}", pos.x, pos.y, pos.z),
            MoveGoal::Column { x, z } => write!(f, "column {} {}", x, z),
        }
    }
}

/// Distance in the XZ plane; height differences don't count toward the radius.
pub fn horizontal_distance(a: Vec3, b: Vec3) -> f64 {
    let dx = a.x - b.x;
    let dz = a.z - b.z;
    (dx * dx + dz * dz).sqrt()
}

pub fn distance(a: Vec3, b: Vec3) -> f64 {
    let dy = a.y - b.y;
    let flat = horizontal_distance(a, b);
    (flat * flat + dy * dy).sqrt()
}

/// Uniform sample over the disk of `radius` around `center`.
///
/// Taking the square root of the radial draw keeps points from bunching up
/// near the middle. The height is left at `center.y`.
pub fn random_point_in_radius<R: Rng + ?Sized>(center: Vec3, radius: f64, rng: &mut R) -> Vec3 {
    let radius = radius.max(0.0);
    let r = radius * rng.gen::<f64>().sqrt();
    let theta = rng.gen::<f64>() * TAU;
    Vec3 {
        x: center.x + r * theta.cos(),
        y: center.y,
        z: center.z + r * theta.sin(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawServerAddress")]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize)]
struct RawServerAddress {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl TryFrom<RawServerAddress> for ServerAddress {
    type Error = AddressError;

    fn try_from(raw: RawServerAddress) -> Result<Self, Self::Error> {
        ServerAddress::new(raw.host, raw.port)
    }
}

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("server host is empty")]
    EmptyHost,
    #[error("invalid server port '{0}'")]
    InvalidPort(String),
}

impl ServerAddress {
    /// Surrounding whitespace and IPv6 brackets are stripped from `host`.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, AddressError> {
        let host = host.into();
        let host = host.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let addr = ServerAddress {
            host: host.trim().to_string(),
            port,
        };
        addr.validate()?;
        Ok(addr)
    }

    pub fn validate(&self) -> Result<(), AddressError> {
        if self.host.is_empty() {
            return Err(AddressError::EmptyHost);
        }
        if self.port == 0 {
            return Err(AddressError::InvalidPort("0".to_string()));
        }
        Ok(())
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        ServerAddress {
            host: "localhost".to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

impl FromStr for ServerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            match rest.split_once(']') {
                Some((host, "")) => (host, None),
                Some((host, tail)) => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(AddressError::InvalidPort(tail.to_string())),
                },
                None => (s, None),
            }
        } else {
            match s.split_once(':') {
                // more than one colon is a bare IPv6 literal
                Some((_, tail)) if tail.contains(':') => (s, None),
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };
        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| AddressError::InvalidPort(port.to_string()))?,
            None => DEFAULT_SERVER_PORT,
        };
        ServerAddress::new(host, port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
