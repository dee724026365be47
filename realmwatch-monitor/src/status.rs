//! Composite status snapshots.
//!
//! A [`CompositeStatus`] is built once per aggregation cycle and shared as an
//! `Arc` afterwards; it is never mutated in place.

use serde::Serialize;
use std::fmt;

/// Static realm details copied into every snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmInfo {
    pub realm_name: String,
    pub max_players: u32,
    /// Free-form uptime text shown next to the realm; not measured here.
    pub uptime: String,
}

impl Default for RealmInfo {
    fn default() -> Self {
        Self {
            realm_name: "WotLK Server".to_string(),
            max_players: 1000,
            uptime: "Unknown".to_string(),
        }
    }
}

/// Reachability of both gateways plus the online population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeStatus {
    auth_online: bool,
    world_online: bool,
    players_online: u32,
    max_players: u32,
    realm_name: String,
    uptime: String,
}

impl CompositeStatus {
    /// Assemble a snapshot. A population is only trusted while the world
    /// gateway is up, so `players_online` is forced to 0 otherwise.
    pub fn new(auth_online: bool, world_online: bool, players_online: u32, realm: &RealmInfo) -> Self {
        Self {
            auth_online,
            world_online,
            players_online: if world_online { players_online } else { 0 },
            max_players: realm.max_players,
            realm_name: realm.realm_name.clone(),
            uptime: realm.uptime.clone(),
        }
    }

    /// Snapshot reported when a cycle could not be completed at all.
    pub fn offline(realm: &RealmInfo) -> Self {
        Self::new(false, false, 0, realm)
    }

    pub fn auth_online(&self) -> bool {
        self.auth_online
    }

    pub fn world_online(&self) -> bool {
        self.world_online
    }

    pub fn players_online(&self) -> u32 {
        self.players_online
    }

    pub fn max_players(&self) -> u32 {
        self.max_players
    }

    pub fn realm_name(&self) -> &str {
        &self.realm_name
    }

    pub fn uptime(&self) -> &str {
        &self.uptime
    }

    /// True only when both gateways answered.
    pub fn is_online(&self) -> bool {
        self.auth_online && self.world_online
    }

    pub fn label(&self) -> StatusLabel {
        match (self.auth_online, self.world_online) {
            (true, true) => StatusLabel::Online,
            (false, false) => StatusLabel::Offline,
            (false, true) => StatusLabel::AuthOffline,
            (true, false) => StatusLabel::WorldOffline,
        }
    }

    /// "N of MAX", the population line under the realm name.
    pub fn population_line(&self) -> String {
        format!("{} of {}", self.players_online, self.max_players)
    }
}

/// Short headline for a status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    Online,
    Offline,
    AuthOffline,
    WorldOffline,
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusLabel::Online => "Online",
            StatusLabel::Offline => "Offline",
            StatusLabel::AuthOffline => "Auth Offline",
            StatusLabel::WorldOffline => "World Offline",
        };
        f.write_str(text)
    }
}
