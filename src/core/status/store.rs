// ─── Status Store ───
// Reads the JSON status file the game writes into its data directory.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tracing::trace;

use crate::core::instance::model::status_path_in;

/// In-game state as reported by the game itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameState {
    Unknown,
    Playing,
    Paused,
    GameOver,
    Stopped,
    /// Any label the launcher does not know; shown verbatim.
    Other(String),
}

impl GameState {
    pub fn as_str(&self) -> &str {
        match self {
            GameState::Unknown => "unknown",
            GameState::Playing => "playing",
            GameState::Paused => "paused",
            GameState::GameOver => "game_over",
            GameState::Stopped => "stopped",
            GameState::Other(label) => label,
        }
    }
}

impl From<String> for GameState {
    fn from(label: String) -> Self {
        match label.as_str() {
            "unknown" => GameState::Unknown,
            "playing" => GameState::Playing,
            "paused" => GameState::Paused,
            "game_over" => GameState::GameOver,
            "stopped" => GameState::Stopped,
            _ => GameState::Other(label),
        }
    }
}

impl Serialize for GameState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameStatus {
    pub state: GameState,
    pub score: i64,
    pub timestamp: DateTime<Utc>,
}

/// On-disk shape: `{"state": "...", "score": 0, "timestamp": 1700000000.25}`.
#[derive(Debug, Deserialize)]
struct RawStatus {
    #[serde(default = "default_state")]
    state: String,
    #[serde(default)]
    score: i64,
    timestamp: f64,
}

fn default_state() -> String {
    "unknown".into()
}

impl GameStatus {
    /// Parse the status file contents. Any malformed input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw: RawStatus = serde_json::from_str(raw).ok()?;
        Some(Self {
            state: GameState::from(raw.state),
            score: raw.score,
            timestamp: timestamp_from_unix_seconds(raw.timestamp)?,
        })
    }

    /// True when the status is older than `window` relative to `now`.
    /// Timestamps in the future count as fresh.
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match now.signed_duration_since(self.timestamp).to_std() {
            Ok(age) => age > window,
            Err(_) => false,
        }
    }
}

fn timestamp_from_unix_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

/// Read `<data_dir>/status.json`.
///
/// Absent files and parse failures both return `None`: the game may be in the
/// middle of rewriting the file.
pub async fn read_status(data_dir: &Path) -> Option<GameStatus> {
    let path = status_path_in(data_dir);
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) => {
            trace!("No status at {:?}: {}", path, e);
            return None;
        }
    };

    let status = GameStatus::parse(&raw);
    if status.is_none() {
        trace!("Ignoring unparsable status at {:?}", path);
    }
    status
}

/// What the launcher shows for one poll of the status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusReport {
    /// Nothing readable yet; the current display should stay as it is.
    Pending,
    /// The file exists but has not been refreshed within the staleness window.
    TimedOut,
    Game { state: GameState, score: i64 },
}

impl StatusReport {
    pub fn evaluate(status: Option<&GameStatus>, now: DateTime<Utc>, window: Duration) -> Self {
        match status {
            None => StatusReport::Pending,
            Some(status) if status.is_stale(now, window) => StatusReport::TimedOut,
            Some(status) => StatusReport::Game {
                state: status.state.clone(),
                score: status.score,
            },
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReport::Pending => write!(f, "No status yet"),
            StatusReport::TimedOut => write!(f, "Not running (timeout)"),
            StatusReport::Game { state, score } => match state {
                GameState::Playing => write!(f, "Playing – Score: {score}"),
                GameState::Paused => write!(f, "Paused – Score: {score}"),
                GameState::GameOver => write!(f, "Game Over – Final Score: {score}"),
                GameState::Stopped => write!(f, "Finished"),
                other => write!(f, "{}", other.as_str()),
            },
        }
    }
}
