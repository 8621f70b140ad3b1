use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type DealId = i32;

/// Status assigned when a deal is created without one.
pub const STATUS_ACTIVE: &str = "active";
/// The only status with lifecycle meaning: it stamps `closed_at`.
pub const STATUS_DONE: &str = "done";

pub const DEFAULT_LIST_LIMIT: u64 = 100;
pub const MAX_LIST_LIMIT: u64 = 1000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub deal_id: DealId,
    pub request_id: i32,
    pub executor_id: i32,
    pub agreed_price: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Deal {
    /// The client-controlled fields of this deal, e.g. as a base for a patch.
    pub fn to_input(&self) -> DealInput {
        DealInput {
            request_id: self.request_id,
            executor_id: self.executor_id,
            agreed_price: self.agreed_price,
            status: self.status.clone(),
        }
    }
}

/// Client payload for create and full replace. Missing fields decode to zero
/// values; `closed_at` has no field here and is never read from clients.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DealInput {
    pub request_id: i32,
    pub executor_id: i32,
    pub agreed_price: f64,
    pub status: String,
}

/// Row handed to the gateway on insert, defaults already applied.
#[derive(Clone, Debug, PartialEq)]
pub struct NewDeal {
    pub request_id: i32,
    pub executor_id: i32,
    pub agreed_price: f64,
    pub status: String,
}

/// Full set of mutable columns written by a replace.
#[derive(Clone, Debug, PartialEq)]
pub struct DealUpdate {
    pub request_id: i32,
    pub executor_id: i32,
    pub agreed_price: f64,
    pub status: String,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Row cap for listing, always within `1..=1000`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ListLimit(u64);

impl ListLimit {
    /// Absent or non-positive requests fall back to 100; large ones are capped at 1000.
    pub fn from_requested(requested: Option<i64>) -> Self {
        match requested {
            Some(n) if n > 0 => Self((n as u64).min(MAX_LIST_LIMIT)),
            _ => Self::default(),
        }
    }

    /// Parses a raw query-string value; anything non-numeric means "default".
    pub fn parse(raw: Option<&str>) -> Self {
        Self::from_requested(raw.and_then(|value| value.trim().parse::<i64>().ok()))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Default for ListLimit {
    fn default() -> Self {
        Self(DEFAULT_LIST_LIMIT)
    }
}
