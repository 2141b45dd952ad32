use crate::domain::catalog::{StockRecommendation, VolumeLeader};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// Pre-open recommendation picks.
    Morning,
    /// Post-close trading value top 3.
    Evening,
}

impl AlertKind {
    pub const ALL: [AlertKind; 2] = [AlertKind::Morning, AlertKind::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Morning => "morning",
            AlertKind::Evening => "evening",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AlertKind::Morning => "🎯 오늘의 AI 추천종목",
            AlertKind::Evening => "💰 거래대금 TOP3",
        }
    }

    /// Replaces an earlier notification of the same kind on the surface.
    pub fn tag(&self) -> &'static str {
        match self {
            AlertKind::Morning => "morning-stock",
            AlertKind::Evening => "evening-volume",
        }
    }

    /// Key of the on/off toggle in the key/value store.
    pub fn preference_key(&self) -> &'static str {
        match self {
            AlertKind::Morning => "morningAlarm",
            AlertKind::Evening => "eveningAlarm",
        }
    }

    pub fn fired_key(&self) -> String {
        format!("lastFired:{}", self.as_str())
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" => Ok(AlertKind::Morning),
            "evening" => Ok(AlertKind::Evening),
            other => anyhow::bail!("unknown alert kind: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "items", rename_all = "snake_case")]
pub enum AlertPayload {
    Recommendations(Vec<StockRecommendation>),
    TopVolume(Vec<VolumeLeader>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub tag: String,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    pub fn new(kind: AlertKind, body: String, icon: &str) -> Self {
        Self {
            title: kind.title().to_string(),
            body,
            icon: icon.to_string(),
            tag: kind.tag().to_string(),
            actions: vec![
                NotificationAction {
                    action: "view".to_string(),
                    title: "보기".to_string(),
                },
                NotificationAction {
                    action: "close".to_string(),
                    title: "닫기".to_string(),
                },
            ],
        }
    }
}

/// Result of one fired alert.
#[derive(Debug, Clone, Serialize)]
pub struct AlertOutcome {
    pub id: uuid::Uuid,
    pub kind: AlertKind,
    pub fired_at: DateTime<FixedOffset>,
    pub message: String,
    pub payload: AlertPayload,
    /// Whether the notification surface accepted it. The panel is updated either way.
    pub delivered: bool,
}
