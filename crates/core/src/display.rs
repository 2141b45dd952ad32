//! The on-screen panel: the most recently shown picks and volume leaders.

use crate::domain::alert::AlertPayload;
use crate::domain::catalog::{StockRecommendation, VolumeLeader};
use serde::Serialize;
use std::fmt::Write;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PanelState {
    pub recommendations: Vec<StockRecommendation>,
    pub top_volume: Vec<VolumeLeader>,
}

#[derive(Debug, Default)]
pub struct DisplayPanel {
    state: RwLock<PanelState>,
}

impl DisplayPanel {
    pub fn new(initial: PanelState) -> Self {
        Self {
            state: RwLock::new(initial),
        }
    }

    /// Replaces the section the payload belongs to; the other section is untouched.
    pub async fn show(&self, payload: &AlertPayload) {
        let mut state = self.state.write().await;
        match payload {
            AlertPayload::Recommendations(items) => state.recommendations = items.clone(),
            AlertPayload::TopVolume(items) => state.top_volume = items.clone(),
        }
    }

    pub async fn snapshot(&self) -> PanelState {
        self.state.read().await.clone()
    }

    pub async fn render(&self) -> RenderedPanel {
        render(&*self.state.read().await)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendationRow {
    pub heading: String,
    pub reason: String,
    pub price: String,
    pub change: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeRow {
    pub heading: String,
    pub volume: String,
    pub change: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPanel {
    pub recommendations: Vec<RecommendationRow>,
    pub top_volume: Vec<VolumeRow>,
}

impl RenderedPanel {
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[추천종목]");
        for r in &self.recommendations {
            let _ = writeln!(out, "  {} {} {}", r.heading, r.price, r.change);
            let _ = writeln!(out, "    {}", r.reason);
        }
        let _ = writeln!(out, "[거래대금 TOP3]");
        for v in &self.top_volume {
            let _ = writeln!(out, "  {} {} {}", v.heading, v.volume, v.change);
        }
        out
    }
}

pub fn render(state: &PanelState) -> RenderedPanel {
    let recommendations = state
        .recommendations
        .iter()
        .map(|s| RecommendationRow {
            heading: format!("{} ({})", s.name, s.code),
            reason: s.reason.clone(),
            price: format!("{}원", format_thousands(s.price)),
            change: format_change(s.change_percent),
            direction: direction(s.change_percent),
        })
        .collect();

    let top_volume = state
        .top_volume
        .iter()
        .enumerate()
        .map(|(i, v)| VolumeRow {
            heading: format!("{}위. {}", i + 1, v.name),
            volume: format!("거래대금: {}", v.volume),
            change: format_change(v.change_percent),
            direction: direction(v.change_percent),
        })
        .collect();

    RenderedPanel {
        recommendations,
        top_volume,
    }
}

pub fn format_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `+` only for strictly positive changes; zero renders without a sign.
pub fn format_change(change_percent: f64) -> String {
    if change_percent > 0.0 {
        format!("+{change_percent}%")
    } else {
        format!("{change_percent}%")
    }
}

fn direction(change_percent: f64) -> Direction {
    if change_percent > 0.0 {
        Direction::Positive
    } else {
        Direction::Negative
    }
}
