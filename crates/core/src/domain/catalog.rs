use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecommendation {
    pub code: String,
    pub name: String,
    pub reason: String,
    /// KRW, whole units.
    pub price: i64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeLeader {
    pub name: String,
    /// Already formatted for display, e.g. "15,423억원".
    pub volume: String,
    pub change_percent: f64,
}

/// Fixed snapshot the alerts draw from. Both lists are non-empty.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    recommendations: Vec<StockRecommendation>,
    volume_leaders: Vec<VolumeLeader>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    recommendations: Vec<StockRecommendation>,
    volume_leaders: Vec<VolumeLeader>,
}

impl Catalog {
    pub fn try_new(
        recommendations: Vec<StockRecommendation>,
        volume_leaders: Vec<VolumeLeader>,
    ) -> anyhow::Result<Self> {
        ensure!(!recommendations.is_empty(), "recommendation catalog must be non-empty");
        ensure!(!volume_leaders.is_empty(), "volume catalog must be non-empty");

        for r in &recommendations {
            ensure!(!r.code.trim().is_empty(), "recommendation code must be non-empty");
            ensure!(
                !r.name.trim().is_empty(),
                "recommendation name must be non-empty (code={})",
                r.code
            );
            ensure!(r.price >= 0, "price must be >= 0 (code={})", r.code);
        }
        for v in &volume_leaders {
            ensure!(!v.name.trim().is_empty(), "volume leader name must be non-empty");
        }

        Ok(Self {
            recommendations,
            volume_leaders,
        })
    }

    /// Loads a replacement catalog from a JSON file with `recommendations` and `volume_leaders`.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read catalog {} failed", path.display()))?;
        let parsed: CatalogFile = serde_json::from_str(&data)
            .with_context(|| format!("parse catalog {} failed", path.display()))?;
        Self::try_new(parsed.recommendations, parsed.volume_leaders)
    }

    /// Catalog file when configured, otherwise the built-in snapshot.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let catalog = Self::from_json_file(p)?;
                tracing::info!(
                    path = %p.display(),
                    recommendations = catalog.recommendations.len(),
                    volume_leaders = catalog.volume_leaders.len(),
                    "loaded catalog file"
                );
                Ok(catalog)
            }
            None => Ok(Self::builtin()),
        }
    }

    pub fn recommendations(&self) -> &[StockRecommendation] {
        &self.recommendations
    }

    /// In display order; the list is pre-ranked.
    pub fn volume_leaders(&self) -> &[VolumeLeader] {
        &self.volume_leaders
    }

    pub fn builtin() -> Self {
        let rec = |code: &str, name: &str, reason: &str, price: i64, change_percent: f64| {
            StockRecommendation {
                code: code.to_string(),
                name: name.to_string(),
                reason: reason.to_string(),
                price,
                change_percent,
            }
        };
        let vol = |name: &str, volume: &str, change_percent: f64| VolumeLeader {
            name: name.to_string(),
            volume: volume.to_string(),
            change_percent,
        };

        Self {
            recommendations: vec![
                rec("005930", "삼성전자", "AI 반도체 수요 증가로 목표가 상향", 71_500, 2.1),
                rec("000660", "SK하이닉스", "메모리 반도체 업사이클 본격 진입", 89_300, 3.8),
                rec("035420", "NAVER", "AI 기술 투자 확대 및 클라우드 성장", 184_500, 1.7),
                rec("051910", "LG화학", "2차전지 소재 사업 확장", 432_000, -0.5),
                rec("006400", "삼성SDI", "전기차 배터리 수요 급증", 789_000, 2.3),
                rec("373220", "LG에너지솔루션", "북미 배터리 공장 가동", 432_000, -1.2),
                rec("207940", "삼성바이오로직스", "mRNA 백신 생산 계약 체결", 789_000, 0.8),
            ],
            volume_leaders: vec![
                vol("삼성전자", "15,423억원", 2.1),
                vol("LG에너지솔루션", "8,934억원", -1.2),
                vol("삼성바이오로직스", "7,652억원", 0.8),
                vol("SK하이닉스", "6,234억원", 1.5),
                vol("NAVER", "5,123억원", 1.7),
            ],
        }
    }
}
