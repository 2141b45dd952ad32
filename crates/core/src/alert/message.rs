use crate::domain::alert::AlertPayload;

/// Notification body for a payload.
pub fn body_for(payload: &AlertPayload) -> String {
    match payload {
        AlertPayload::Recommendations(items) => {
            let names: Vec<&str> = items.iter().map(|s| s.name.as_str()).collect();
            format!("오늘의 AI 추천: {}", names.join(", "))
        }
        AlertPayload::TopVolume(items) => match items.first() {
            Some(top) => format!("거래대금 1위: {} ({})", top.name, top.volume),
            None => "거래대금 정보 없음".to_string(),
        },
    }
}
