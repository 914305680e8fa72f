//! server-rendered status page.
//!
//! the real dashboard is a browser app talking to the json api; this page is
//! the fallback view for a phone on the same wifi as the probe.

use crate::acquisition::AcquisitionSnapshot;
use crate::calibration::to_moisture_percent;
use crate::domain::{AcquisitionState, RawReading};

pub fn render(snapshot: &AcquisitionSnapshot, device_id: &str, latest: &RawReading) -> String {
    let state = match snapshot.state {
        AcquisitionState::Idle => "Ready to measure",
        AcquisitionState::Measuring => "Measuring…",
        AcquisitionState::Done => "Measurement complete",
    };

    let moisture = snapshot
        .current_moisture
        .map(|m| format!("{:.1}%", m))
        .unwrap_or_else(|| "--".to_string());

    let verdict = snapshot
        .local_status
        .map(|s| format!(r#"<p class="{0}">threshold check: {0}</p>"#, s.as_str()))
        .unwrap_or_default();

    let notice = snapshot
        .notice
        .as_ref()
        .map(|n| {
            format!(
                r#"<div class="notice"><strong>{}</strong> {}</div>"#,
                html_escape(&n.title),
                html_escape(&n.description)
            )
        })
        .unwrap_or_default();

    let history = snapshot
        .history
        .iter()
        .take(10)
        .map(|m| {
            format!(
                "<li>{} - {} {:.1}%</li>",
                m.taken_at.format("%H:%M:%S"),
                m.grain_type,
                m.moisture_percent
            )
        })
        .collect::<String>();

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta http-equiv="refresh" content="2">
<title>Grain Moisture Analyzer</title>
<style>
  body {{ font-family: system-ui; padding: 2rem; background: #1a1a2e; color: #eee; }}
  .card {{ background: #16213e; padding: 1rem 1.5rem; border-radius: 8px; margin-bottom: 1rem; }}
  .big {{ font-size: 3rem; font-weight: bold; margin: 0; }}
  .good {{ color: #4ade80; }} .caution {{ color: #facc15; }} .bad {{ color: #f87171; }}
  .notice {{ background: #7f1d1d; padding: .75rem; border-radius: 6px; margin-bottom: 1rem; }}
  .muted {{ color: #888; }}
</style>
</head>
<body>
<h1>Digital Grain Moisture Analyzer</h1>
{notice}
<div class="card">
  <p class="muted">{state} · {grain} · {ticks}/{target} readings</p>
  <p class="big">{moisture}</p>
  {verdict}
</div>
<div class="card">
  <h2 class="{advice_class}">{advice_title}</h2>
  <p>{advice_text}</p>
</div>
<div class="card">
  <h2>Recent measurements</h2>
  <ul>{history}</ul>
</div>
<p class="muted">device {device}: raw {raw} ({raw_pct:.1}%)</p>
</body>
</html>"#,
        grain = snapshot.grain,
        ticks = snapshot.ticks,
        target = snapshot.target_ticks,
        advice_class = snapshot.advice.status.as_str(),
        advice_title = html_escape(&snapshot.advice.title),
        advice_text = html_escape(&snapshot.advice.suggestion),
        device = html_escape(device_id),
        raw = latest.raw_value,
        raw_pct = to_moisture_percent(latest.raw_value),
    )
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SourceKind;
    use crate::domain::{AdviceResult, AdvisorStatus, GrainType, MoistureStatus};

    fn snapshot() -> AcquisitionSnapshot {
        AcquisitionSnapshot {
            state: AcquisitionState::Done,
            grain: GrainType::Rice,
            source: SourceKind::Simulated,
            current_moisture: Some(15.04),
            ticks: 10,
            target_ticks: 10,
            readings: Vec::new(),
            history: Vec::new(),
            advisor: AdvisorStatus::Done,
            advice: AdviceResult {
                status: MoistureStatus::Caution,
                title: "<script>alert(1)</script>".to_string(),
                suggestion: "Dry & store.".to_string(),
            },
            local_status: Some(MoistureStatus::Caution),
            notice: None,
        }
    }

    #[test]
    fn test_render_shows_reading_and_escapes_advice() {
        let html = render(&snapshot(), "device_A4B2", &RawReading { raw_value: 2350.0, timestamp: 0 });
        assert!(html.contains("15.0%"));
        assert!(html.contains("Rice"));
        assert!(html.contains("10/10 readings"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Dry &amp; store."));
        assert!(html.contains("raw 2350 (50.0%)"));
    }
}
