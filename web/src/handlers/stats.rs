//! `GET /stats`: a flat JSON snapshot of the Prometheus counters, for
//! dashboards that would rather not scrape and parse exposition text.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// Parse Prometheus text exposition format into a flat metric-name → value
/// map, summing series that differ only by label set (per-shard counters).
fn parse(text: &str) -> HashMap<String, f64> {
    let mut values = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(space) = line.rfind(' ') else { continue };
        let (name_part, value_part) = line.split_at(space);
        let Ok(value) = value_part.trim().parse::<f64>() else { continue };
        let name = name_part.split('{').next().unwrap_or(name_part);

        *values.entry(name.to_string()).or_insert(0.0) += value;
    }

    values
}

/// `GET /stats`.
pub async fn stats(State(state): State<AppState>) -> Json<HashMap<String, f64>> {
    let text = state.metrics.render().unwrap_or_default();
    Json(parse(&text))
}
