//! Visit and generation events: payload normalization, a JSON-lines event
//! store and the range summary served to dashboards.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::options::ArtMode;

pub const MINUTE_MS: i64 = 60 * 1000;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// Width of the client-side visit bucket.
pub const VISIT_BUCKET_MS: i64 = 10 * MINUTE_MS;
pub const MIN_RANGE_MS: i64 = MINUTE_MS;
pub const MAX_RANGE_MS: i64 = 10 * DAY_MS;
pub const DEFAULT_RANGE_MS: i64 = HOUR_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Android,
    Iphone,
    Ipad,
    Windows,
    Macos,
    Linux,
    #[default]
    Other,
}

impl Device {
    pub fn from_keyword(value: &str) -> Option<Self> {
        match value {
            "android" => Some(Self::Android),
            "iphone" => Some(Self::Iphone),
            "ipad" => Some(Self::Ipad),
            "windows" => Some(Self::Windows),
            "macos" => Some(Self::Macos),
            "linux" => Some(Self::Linux),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Classify a browser user agent. Checks run in a fixed order; Android wins over Linux.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ua.contains("android") {
            Self::Android
        } else if ua.contains("iphone") {
            Self::Iphone
        } else if ua.contains("ipad") {
            Self::Ipad
        } else if ua.contains("macintosh") || ua.contains("mac os x") {
            Self::Macos
        } else if ua.contains("windows") {
            Self::Windows
        } else if ua.contains("linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }

    /// Device of the machine running this process.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "android" => Self::Android,
            "ios" => Self::Iphone,
            "macos" => Self::Macos,
            "windows" => Self::Windows,
            "linux" => Self::Linux,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitEvent {
    pub timestamp: i64,
    pub bucket_start: i64,
    pub client_id: String,
    pub device: Device,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationEvent {
    pub timestamp: i64,
    pub mode: ArtMode,
    pub style_key: String,
    pub style_label: String,
    pub client_id: String,
    pub device: Device,
}

impl GenerationEvent {
    /// Event for a finished render; the style falls back to the mode when no preset was used.
    pub fn new(mode: ArtMode, style: Option<(&str, &str)>, client_id: &str, timestamp: i64) -> Self {
        let (style_key, style_label) = match style {
            Some((key, label)) => (key.to_owned(), label.to_owned()),
            None => (mode.keyword().to_owned(), mode.keyword().to_uppercase()),
        };
        Self {
            timestamp,
            mode,
            style_key,
            style_label,
            client_id: client_id.to_owned(),
            device: Device::current(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnalyticsEvent {
    Visit(VisitEvent),
    Generation(GenerationEvent),
}

impl AnalyticsEvent {
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Visit(visit) => visit.timestamp,
            Self::Generation(generation) => generation.timestamp,
        }
    }

    pub fn device(&self) -> Device {
        match self {
            Self::Visit(visit) => visit.device,
            Self::Generation(generation) => generation.device,
        }
    }

    /// Normalize a loosely-typed POST body into an event.
    ///
    /// Missing or unknown fields get defaults; only an unknown `type` is rejected.
    pub fn from_payload(body: &Value, now_ms: i64) -> Result<Self> {
        let timestamp = number_field(body, "timestamp").unwrap_or(now_ms);
        let client_id = text_field(body, "clientId").unwrap_or_else(|| "unknown".to_owned());
        let device = body
            .get("device")
            .and_then(Value::as_str)
            .and_then(Device::from_keyword)
            .unwrap_or_default();

        match body.get("type").and_then(Value::as_str) {
            Some("visit") => Ok(Self::Visit(VisitEvent {
                timestamp,
                bucket_start: number_field(body, "bucketStart").unwrap_or(timestamp),
                client_id,
                device,
            })),
            Some("generation") => {
                let mode = body
                    .get("mode")
                    .and_then(Value::as_str)
                    .and_then(|value| match value {
                        "mosaic" | "ascii" | "emoji" => ArtMode::from_keyword(value),
                        _ => None,
                    })
                    .unwrap_or_default();
                let style_key =
                    text_field(body, "styleKey").unwrap_or_else(|| mode.keyword().to_owned());
                let style_label = text_field(body, "styleLabel")
                    .unwrap_or_else(|| mode.keyword().to_uppercase());
                Ok(Self::Generation(GenerationEvent {
                    timestamp,
                    mode,
                    style_key,
                    style_label,
                    client_id,
                    device,
                }))
            }
            Some(other) => bail!("unsupported event type '{other}'"),
            None => bail!("event payload is missing a 'type'"),
        }
    }
}

/// Truthy number or numeric string; zero counts as missing.
fn number_field(body: &Value, key: &str) -> Option<i64> {
    let value = match body.get(key)? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (value.is_finite() && value != 0.0).then_some(value as i64)
}

/// Non-empty string, or a number rendered as text.
fn text_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Clamp a requested range to `[MIN_RANGE_MS, MAX_RANGE_MS]`, defaulting to one hour.
pub fn clamp_range_ms(requested: Option<i64>) -> i64 {
    requested
        .unwrap_or(DEFAULT_RANGE_MS)
        .clamp(MIN_RANGE_MS, MAX_RANGE_MS)
}

/// Trend bucket width for a range.
pub fn trend_interval_ms(range_ms: i64) -> i64 {
    if range_ms <= HOUR_MS {
        5 * MINUTE_MS
    } else if range_ms <= 6 * HOUR_MS {
        30 * MINUTE_MS
    } else if range_ms <= DAY_MS {
        HOUR_MS
    } else {
        6 * HOUR_MS
    }
}

/// `HH:MM` for sub-hour buckets, else `MM/DD HH:00`, in UTC.
pub fn bucket_label(timestamp_ms: i64, interval_ms: i64) -> String {
    let Some(time) = Utc.timestamp_millis_opt(timestamp_ms).single() else {
        return String::new();
    };
    if interval_ms < HOUR_MS {
        time.format("%H:%M").to_string()
    } else {
        time.format("%m/%d %H:00").to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModeCounts {
    pub mosaic: u64,
    pub ascii: u64,
    pub emoji: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceCounts {
    pub android: u64,
    pub iphone: u64,
    pub ipad: u64,
    pub windows: u64,
    pub macos: u64,
    pub linux: u64,
    pub other: u64,
}

impl DeviceCounts {
    fn bump(&mut self, device: Device) {
        let slot = match device {
            Device::Android => &mut self.android,
            Device::Iphone => &mut self.iphone,
            Device::Ipad => &mut self.ipad,
            Device::Windows => &mut self.windows,
            Device::Macos => &mut self.macos,
            Device::Linux => &mut self.linux,
            Device::Other => &mut self.other,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleCount {
    pub key: String,
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub label: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub visits: u64,
    pub images_created: u64,
    pub mode_counts: ModeCounts,
    pub style_counts: Vec<StyleCount>,
    pub device_counts: DeviceCounts,
    pub visits_trend: Vec<TrendPoint>,
    pub generations_trend: Vec<TrendPoint>,
}

/// Aggregate the events inside `[now - range, now]`. `range_ms` is clamped first.
pub fn summarize(events: &[AnalyticsEvent], range_ms: i64, now_ms: i64) -> AnalyticsSummary {
    let range_ms = clamp_range_ms(Some(range_ms));
    let start = now_ms - range_ms;
    let interval = trend_interval_ms(range_ms);
    let in_range: Vec<&AnalyticsEvent> = events
        .iter()
        .filter(|event| (start..=now_ms).contains(&event.timestamp()))
        .collect();

    let mut visits = 0;
    let mut images_created = 0;
    let mut mode_counts = ModeCounts::default();
    let mut device_counts = DeviceCounts::default();
    let mut style_counts: Vec<StyleCount> = Vec::new();
    let mut style_slots: HashMap<String, usize> = HashMap::new();

    for event in &in_range {
        device_counts.bump(event.device());
        match event {
            AnalyticsEvent::Visit(_) => visits += 1,
            AnalyticsEvent::Generation(generation) => {
                images_created += 1;
                match generation.mode {
                    ArtMode::Mosaic => mode_counts.mosaic += 1,
                    ArtMode::Ascii => mode_counts.ascii += 1,
                    ArtMode::Emoji => mode_counts.emoji += 1,
                }
                let key = if generation.style_key.is_empty() {
                    generation.mode.keyword().to_owned()
                } else {
                    generation.style_key.clone()
                };
                match style_slots.get(&key) {
                    Some(&slot) => style_counts[slot].count += 1,
                    None => {
                        let label = if generation.style_label.is_empty() {
                            key.clone()
                        } else {
                            generation.style_label.clone()
                        };
                        style_slots.insert(key.clone(), style_counts.len());
                        style_counts.push(StyleCount {
                            key,
                            label,
                            count: 1,
                        });
                    }
                }
            }
        }
    }
    style_counts.sort_by(|a, b| b.count.cmp(&a.count));

    let visits_trend = build_trend(&in_range, start, now_ms, interval, |event| {
        matches!(event, AnalyticsEvent::Visit(_))
    });
    let generations_trend = build_trend(&in_range, start, now_ms, interval, |event| {
        matches!(event, AnalyticsEvent::Generation(_))
    });

    AnalyticsSummary {
        visits,
        images_created,
        mode_counts,
        style_counts,
        device_counts,
        visits_trend,
        generations_trend,
    }
}

fn build_trend(
    events: &[&AnalyticsEvent],
    start: i64,
    end: i64,
    interval: i64,
    counts: impl Fn(&AnalyticsEvent) -> bool,
) -> Vec<TrendPoint> {
    let buckets = ((end - start) as f64 / interval as f64).ceil().max(1.0) as usize;
    let mut values = vec![0_u64; buckets];
    for event in events.iter().filter(|event| counts(event)) {
        let timestamp = event.timestamp();
        if timestamp < start || timestamp > end {
            continue;
        }
        let slot = ((timestamp - start) / interval) as usize;
        values[slot.min(buckets - 1)] += 1;
    }
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| TrendPoint {
            label: bucket_label(start + index as i64 * interval, interval),
            value,
        })
        .collect()
}

/// Append-only JSON-lines event log with visit de-duplication.
#[derive(Debug)]
pub struct EventStore {
    path: PathBuf,
    events: Vec<AnalyticsEvent>,
    seen_visits: HashSet<(i64, String)>,
}

impl EventStore {
    /// Load `path`, or start empty when it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let mut store = Self {
            path: path.to_path_buf(),
            events: Vec::new(),
            seen_visits: HashSet::new(),
        };
        if !path.exists() {
            return Ok(store);
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read analytics store {}", path.display()))?;
        for (index, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AnalyticsEvent>(line) {
                Ok(event) => {
                    store.remember(event);
                }
                Err(error) => warn!(
                    path = %path.display(),
                    line = index + 1,
                    %error,
                    "skipping corrupt analytics line"
                ),
            }
        }
        debug!(events = store.events.len(), "analytics store loaded");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn events(&self) -> &[AnalyticsEvent] {
        &self.events
    }

    /// Record `event`. Returns `false` for a visit already seen in the same bucket.
    ///
    /// The event is appended to disk first; when that fails the store is left
    /// unchanged so the same event can be retried.
    pub fn record(&mut self, event: AnalyticsEvent) -> Result<bool> {
        if self.is_seen_visit(&event) {
            return Ok(false);
        }
        let line = serde_json::to_string(&event).context("failed to encode analytics event")?;

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open analytics store {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to {}", self.path.display()))?;

        self.remember(event);
        Ok(true)
    }

    pub fn summary(&self, range_ms: i64, now_ms: i64) -> AnalyticsSummary {
        summarize(&self.events, range_ms, now_ms)
    }

    fn is_seen_visit(&self, event: &AnalyticsEvent) -> bool {
        match event {
            AnalyticsEvent::Visit(visit) => self
                .seen_visits
                .contains(&(visit.bucket_start, visit.client_id.clone())),
            AnalyticsEvent::Generation(_) => false,
        }
    }

    fn remember(&mut self, event: AnalyticsEvent) -> bool {
        if let AnalyticsEvent::Visit(visit) = &event {
            if !self
                .seen_visits
                .insert((visit.bucket_start, visit.client_id.clone()))
            {
                return false;
            }
        }
        self.events.push(event);
        true
    }
}

/// Client-side rule: report at most one visit per [`VISIT_BUCKET_MS`] bucket.
#[derive(Debug, Clone, Default)]
pub struct VisitTracker {
    last_bucket: Option<i64>,
}

impl VisitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket_start(now_ms: i64) -> i64 {
        now_ms.div_euclid(VISIT_BUCKET_MS) * VISIT_BUCKET_MS
    }

    /// Bucket start to report for a visit at `now_ms`, or `None` if this bucket was already reported.
    pub fn observe(&mut self, now_ms: i64) -> Option<i64> {
        let bucket = Self::bucket_start(now_ms);
        if self.last_bucket == Some(bucket) {
            return None;
        }
        self.last_bucket = Some(bucket);
        Some(bucket)
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn user_agents_follow_detection_order() {
        let android = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36";
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)";
        let mac = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0)";
        assert_eq!(Device::from_user_agent(android), Device::Android);
        assert_eq!(Device::from_user_agent(iphone), Device::Iphone);
        assert_eq!(Device::from_user_agent(mac), Device::Macos);
        assert_eq!(Device::from_user_agent("Mozilla/5.0 (X11; Linux x86_64)"), Device::Linux);
        assert_eq!(Device::from_user_agent("curl/8.0"), Device::Other);
    }

    #[test]
    fn generation_payload_defaults() {
        let event = AnalyticsEvent::from_payload(
            &json!({ "type": "generation", "mode": "sepia", "device": "toaster" }),
            1_000,
        )
        .expect("generation should normalize");
        let AnalyticsEvent::Generation(generation) = event else {
            panic!("expected a generation event");
        };
        assert_eq!(generation.mode, ArtMode::Mosaic);
        assert_eq!(generation.style_key, "mosaic");
        assert_eq!(generation.style_label, "MOSAIC");
        assert_eq!(generation.client_id, "unknown");
        assert_eq!(generation.device, Device::Other);
        assert_eq!(generation.timestamp, 1_000);
    }

    #[test]
    fn visit_bucket_defaults_to_timestamp() {
        let event = AnalyticsEvent::from_payload(
            &json!({ "type": "visit", "timestamp": "5000", "clientId": 42, "device": "ipad" }),
            1_000,
        )
        .expect("visit should normalize");
        assert_eq!(
            event,
            AnalyticsEvent::Visit(VisitEvent {
                timestamp: 5_000,
                bucket_start: 5_000,
                client_id: "42".to_owned(),
                device: Device::Ipad,
            })
        );
    }

    #[test]
    fn unsupported_type_is_rejected() {
        assert!(AnalyticsEvent::from_payload(&json!({ "type": "click" }), 0).is_err());
        assert!(AnalyticsEvent::from_payload(&json!({}), 0).is_err());
    }

    #[test]
    fn range_is_clamped() {
        assert_eq!(clamp_range_ms(None), HOUR_MS);
        assert_eq!(clamp_range_ms(Some(5)), MIN_RANGE_MS);
        assert_eq!(clamp_range_ms(Some(30 * DAY_MS)), MAX_RANGE_MS);
    }

    #[test]
    fn interval_steps_with_range() {
        assert_eq!(trend_interval_ms(HOUR_MS), 5 * MINUTE_MS);
        assert_eq!(trend_interval_ms(6 * HOUR_MS), 30 * MINUTE_MS);
        assert_eq!(trend_interval_ms(DAY_MS), HOUR_MS);
        assert_eq!(trend_interval_ms(2 * DAY_MS), 6 * HOUR_MS);
    }

    #[test]
    fn labels_switch_format_at_one_hour() {
        let ts = 1_700_000_000_000;
        assert_eq!(bucket_label(ts, 5 * MINUTE_MS), "22:13");
        assert_eq!(bucket_label(ts, HOUR_MS), "11/14 22:00");
    }

    #[test]
    fn visit_tracker_reports_once_per_bucket() {
        let mut tracker = VisitTracker::new();
        let start = 6 * VISIT_BUCKET_MS;
        assert_eq!(tracker.observe(start + 1), Some(start));
        assert_eq!(tracker.observe(start + VISIT_BUCKET_MS - 1), None);
        assert_eq!(
            tracker.observe(start + VISIT_BUCKET_MS),
            Some(start + VISIT_BUCKET_MS)
        );
    }

    #[test]
    fn styles_sort_by_count_and_fall_back_to_mode() {
        let now = 10 * HOUR_MS;
        let generation = |style: Option<(&str, &str)>| {
            AnalyticsEvent::Generation(GenerationEvent::new(ArtMode::Ascii, style, "c", now - 1))
        };
        let events = vec![
            generation(Some(("matrix", "Matrix Rain"))),
            generation(None),
            generation(None),
        ];
        let summary = summarize(&events, HOUR_MS, now);
        assert_eq!(summary.images_created, 3);
        assert_eq!(summary.mode_counts.ascii, 3);
        assert_eq!(summary.style_counts[0].key, "ascii");
        assert_eq!(summary.style_counts[0].label, "ASCII");
        assert_eq!(summary.style_counts[0].count, 2);
        assert_eq!(summary.style_counts[1].label, "Matrix Rain");
    }
}
