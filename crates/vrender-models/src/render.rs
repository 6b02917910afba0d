//! Render specification payload.
//!
//! The coordinator treats most of the payload as opaque and forwards it to
//! the renderer as composition props. The only fields it interprets are the
//! timing windows, the requested duration and the speed multiplier.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

/// Hard cap on the rendered timeline length (5 minutes).
pub const MAX_RENDER_DURATION_MS: f64 = 300_000.0;

/// Timeline window in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[validate(schema(function = "validate_window"))]
pub struct TimeWindow {
    pub from: f64,
    pub to: f64,
}

fn validate_window(window: &TimeWindow) -> Result<(), ValidationError> {
    if !window.from.is_finite() || !window.to.is_finite() {
        return Err(ValidationError::new("window_not_finite"));
    }
    if window.from < 0.0 || window.to < window.from {
        return Err(ValidationError::new("window_out_of_order"));
    }
    Ok(())
}

impl TimeWindow {
    pub fn new(from: f64, to: f64) -> Self {
        Self { from, to }
    }

    pub fn len(&self) -> f64 {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }

    fn scale(&mut self, factor: f64) {
        self.from *= factor;
        self.to *= factor;
    }
}

/// One item on the editor timeline (video, audio, text, image...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TrackItem {
    pub id: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    /// Where the item sits on the output timeline
    #[validate(nested)]
    pub display: TimeWindow,

    /// Source media offsets; never rescaled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub trim: Option<TimeWindow>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_rate: Option<f64>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// Overlay drawn on top of the track items.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub id: String,

    #[validate(nested)]
    pub display: TimeWindow,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// Output platform and canvas settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(range(min = 16, max = 7680))]
    pub width: u32,
    #[validate(range(min = 16, max = 7680))]
    pub height: u32,
    pub aspect_ratio: String,
    #[validate(range(min = 1, max = 120))]
    pub fps: u32,
    /// Platform-specific duration limit; can only lower the global cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<f64>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            name: "custom".to_string(),
            width: 1080,
            height: 1920,
            aspect_ratio: "9:16".to_string(),
            fps: 30,
            max_duration_ms: None,
        }
    }
}

/// Full render request as submitted by the editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RenderSpec {
    #[serde(default)]
    #[validate(length(max = 500), nested)]
    pub track_items: Vec<TrackItem>,

    #[serde(default)]
    #[validate(length(max = 200), nested)]
    pub overlays: Vec<Overlay>,

    #[serde(default)]
    #[validate(nested)]
    pub platform: PlatformConfig,

    /// Requested output duration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(exclusive_min = 0.0))]
    pub duration: Option<f64>,

    /// Global playback speed multiplier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 128))]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 200))]
    pub project_name: Option<String>,

    /// Owning user; overwritten from the authenticated caller on submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Everything else the editor sends is passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of duration normalisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedTiming {
    pub requested_ms: f64,
    pub capped_ms: f64,
    pub multiplier: f64,
    pub effective_ms: f64,
}

impl NormalizedTiming {
    /// Frame count for the given frame rate, rounded up.
    pub fn duration_in_frames(&self, fps: u32) -> u64 {
        ((self.effective_ms / 1000.0) * fps as f64).ceil().max(1.0) as u64
    }
}

fn sane_multiplier(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

impl RenderSpec {
    /// Requested duration, falling back to the end of the last timeline item.
    pub fn requested_duration_ms(&self) -> f64 {
        if let Some(duration) = self.duration.filter(|d| d.is_finite() && *d > 0.0) {
            return duration;
        }
        self.track_items
            .iter()
            .map(|item| item.display.to)
            .chain(self.overlays.iter().map(|overlay| overlay.display.to))
            .fold(0.0, f64::max)
    }

    /// Duration cap for this payload's platform.
    pub fn max_duration_ms(&self) -> f64 {
        self.platform
            .max_duration_ms
            .filter(|m| m.is_finite() && *m > 0.0)
            .map_or(MAX_RENDER_DURATION_MS, |m| m.min(MAX_RENDER_DURATION_MS))
    }

    /// Speed multiplier: the global `speed`, else the fastest track item.
    pub fn speed_multiplier(&self) -> f64 {
        if let Some(speed) = self.speed.and_then(sane_multiplier) {
            return speed;
        }
        self.track_items
            .iter()
            .filter_map(|item| item.playback_rate.and_then(sane_multiplier))
            .fold(None, |acc: Option<f64>, rate| Some(acc.map_or(rate, |a| a.max(rate))))
            .unwrap_or(1.0)
    }

    /// Cap the duration, apply the speed multiplier and rescale every timeline
    /// window by the same factor so audio, video and text stay in sync.
    ///
    /// Must be applied once, when the payload is built.
    pub fn normalize(&mut self) -> NormalizedTiming {
        let requested_ms = self.requested_duration_ms();
        let capped_ms = requested_ms.min(self.max_duration_ms());
        let multiplier = self.speed_multiplier();
        let effective_ms = capped_ms / multiplier;

        if multiplier != 1.0 {
            let factor = 1.0 / multiplier;
            for item in &mut self.track_items {
                item.display.scale(factor);
            }
            for overlay in &mut self.overlays {
                overlay.display.scale(factor);
            }
        }
        self.duration = Some(effective_ms);

        NormalizedTiming {
            requested_ms,
            capped_ms,
            multiplier,
            effective_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, from: f64, to: f64) -> TrackItem {
        TrackItem {
            id: id.to_string(),
            kind: "video".to_string(),
            display: TimeWindow::new(from, to),
            trim: Some(TimeWindow::new(1000.0, 1000.0 + (to - from))),
            ..Default::default()
        }
    }

    #[test]
    fn test_duration_capped_without_speed() {
        let mut spec = RenderSpec {
            duration: Some(400_000.0),
            ..Default::default()
        };
        let timing = spec.normalize();
        assert_eq!(timing.capped_ms, MAX_RENDER_DURATION_MS);
        assert_eq!(timing.effective_ms, MAX_RENDER_DURATION_MS);
        assert_eq!(spec.duration, Some(MAX_RENDER_DURATION_MS));
    }

    #[test]
    fn test_speed_rescales_all_windows() {
        let mut spec = RenderSpec {
            duration: Some(20_000.0),
            speed: Some(2.0),
            track_items: vec![item("a", 0.0, 10_000.0), item("b", 10_000.0, 20_000.0)],
            overlays: vec![Overlay {
                id: "text".to_string(),
                display: TimeWindow::new(4_000.0, 8_000.0),
                details: Value::Null,
            }],
            ..Default::default()
        };

        let timing = spec.normalize();
        assert_eq!(timing.multiplier, 2.0);
        assert_eq!(timing.effective_ms, 10_000.0);
        assert_eq!(spec.track_items[0].display, TimeWindow::new(0.0, 5_000.0));
        assert_eq!(spec.track_items[1].display, TimeWindow::new(5_000.0, 10_000.0));
        assert_eq!(spec.overlays[0].display, TimeWindow::new(2_000.0, 4_000.0));
        // Source offsets stay put.
        assert_eq!(spec.track_items[0].trim, Some(TimeWindow::new(1000.0, 11_000.0)));
    }

    #[test]
    fn test_speed_applies_after_cap() {
        let mut spec = RenderSpec {
            duration: Some(600_000.0),
            speed: Some(1.5),
            ..Default::default()
        };
        let timing = spec.normalize();
        assert!((timing.effective_ms - 200_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_track_playback_rate_used_when_no_global_speed() {
        let mut slow = item("a", 0.0, 8_000.0);
        slow.playback_rate = Some(0.5);
        let mut fast = item("b", 0.0, 8_000.0);
        fast.playback_rate = Some(4.0);
        let spec = RenderSpec {
            track_items: vec![slow, fast],
            ..Default::default()
        };
        assert_eq!(spec.speed_multiplier(), 4.0);
    }

    #[test]
    fn test_invalid_multiplier_treated_as_one() {
        let spec = RenderSpec {
            speed: Some(0.0),
            ..Default::default()
        };
        assert_eq!(spec.speed_multiplier(), 1.0);

        let spec = RenderSpec {
            speed: Some(f64::NAN),
            ..Default::default()
        };
        assert_eq!(spec.speed_multiplier(), 1.0);
    }

    #[test]
    fn test_duration_falls_back_to_timeline_end() {
        let spec = RenderSpec {
            track_items: vec![item("a", 0.0, 12_000.0)],
            overlays: vec![Overlay {
                id: "o".to_string(),
                display: TimeWindow::new(0.0, 15_000.0),
                details: Value::Null,
            }],
            ..Default::default()
        };
        assert_eq!(spec.requested_duration_ms(), 15_000.0);
    }

    #[test]
    fn test_platform_limit_lowers_cap() {
        let mut spec = RenderSpec {
            duration: Some(120_000.0),
            platform: PlatformConfig {
                max_duration_ms: Some(60_000.0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(spec.normalize().effective_ms, 60_000.0);
    }

    #[test]
    fn test_frames_round_up() {
        let timing = NormalizedTiming {
            requested_ms: 1_010.0,
            capped_ms: 1_010.0,
            multiplier: 1.0,
            effective_ms: 1_010.0,
        };
        assert_eq!(timing.duration_in_frames(30), 31);
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let json = serde_json::json!({
            "trackItems": [],
            "duration": 5000,
            "compositionTheme": "dark"
        });
        let spec: RenderSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.extra.get("compositionTheme"), Some(&Value::from("dark")));
        let back = serde_json::to_value(&spec).unwrap();
        assert_eq!(back["compositionTheme"], "dark");
    }

    #[test]
    fn test_validation_rejects_reversed_window() {
        let spec = RenderSpec {
            track_items: vec![item("bad", 5_000.0, 1_000.0)],
            ..Default::default()
        };
        assert!(spec.validate().is_err());

        let spec = RenderSpec {
            track_items: vec![item("ok", 0.0, 1_000.0)],
            duration: Some(1_000.0),
            ..Default::default()
        };
        assert!(spec.validate().is_ok());
    }
}
