use serde::{Deserialize, Serialize};

/// Status envelope sent alongside every video frame.
///
/// Receivers must ignore keys they do not recognize, so this struct may
/// grow without breaking older clients.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub fps: u32,
    /// Image quality in percent (0-100).
    pub quality: u32,
    /// Server's current RTT estimate in milliseconds.
    pub latency: u64,
    #[serde(rename = "audioEnabled")]
    pub audio_enabled: bool,
    #[serde(rename = "audioLatency")]
    pub audio_latency: u64,
}

/// Metadata envelope for an audio packet.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AudioInfoMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "sampleRate")]
    pub sample_rate: f64,
    pub channels: u32,
    /// Frame count, i.e. samples per channel.
    pub samples: u32,
    /// Seconds since an arbitrary monotonic epoch.
    pub timestamp: f64,
    pub quality: f32,
    pub format: String,
}

pub const AUDIO_KIND: &str = "audio";
pub const AUDIO_FORMAT_INT16: &str = "int16";

impl AudioInfoMessage {
    pub fn new(sample_rate: f64, channels: u32, samples: u32, timestamp: f64, quality: f32) -> Self {
        Self {
            kind: AUDIO_KIND.to_owned(),
            sample_rate,
            channels,
            samples,
            timestamp,
            quality,
            format: AUDIO_FORMAT_INT16.to_owned(),
        }
    }
}

/// Settings update from a client. Every field is optional; an absent
/// field leaves the corresponding setting unchanged. Values are clamped
/// at application time, so out-of-range numbers are not a decode error.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SettingsMessage {
    #[serde(rename = "streamingMode", skip_serializing_if = "Option::is_none", default)]
    pub streaming_mode: Option<String>,
    #[serde(rename = "preferredFPS", skip_serializing_if = "Option::is_none", default)]
    pub preferred_fps: Option<i64>,
    #[serde(rename = "preferredQuality", skip_serializing_if = "Option::is_none", default)]
    pub preferred_quality: Option<i64>,
    #[serde(rename = "captureSource", skip_serializing_if = "Option::is_none", default)]
    pub capture_source: Option<String>,
    #[serde(rename = "selectedWindowId", skip_serializing_if = "Option::is_none", default)]
    pub selected_window_id: Option<u32>,
    #[serde(rename = "selectedDisplayId", skip_serializing_if = "Option::is_none", default)]
    pub selected_display_id: Option<u32>,
    #[serde(rename = "audioEnabled", skip_serializing_if = "Option::is_none", default)]
    pub audio_enabled: Option<bool>,
    #[serde(rename = "audioQuality", skip_serializing_if = "Option::is_none", default)]
    pub audio_quality: Option<f32>,
}

pub const CAPTURE_SOURCE_DISPLAY: &str = "Full Display";
pub const CAPTURE_SOURCE_WINDOW: &str = "Single Window";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: u32,
    pub title: String,
    #[serde(rename = "ownerName")]
    pub owner_name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DisplayInfo {
    pub id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Reply to a windows/displays request. Either array may be empty.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentListMessage {
    pub windows: Vec<WindowInfo>,
    pub displays: Vec<DisplayInfo>,
}

pub const ACTION_GET_WINDOWS_DISPLAYS: &str = "getWindowsDisplays";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ContentRequestMessage {
    pub action: String,
}

impl ContentRequestMessage {
    pub fn windows_displays() -> Self {
        Self {
            action: ACTION_GET_WINDOWS_DISPLAYS.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json_keys() {
        let status = StatusMessage {
            fps: 30,
            quality: 50,
            latency: 12,
            audio_enabled: true,
            audio_latency: 12,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["fps"], 30);
        assert_eq!(json["quality"], 50);
        assert_eq!(json["latency"], 12);
        assert_eq!(json["audioEnabled"], true);
        assert_eq!(json["audioLatency"], 12);
    }

    #[test]
    fn test_status_ignores_unknown_keys() {
        let parsed: StatusMessage = serde_json::from_str(
            r#"{"fps":45,"quality":30,"latency":0,"audioEnabled":false,"audioLatency":0,"futureKey":"x"}"#,
        )
        .unwrap();
        assert_eq!(parsed.fps, 45);
        assert!(!parsed.audio_enabled);
    }

    #[test]
    fn test_settings_partial_body() {
        let parsed: SettingsMessage =
            serde_json::from_str(r#"{"streamingMode":"Performance"}"#).unwrap();
        assert_eq!(parsed.streaming_mode.as_deref(), Some("Performance"));
        assert_eq!(parsed.preferred_fps, None);
        assert_eq!(parsed.audio_enabled, None);
    }

    #[test]
    fn test_settings_unknown_mode_still_parses() {
        // An unrecognized mode string is an application-level concern,
        // never a decode failure.
        let parsed: SettingsMessage =
            serde_json::from_str(r#"{"streamingMode":"Unknown","preferredFPS":120}"#).unwrap();
        assert_eq!(parsed.streaming_mode.as_deref(), Some("Unknown"));
        assert_eq!(parsed.preferred_fps, Some(120));
    }

    #[test]
    fn test_audio_info_wire_names() {
        let info = AudioInfoMessage::new(48000.0, 2, 512, 1.25, 0.8);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["sampleRate"], 48000.0);
        assert_eq!(json["format"], "int16");
        assert_eq!(json["samples"], 512);
    }

    #[test]
    fn test_content_list_round_trip() {
        let list = ContentListMessage {
            windows: vec![WindowInfo {
                id: 7,
                title: "Editor".into(),
                owner_name: "editor-app".into(),
            }],
            displays: vec![DisplayInfo {
                id: 1,
                name: "Built-in".into(),
                width: 2560,
                height: 1600,
            }],
        };
        let json = serde_json::to_string(&list).unwrap();
        assert!(json.contains("\"ownerName\":\"editor-app\""));
        let back: ContentListMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, list);
    }
}
