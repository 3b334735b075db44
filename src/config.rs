//! ConfigSurface (C7): declarative startup options.
//!
//! Grounded on `crates/config/src/settings.rs` in the teacher — same
//! `config` crate, same `default -> local -> environment` layering and
//! `set_default` calls, same `__`-separated prefixed environment source.
//! Narrowed to the fields spec §4.7 names, plus the `ANNOUNCED_IP` /
//! `RTC_MIN_PORT` / `RTC_MAX_PORT` / `PORT` / `USE_SSL` bindings from §6,
//! bound unprefixed (there is exactly one settings surface here, unlike
//! the teacher's multi-domain `Settings`).

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Built-in fallback for `media.codecs` and `media.transport_options`,
/// loaded as the lowest-priority source. Nested list-of-tables defaults
/// like this one don't fit `set_default`'s flat key path syntax, so they
/// go through `File::from_str` instead, same as the teacher loads
/// `config/default.toml` from disk.
const BUILTIN_DEFAULTS: &str = r#"
[[media.codecs]]
kind = "audio"
mime_type = "audio/opus"
clock_rate = 48000
channels = 2

[[media.codecs]]
kind = "video"
mime_type = "video/vp8"
clock_rate = 90000

[media.transport_options]
enable_udp = true
enable_tcp = true
prefer_udp = true
enable_sctp = false
initial_available_outgoing_bitrate = 600000
"#;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodecSettings {
    pub kind: String,
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportOptions {
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,
    pub enable_sctp: bool,
    pub initial_available_outgoing_bitrate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    pub worker_count: u32,
    pub announced_ip: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
    pub codecs: Vec<CodecSettings>,
    pub transport_options: TransportOptions,
    pub max_participants_per_conference: u32,
}

impl MediaSettings {
    /// The opaque codec-list JSON handed to `MediaEngine::Worker::create_router`.
    /// The engine boundary never needs the structured form, only the wire
    /// shape clients/engines expect (`mimeType`, `clockRate`, ...).
    pub fn codecs_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.codecs).expect("codec settings always serialize")
    }

    #[cfg(test)]
    pub fn default_for_tests() -> Self {
        Self {
            worker_count: 1,
            announced_ip: "127.0.0.1".to_string(),
            rtc_min_port: 40000,
            rtc_max_port: 49999,
            codecs: vec![
                CodecSettings {
                    kind: "audio".to_string(),
                    mime_type: "audio/opus".to_string(),
                    clock_rate: 48000,
                    channels: Some(2),
                    parameters: None,
                },
                CodecSettings {
                    kind: "video".to_string(),
                    mime_type: "video/vp8".to_string(),
                    clock_rate: 90000,
                    channels: None,
                    parameters: None,
                },
            ],
            transport_options: TransportOptions {
                enable_udp: true,
                enable_tcp: true,
                prefer_udp: true,
                enable_sctp: false,
                initial_available_outgoing_bitrate: 600_000,
            },
            max_participants_per_conference: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    pub port: u16,
    pub use_tls: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub app: AppSettings,
    pub media: MediaSettings,
}

/// Bare-name environment bindings from spec §6, layered on top of the
/// `__`-separated `Environment` source so `ANNOUNCED_IP=...` works without
/// requiring callers to also know the nested key shape.
const BARE_ENV_BINDINGS: &[(&str, &str)] = &[
    ("PORT", "app.port"),
    ("USE_SSL", "app.use_tls"),
    ("ANNOUNCED_IP", "media.announced_ip"),
    ("RTC_MIN_PORT", "media.rtc_min_port"),
    ("RTC_MAX_PORT", "media.rtc_max_port"),
];

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::from_str(BUILTIN_DEFAULTS, FileFormat::Toml))
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::default().separator("__"))
            .set_default("app.port", 3000)?
            .set_default("app.use_tls", false)?
            .set_default("media.worker_count", num_cpus())?
            .set_default("media.announced_ip", "127.0.0.1")?
            .set_default("media.rtc_min_port", 40000)?
            .set_default("media.rtc_max_port", 49999)?
            .set_default("media.max_participants_per_conference", 0)?;

        for (env_name, key) in BARE_ENV_BINDINGS {
            if let Ok(value) = std::env::var(env_name) {
                builder = builder.set_override(*key, value)?;
            }
        }

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate_codecs()?;
        Ok(settings)
    }

    /// Spec §4.7: the codec list must include at least one audio and one
    /// video entry. Enforced at load time so a misconfigured deployment
    /// fails fast instead of surfacing `IncompatibleCodecs` for every join.
    fn validate_codecs(&self) -> Result<(), ConfigError> {
        let has_audio = self.media.codecs.iter().any(|c| c.kind == "audio");
        let has_video = self.media.codecs.iter().any(|c| c.kind == "video");
        if !has_audio || !has_video {
            return Err(ConfigError::Message(
                "media.codecs must include at least one audio and one video codec".to_string(),
            ));
        }
        Ok(())
    }
}

fn num_cpus() -> i64 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i64)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_settings_for_tests_has_valid_codec_mix() {
        let settings = MediaSettings::default_for_tests();
        assert!(settings.codecs.iter().any(|c| c.kind == "audio"));
        assert!(settings.codecs.iter().any(|c| c.kind == "video"));
    }

    #[test]
    fn codecs_json_round_trips_mime_type() {
        let settings = MediaSettings::default_for_tests();
        let json = settings.codecs_json();
        let names: Vec<_> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["mime_type"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"audio/opus".to_string()));
    }
}
