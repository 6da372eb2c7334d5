use std::env;
use std::time::Duration;

const DEFAULT_EYE_BASE: f32 = 0.05;
const DEFAULT_FRAME_TIMEOUT_MS: u64 = 10_000;

/// Runtime settings shared by every configuration on this server.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Inter-ocular distance in meters, used when a view has no
    /// tracked observer.
    pub eye_base: f32,
    /// Wall-clock budget for a frame before it is abandoned.
    pub frame_timeout: Duration,
}

impl Settings {
    /// Load settings from `REEF_*` environment variables.
    pub fn from_env() -> Self {
        let eye_base = env::var("REEF_EYE_BASE")
            .ok()
            .and_then(|value| value.parse::<f32>().ok())
            .filter(|value| *value > 0.0)
            .unwrap_or(DEFAULT_EYE_BASE);
        let frame_timeout = env::var("REEF_FRAME_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_FRAME_TIMEOUT_MS));
        Self {
            eye_base,
            frame_timeout,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            eye_base: DEFAULT_EYE_BASE,
            frame_timeout: Duration::from_millis(DEFAULT_FRAME_TIMEOUT_MS),
        }
    }
}
