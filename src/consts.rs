pub const DEFAULT_TOPIC: &str = "general";
pub const DEFAULT_FALLBACK_HOST: &str = "192.168.0.7";
pub const DEFAULT_BACKEND_PORT: u16 = 3000;

pub const DEFAULT_TELEMETRY_CAPACITY: usize = 64;
pub const MIN_TELEMETRY_CAPACITY: usize = 8;

pub const HEALTH_REQUEST_TIMEOUT_SECS: u64 = 15;

pub const TOKEN_PREVIEW_CHARS: usize = 10;
pub const NOTICE_MAX_CHARS: usize = 200;
pub const TELEMETRY_MAX_CHARS: usize = 300;

pub const DEFAULT_CHANNEL_ID: &str = "default";
pub const DEFAULT_CHANNEL_VIBRATION_MS: [u64; 4] = [0, 250, 250, 250];
pub const DEFAULT_CHANNEL_ACCENT: &str = "#FF231F7C";
