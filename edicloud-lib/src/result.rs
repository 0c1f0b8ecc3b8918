use crate::constants::HOURS_PER_DAY;
use crate::descriptor::DeviceDescriptor;
use bytes::Bytes;
use serde::Serialize;

/// Everything learned about a device during one invocation.
///
/// Filled in step by step as replies arrive; fields a given action never
/// touches keep their defaults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceResult {
    pub device_id: String,
    pub discovery: DeviceDescriptor,
    /// At least one relay command got a reply
    pub relay_success: bool,

    pub state: Option<String>,
    pub next_toggle: Option<String>,
    /// Status text of the last `setup` command
    pub command_status: Option<String>,

    /// Raw hex slot per weekday, Sunday first
    pub schedule: Vec<Option<String>>,
    pub schedule_explanation: Option<String>,

    /// Watts
    pub power: f64,
    /// Amperes
    pub current: f64,
    /// Watt-hours
    pub energy_day: f64,
    pub energy_week: f64,
    pub energy_month: f64,
    /// One dash-joined entry of hourly values per day
    pub energy_history: Vec<String>,

    pub email_sender: Option<String>,
    pub email_recipient: Option<String>,
    pub run_cus: Option<String>,
    pub run_model: Option<String>,
    pub run_fw: Option<String>,

    /// Suggested file name for `image`
    pub file_generated: Option<String>,
    #[serde(skip)]
    pub image: Option<Bytes>,
}

impl DeviceResult {
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Split dash-separated hourly values into per-day buckets of 24,
/// keeping the original order. The last bucket may be shorter.
pub fn chunk_history(history: &str) -> Vec<String> {
    if history.is_empty() {
        return Vec::new();
    }
    let values: Vec<&str> = history.split('-').collect();
    values.chunks(HOURS_PER_DAY).map(|day| day.join("-")).collect()
}
