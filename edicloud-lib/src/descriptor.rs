use crate::markup::Markup;
use serde::Serialize;
use std::fmt;

/// Status code returned by the discovery service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProbeStatus {
    /// `1020`
    Online,
    /// `1070`
    AccessGranted,
    /// `1120`
    BadPassword,
    /// `5000`
    Offline,
    Other(String),
}

impl ProbeStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "1020" => Self::Online,
            "1070" => Self::AccessGranted,
            "1120" => Self::BadPassword,
            "5000" => Self::Offline,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Online => "1020",
            Self::AccessGranted => "1070",
            Self::BadPassword => "1120",
            Self::Offline => "5000",
            Self::Other(code) => code,
        }
    }

    /// Whether the service accepted the credentials.
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Online | Self::AccessGranted)
    }

    pub fn is_online(&self) -> bool {
        !matches!(self, Self::Offline)
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "Online"),
            Self::AccessGranted => write!(f, "Online (access granted)"),
            Self::BadPassword => write!(f, "Bad password"),
            Self::Offline => write!(f, "Offline"),
            Self::Other(code) => write!(f, "Unknown code: {}", code),
        }
    }
}

/// Human readable description of a raw discovery status code.
pub fn describe_code(code: &str) -> String {
    ProbeStatus::from_code(code).to_string()
}

/// Outcome of one discovery probe.
///
/// Relay fields are only meaningful when `success` is set and `relay_id`
/// is non-empty; [`DeviceDescriptor::relay_endpoint`] checks both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub device_id: String,
    /// The probe produced a parseable reply
    pub success: bool,
    pub status: Option<ProbeStatus>,
    pub online: bool,
    pub relay_ip: Option<String>,
    pub relay_port: u16,
    pub relay_id: Option<String>,
    pub device_ip: Option<String>,
    pub alias: Option<String>,
    pub model: Option<String>,
    pub device_type: Option<String>,
    pub product_id: Option<String>,
    /// Set only when the service accepted the credentials
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Why the probe failed, when it did
    pub failure: Option<String>,
}

impl DeviceDescriptor {
    /// Descriptor for a probe that produced no usable reply.
    pub fn failed(device_id: &str, reason: impl Into<String>) -> Self {
        Self {
            device_id: device_id.to_string(),
            failure: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Build a descriptor from a decrypted discovery reply.
    pub fn from_reply(device_id: &str, doc: &Markup, password: &str) -> Self {
        let owned = |name: &str| doc.child_value(name).map(str::to_string);
        let status = doc.child_value("code").map(ProbeStatus::from_code);
        let online = status.as_ref().map(ProbeStatus::is_online).unwrap_or(true);
        let authorized = status.as_ref().is_some_and(ProbeStatus::is_authorized);
        Self {
            device_id: device_id.to_string(),
            success: true,
            online,
            relay_ip: owned("relayip"),
            relay_port: doc
                .child_value("relayreqport")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(0),
            relay_id: owned("relayid"),
            device_ip: owned("ip"),
            alias: owned("alias"),
            model: owned("model"),
            device_type: owned("type"),
            product_id: owned("prodid"),
            password: authorized.then(|| password.to_string()),
            status,
            failure: None,
        }
    }

    /// Relay id, when the device can be reached through the cloud.
    pub fn relay_id(&self) -> Option<&str> {
        self.relay_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    /// Relay address and id, when the probe succeeded and assigned a relay.
    pub fn relay_endpoint(&self) -> Option<(&str, u16, &str)> {
        if !self.success {
            return None;
        }
        let relay_id = self.relay_id()?;
        let relay_ip = self.relay_ip.as_deref()?;
        Some((relay_ip, self.relay_port, relay_id))
    }

    /// Whether a relay session can be opened from this descriptor.
    pub fn is_reachable(&self) -> bool {
        self.relay_endpoint().is_some()
    }

    /// Distinguishable, never empty, description of this probe's outcome.
    pub fn status_description(&self) -> String {
        if let Some(reason) = &self.failure {
            return format!("Discovery failed: {}", reason);
        }
        match &self.status {
            Some(status) if self.is_reachable() => status.to_string(),
            Some(status) => format!("{} (code {}), no relay assigned", status, status.code()),
            None => "No status code in discovery reply".to_string(),
        }
    }
}
