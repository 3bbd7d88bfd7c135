//! Encoding format negotiation
//!
//! Negotiation is pure and runs before any permission is requested, so a
//! platform with no usable encoder fails fast without touching hardware.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AudioError, AudioResult};

/// An encoding identifier paired with its container extension
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodingFormat {
    /// MIME type, e.g. `audio/webm;codecs=opus`
    pub mime: String,
    /// File extension without the dot, e.g. `webm`
    pub extension: String,
}

impl EncodingFormat {
    pub fn new(mime: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            mime: mime.into(),
            extension: extension.into(),
        }
    }

    pub fn wav() -> Self {
        Self::new("audio/wav", "wav")
    }

    pub fn is_wav(&self) -> bool {
        self.extension.eq_ignore_ascii_case("wav")
    }
}

/// Default preference list, best first
pub fn default_preferences() -> Vec<EncodingFormat> {
    vec![
        EncodingFormat::new("audio/webm;codecs=opus", "webm"),
        EncodingFormat::new("audio/mp4", "m4a"),
        EncodingFormat::new("audio/ogg;codecs=opus", "ogg"),
        EncodingFormat::wav(),
    ]
}

/// Answers whether the platform can encode a given MIME type
pub trait CapabilityProbe: Send + Sync {
    fn supports(&self, mime: &str) -> bool;
}

/// Fixed capability set
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities {
    supported: HashSet<String>,
}

impl StaticCapabilities {
    pub fn new<I, S>(mimes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: mimes.into_iter().map(Into::into).collect(),
        }
    }
}

impl CapabilityProbe for StaticCapabilities {
    fn supports(&self, mime: &str) -> bool {
        self.supported.contains(mime)
    }
}

/// Outcome of negotiation. Never an error: callers must check it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    Supported(EncodingFormat),
    Unsupported,
}

impl Negotiation {
    pub fn into_format(self) -> AudioResult<EncodingFormat> {
        match self {
            Negotiation::Supported(format) => Ok(format),
            Negotiation::Unsupported => Err(AudioError::FormatUnsupported),
        }
    }
}

pub struct FormatNegotiator;

impl FormatNegotiator {
    /// Return the first preference the probe supports
    pub fn negotiate<P>(preferences: &[EncodingFormat], probe: &P) -> Negotiation
    where
        P: CapabilityProbe + ?Sized,
    {
        for format in preferences {
            if probe.supports(&format.mime) {
                debug!("Negotiated encoding {} (.{})", format.mime, format.extension);
                return Negotiation::Supported(format.clone());
            }
            debug!("Encoding {} not supported", format.mime);
        }

        warn!(
            "None of {} preferred encodings is supported",
            preferences.len()
        );
        Negotiation::Unsupported
    }
}

/// Class of capture device; decides how often encoded chunks are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    #[default]
    Desktop,
    /// Phones and other constrained devices get larger, batched chunks
    Constrained,
}

impl DeviceClass {
    pub fn timeslice(self) -> Duration {
        match self {
            DeviceClass::Desktop => Duration::from_millis(100),
            DeviceClass::Constrained => Duration::from_millis(1000),
        }
    }
}

/// Capabilities resolved once per session and carried unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub format: EncodingFormat,
    pub device_class: DeviceClass,
    pub timeslice: Duration,
}

impl CapabilityDescriptor {
    pub fn resolve<P>(
        preferences: &[EncodingFormat],
        probe: &P,
        device_class: DeviceClass,
    ) -> AudioResult<Self>
    where
        P: CapabilityProbe + ?Sized,
    {
        let format = FormatNegotiator::negotiate(preferences, probe).into_format()?;
        Ok(Self {
            format,
            device_class,
            timeslice: device_class.timeslice(),
        })
    }
}
