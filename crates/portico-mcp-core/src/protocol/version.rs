//! Protocol version handling and negotiation.
//!
//! Versions are calendar dates (`YYYY-MM-DD`). The negotiator accepts a
//! requested version when it is supported, otherwise answers with the
//! latest supported version; the client decides whether to continue.

use serde::{Deserialize, Serialize};

/// MCP protocol version as a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl ProtocolVersion {
    pub const fn new(year: u16, month: u8, day: u8) -> Self {
        Self { year, month, day }
    }

    /// Parse a `YYYY-MM-DD` version string.
    pub fn parse(version: &str) -> Result<Self, VersionParseError> {
        let parts: Vec<&str> = version.split('-').collect();
        if parts.len() != 3 || parts[0].len() != 4 || parts[1].len() != 2 || parts[2].len() != 2 {
            return Err(VersionParseError::InvalidFormat);
        }
        let year = parts[0]
            .parse::<u16>()
            .map_err(|_| VersionParseError::InvalidYear)?;
        let month = parts[1]
            .parse::<u8>()
            .map_err(|_| VersionParseError::InvalidMonth)?;
        let day = parts[2]
            .parse::<u8>()
            .map_err(|_| VersionParseError::InvalidDay)?;
        if month == 0 || month > 12 {
            return Err(VersionParseError::InvalidMonth);
        }
        if day == 0 || day > 31 {
            return Err(VersionParseError::InvalidDay);
        }
        Ok(Self { year, month, day })
    }

    /// Latest version this implementation speaks.
    pub const fn latest() -> Self {
        Self::new(2025, 6, 18)
    }

    /// Supported versions, oldest first.
    pub fn supported() -> Vec<Self> {
        vec![Self::new(2024, 11, 5), Self::new(2025, 3, 26), Self::new(2025, 6, 18)]
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VersionParseError {
    #[error("invalid version format, expected YYYY-MM-DD")]
    InvalidFormat,
    #[error("invalid year component")]
    InvalidYear,
    #[error("invalid month component")]
    InvalidMonth,
    #[error("invalid day component")]
    InvalidDay,
}

/// Negotiates the protocol version during initialization.
#[derive(Debug, Clone)]
pub struct VersionNegotiator {
    supported: Vec<ProtocolVersion>,
}

impl VersionNegotiator {
    pub fn new(supported: Vec<ProtocolVersion>) -> Self {
        Self { supported }
    }

    /// Server-side negotiation: echo a supported requested version,
    /// otherwise answer with the latest supported one. An unparsable
    /// request string also falls back to the latest version; the
    /// client terminates if that is unacceptable.
    pub fn negotiate(&self, requested: &str) -> ProtocolVersion {
        if let Ok(version) = ProtocolVersion::parse(requested) {
            if self.supported.contains(&version) {
                return version;
            }
        }
        self.latest()
    }

    pub fn supports(&self, version: &ProtocolVersion) -> bool {
        self.supported.contains(version)
    }

    pub fn latest(&self) -> ProtocolVersion {
        self.supported
            .iter()
            .max()
            .copied()
            .unwrap_or_else(ProtocolVersion::latest)
    }

    pub fn supported_versions(&self) -> &[ProtocolVersion] {
        &self.supported
    }
}

impl Default for VersionNegotiator {
    fn default() -> Self {
        Self::new(ProtocolVersion::supported())
    }
}
