//! Version gate.
//!
//! Decides feature availability and known-defect windows from the server's
//! reported version. A version that cannot be fetched or parsed is treated
//! as unknown, and an unknown version satisfies nothing.

use fleetq_core::{ExportFormat, ServerVersion, VersionRequirement};
use fleetq_transport::Transport;
use parking_lot::Mutex;

use crate::error::{ControlError, Result};

/// First release with bulk export support.
pub const BULK_EXPORT_MIN: [u32; 4] = [6, 5, 314, 4231];

/// First release with the server-side question parser.
pub const PARSER_MIN: [u32; 2] = [6, 5];

/// Release that added non-CSV export formats and fixed the export crashes.
pub const EXPORT_FIXES: [u32; 4] = [6, 5, 314, 4300];

/// Requirement for bulk export at all.
#[must_use]
pub fn bulk_export_requirement() -> VersionRequirement {
    VersionRequirement::at_least(ServerVersion::from_parts(&BULK_EXPORT_MIN))
}

/// Requirement for the question parser.
#[must_use]
pub fn parser_requirement() -> VersionRequirement {
    VersionRequirement::at_least(ServerVersion::from_parts(&PARSER_MIN))
}

/// Requirement for a specific export format, if it is restricted.
#[must_use]
pub fn export_format_requirement(format: ExportFormat) -> Option<VersionRequirement> {
    match format {
        ExportFormat::Csv => None,
        ExportFormat::Xml | ExportFormat::XmlObject | ExportFormat::Cef => Some(
            VersionRequirement::at_least(ServerVersion::from_parts(&EXPORT_FIXES)),
        ),
    }
}

/// Versions satisfying this are outside the export crash window.
#[must_use]
pub fn export_crash_fixed_requirement() -> VersionRequirement {
    VersionRequirement::at_least(ServerVersion::from_parts(&EXPORT_FIXES))
}

/// Caches the server version for the lifetime of an orchestrator.
#[derive(Debug, Default)]
pub struct VersionGate {
    cached: Mutex<Option<ServerVersion>>,
}

impl VersionGate {
    /// Create a gate with nothing cached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached version, if one has been resolved.
    #[must_use]
    pub fn cached(&self) -> Option<ServerVersion> {
        self.cached.lock().clone()
    }

    /// Resolve the server version, fetching it on first use.
    ///
    /// Failures are not cached, so the next call tries again.
    pub async fn version<T: Transport + ?Sized>(&self, transport: &T) -> Option<ServerVersion> {
        if let Some(version) = self.cached() {
            return Some(version);
        }

        let raw = match transport.server_version().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Could not fetch server version");
                return None;
            }
        };

        match ServerVersion::parse(&raw) {
            Ok(version) => {
                tracing::debug!(version = %version, "Resolved server version");
                *self.cached.lock() = Some(version.clone());
                Some(version)
            }
            Err(e) => {
                tracing::warn!(raw = %raw, error = %e, "Server version is not usable");
                None
            }
        }
    }

    /// True iff the server version is known and satisfies `requirement`.
    pub async fn supports<T: Transport + ?Sized>(
        &self,
        transport: &T,
        requirement: &VersionRequirement,
    ) -> bool {
        self.version(transport)
            .await
            .is_some_and(|version| requirement.is_satisfied_by(&version))
    }

    /// Return the server version, or fail if it does not satisfy `requirement`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::UnsupportedVersion` naming the feature and the
    /// detected version (`unknown` when it could not be resolved).
    pub async fn require<T: Transport + ?Sized>(
        &self,
        transport: &T,
        feature: &str,
        requirement: &VersionRequirement,
    ) -> Result<ServerVersion> {
        match self.version(transport).await {
            Some(version) if requirement.is_satisfied_by(&version) => Ok(version),
            found => Err(unsupported(feature, found.as_ref(), requirement)),
        }
    }
}

/// Build the error for an unmet requirement.
pub(crate) fn unsupported(
    feature: &str,
    version: Option<&ServerVersion>,
    requirement: &VersionRequirement,
) -> ControlError {
    ControlError::UnsupportedVersion {
        feature: feature.to_string(),
        version: version.map_or_else(|| "unknown".to_string(), ToString::to_string),
        requirement: requirement.to_string(),
    }
}
