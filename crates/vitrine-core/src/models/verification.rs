use serde::Serialize;

use super::outcome::CorruptionDiagnostic;

/// Result of the post-upload check of one stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// The object was listed under its exact name.
    pub object_found: bool,
    /// Listing attempts spent looking for it.
    pub list_attempts: u32,
    /// Recorded content type equals (or is an alias of) the expected one.
    /// False while the backend reports no content type and no probe confirmed it.
    pub metadata_content_type_matches: bool,
    /// Recorded size equals the uploaded size, or the backend did not report one.
    pub size_matches: bool,
    pub public_url_reachable: bool,
    /// Content type recorded by the backend, when it differs from expectation.
    pub observed_content_type: Option<String>,
    /// Content type reported by the public URL probe.
    pub probe_content_type: Option<String>,
    pub public_url: String,
    /// Last listing error when every attempt failed outright.
    pub lookup_error: Option<String>,
    pub corruption: Option<CorruptionDiagnostic>,
}

impl VerificationReport {
    pub fn is_corrupted(&self) -> bool {
        self.corruption.is_some()
    }

    /// Object is intact but the public URL did not prove it readable.
    pub fn needs_fallback(&self) -> bool {
        self.object_found && self.corruption.is_none() && !self.public_url_reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::outcome::CorruptionCause;

    fn intact() -> VerificationReport {
        VerificationReport {
            object_found: true,
            list_attempts: 1,
            metadata_content_type_matches: true,
            size_matches: true,
            public_url_reachable: true,
            public_url: "https://cdn.example.com/a.png".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_intact_report_needs_nothing() {
        let report = intact();
        assert!(!report.is_corrupted());
        assert!(!report.needs_fallback());
    }

    #[test]
    fn test_unreachable_public_url_needs_fallback() {
        let report = VerificationReport {
            public_url_reachable: false,
            ..intact()
        };
        assert!(report.needs_fallback());
    }

    #[test]
    fn test_corrupted_report_never_falls_back() {
        let report = VerificationReport {
            public_url_reachable: false,
            corruption: Some(CorruptionDiagnostic {
                stored_path: "uploads/a.png".to_string(),
                cause: CorruptionCause::MissingAfterUpload,
                purged: true,
            }),
            ..intact()
        };
        assert!(report.is_corrupted());
        assert!(!report.needs_fallback());
    }
}
