//! Envelope integration configuration.
//!
//! Remote method names and the outbound-call timeout. Defaults match the
//! CDR deployment; both can be overridden from the environment.

use std::time::Duration;

/// Names of the remote envelope methods and the timeout applied to every
/// outbound call (RPC listing, file fetch, push).
#[derive(Debug, Clone)]
pub struct EnvelopeConfig {
    /// Remote procedure enumerating an envelope's XML files by schema.
    pub get_xml_files_method: String,
    /// Path segment appended to the envelope URL for the save-XML POST.
    pub save_xml_method: String,
    /// Bounded timeout for each outbound network call.
    pub timeout: Duration,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            get_xml_files_method: "getXmlFiles".to_string(),
            save_xml_method: "saveXml".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl EnvelopeConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Recognized variables: `CDR_ENVELOPE_GET_XML_FILES`, `CDR_SAVE_XML`,
    /// `CDR_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(method) = std::env::var("CDR_ENVELOPE_GET_XML_FILES") {
            config.get_xml_files_method = method;
        }
        if let Ok(method) = std::env::var("CDR_SAVE_XML") {
            config.save_xml_method = method;
        }
        if let Ok(secs) = std::env::var("CDR_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.timeout = Duration::from_secs(secs);
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cdr_deployment() {
        let config = EnvelopeConfig::default();
        assert_eq!(config.get_xml_files_method, "getXmlFiles");
        assert_eq!(config.save_xml_method, "saveXml");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
