//! File conversion collaborator boundary.

use crate::error::{CdrError, Result};
use crate::model::UserFile;

/// Byte-level format conversion, delegated to an external converter.
///
/// The push flow applies it when a file carries a `conversion_id`; the
/// conversion itself (XSLT pipelines etc.) lives outside this crate.
pub trait ConversionService: Send + Sync {
    /// Converts the file's content per the given conversion identifier.
    fn convert(&self, file: &UserFile, conversion_id: i32) -> Result<Vec<u8>>;
}

/// Converter for deployments without a conversion backend: any requested
/// conversion is an error.
pub struct NoConversion;

impl ConversionService for NoConversion {
    fn convert(&self, _file: &UserFile, conversion_id: i32) -> Result<Vec<u8>> {
        Err(CdrError::Conversion {
            conversion_id,
            reason: "no conversion backend configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_backend_is_a_conversion_failure() {
        let file = UserFile {
            conversion_id: Some(7),
            ..Default::default()
        };
        match NoConversion.convert(&file, 7) {
            Err(CdrError::Conversion { conversion_id, .. }) => assert_eq!(conversion_id, 7),
            other => panic!("expected conversion error, got {other:?}"),
        }
    }
}
