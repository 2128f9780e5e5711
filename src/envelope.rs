//! CDR envelope service: file listing, edited-file push and remote fetch.
//!
//! The listing flow is one RPC round trip followed by a single typed
//! transform ([`files_by_schema`]). The push flow is one multipart POST.
//! Neither retries; every failure surfaces to the caller per the crate
//! error taxonomy.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use tracing::{error, info, warn};

use crate::config::EnvelopeConfig;
use crate::convert::ConversionService;
use crate::error::{CdrError, Result};
use crate::model::{CdrRequest, FilesBySchema, UserFile, XmlFile, XmlSaveResult};
use crate::rpc::{RpcClient, RpcClientConfig, RpcValue};

/// One part of the save-XML multipart body, in submission order.
///
/// Kept as plain data so the body shape is testable without a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavePart {
    /// Binary `file` part, content-type `text/xml`.
    File { filename: String, content: Vec<u8> },
    /// Plain-text form field.
    Text { name: &'static str, value: String },
}

/// Client of the remote envelope: listing over XML-RPC, push and fetch over
/// plain HTTP.
pub struct CdrEnvelopeService {
    rpc: Arc<dyn RpcClient>,
    http: reqwest::Client,
    conversions: Arc<dyn ConversionService>,
    config: EnvelopeConfig,
}

impl CdrEnvelopeService {
    pub fn new(
        rpc: Arc<dyn RpcClient>,
        conversions: Arc<dyn ConversionService>,
        config: EnvelopeConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(CdrError::remote)?;
        Ok(Self {
            rpc,
            http,
            conversions,
            config,
        })
    }

    /// Lists the envelope's XML files grouped by schema.
    ///
    /// Exactly one RPC round trip. An absent payload yields an empty map;
    /// an unexpected payload shape is a contract violation surfaced as
    /// [`CdrError::MalformedUpstreamResponse`].
    pub async fn get_xml_files(&self, request: &CdrRequest) -> Result<FilesBySchema> {
        let config = RpcClientConfig::for_request(request)?;
        let raw = self
            .rpc
            .execute(&config, &self.config.get_xml_files_method, &[])
            .await?;
        files_by_schema(&raw)
    }

    /// Pushes an edited file back into its envelope.
    ///
    /// The file must originate from the envelope (`from_cdr`); anything
    /// else is a caller bug rejected before any network call. A non-200
    /// answer becomes a domain-level failure result, not an error.
    pub async fn push_xml_file(&self, file: &UserFile) -> Result<XmlSaveResult> {
        if !file.from_cdr {
            error!(name = %file.name, "file does not belong to CDR, refusing push");
            return Err(CdrError::InvalidOperation);
        }

        let parts = self.save_request_parts(file)?;
        let save_url = format!("{}/{}", file.envelope, self.config.save_xml_method);

        let mut form = Form::new();
        for part in parts {
            form = match part {
                SavePart::File { filename, content } => form.part(
                    "file",
                    Part::bytes(content)
                        .file_name(filename)
                        .mime_str("text/xml")
                        .map_err(CdrError::remote)?,
                ),
                SavePart::Text { name, value } => form.text(name, value),
            };
        }

        let mut request = self.http.post(&save_url).multipart(form);
        if let Some(authorization) = file.authorization.as_deref().filter(|a| !a.is_empty()) {
            request = request.header(AUTHORIZATION, authorization);
        }

        let response = request.send().await.map_err(CdrError::remote)?;
        let status = response.status();
        if status != StatusCode::OK {
            // Best-effort body capture for diagnostics; the caller only
            // sees the fixed rejection message.
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body, %save_url, "envelope rejected saveXml request");
            return Ok(XmlSaveResult::error("Service unavailable."));
        }
        let body = response.text().await.map_err(CdrError::remote)?;
        info!(body, %save_url, "response from saveXml");
        Ok(XmlSaveResult::parse(&body))
    }

    /// Builds the multipart body parts for the save-XML request, in order.
    ///
    /// When the file carries a conversion id the binary part holds the
    /// converted bytes; the restriction fields appear only when requested.
    pub fn save_request_parts(&self, file: &UserFile) -> Result<Vec<SavePart>> {
        let content = match file.conversion_id {
            Some(conversion_id) => self.conversions.convert(file, conversion_id)?,
            None => file.content.clone().unwrap_or_default(),
        };

        let mut parts = vec![
            SavePart::File {
                filename: file.name.clone(),
                content,
            },
            SavePart::Text {
                name: "file_id",
                value: file.name.clone(),
            },
            SavePart::Text {
                name: "title",
                value: file.title.clone().unwrap_or_default(),
            },
        ];
        if file.apply_restriction {
            parts.push(SavePart::Text {
                name: "applyRestriction",
                value: "1".to_string(),
            });
            parts.push(SavePart::Text {
                name: "restricted",
                value: if file.restricted { "1" } else { "0" }.to_string(),
            });
        }
        Ok(parts)
    }

    /// Fetches a remote file's raw bytes for editing.
    ///
    /// Any non-success status or transport failure is
    /// [`CdrError::FileNotAvailable`]; nothing is swallowed.
    pub async fn fetch_file(&self, url: &str, authorization: Option<&str>) -> Result<Vec<u8>> {
        let mut request = self.http.get(url);
        if let Some(authorization) = authorization.filter(|a| !a.is_empty()) {
            request = request.header(AUTHORIZATION, authorization);
        }
        let response = request.send().await.map_err(|e| {
            warn!(url, error = %e, "remote file fetch failed");
            CdrError::FileNotAvailable { url: url.into() }
        })?;
        if !response.status().is_success() {
            warn!(url, status = %response.status(), "remote file fetch rejected");
            return Err(CdrError::FileNotAvailable { url: url.into() });
        }
        let bytes = response.bytes().await.map_err(|e| {
            warn!(url, error = %e, "remote file body read failed");
            CdrError::FileNotAvailable { url: url.into() }
        })?;
        Ok(bytes.to_vec())
    }
}

/// Transforms the raw listing response into [`FilesBySchema`].
///
/// Expects a struct of `schema → array of [fullName, title]` pairs. A `Nil`
/// payload is legal and yields an empty map with a diagnostic; anything
/// else out of shape fails with the raw payload captured.
pub fn files_by_schema(raw: &RpcValue) -> Result<FilesBySchema> {
    let mut result = FilesBySchema::new();
    match raw {
        RpcValue::Nil => {
            warn!("expected not null response from envelope service");
        }
        RpcValue::Struct(members) => {
            for (schema, bucket) in members {
                let files = bucket
                    .as_array()
                    .ok_or_else(|| malformed_listing(raw, "schema bucket is not an array"))?;
                for entry in files {
                    let pair = entry
                        .as_array()
                        .ok_or_else(|| malformed_listing(raw, "file entry is not an array"))?;
                    if pair.len() != 2 {
                        return Err(malformed_listing(raw, "file entry arity is not 2"));
                    }
                    let full_name = pair[0]
                        .as_str()
                        .ok_or_else(|| malformed_listing(raw, "file name is not a string"))?;
                    let title = pair[1]
                        .as_str()
                        .ok_or_else(|| malformed_listing(raw, "file title is not a string"))?;
                    result.add(schema, XmlFile::new(full_name, title));
                }
            }
        }
        _ => return Err(malformed_listing(raw, "response is not a struct")),
    }
    info!(schemas = result.len(), "xml files received from envelope");
    Ok(result)
}

fn malformed_listing(raw: &RpcValue, detail: &str) -> CdrError {
    error!(detail, payload = ?raw, "unexpected envelope listing shape");
    CdrError::MalformedUpstreamResponse {
        payload: format!("{raw:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::convert::NoConversion;

    struct UnusedRpc;

    #[async_trait]
    impl RpcClient for UnusedRpc {
        async fn execute(
            &self,
            _config: &RpcClientConfig,
            _method: &str,
            _params: &[RpcValue],
        ) -> Result<RpcValue> {
            panic!("no RPC call expected in this test")
        }
    }

    fn service() -> CdrEnvelopeService {
        CdrEnvelopeService::new(
            Arc::new(UnusedRpc),
            Arc::new(NoConversion),
            EnvelopeConfig::default(),
        )
        .unwrap()
    }

    fn listing(entries: Vec<(&str, Vec<Vec<&str>>)>) -> RpcValue {
        RpcValue::Struct(
            entries
                .into_iter()
                .map(|(schema, files)| {
                    (
                        schema.to_string(),
                        RpcValue::Array(
                            files
                                .into_iter()
                                .map(|pair| {
                                    RpcValue::Array(
                                        pair.into_iter().map(RpcValue::from).collect(),
                                    )
                                })
                                .collect(),
                        ),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn transform_preserves_schema_and_file_order() {
        let raw = listing(vec![
            (
                "schemaB",
                vec![
                    vec!["http://x/b1.xml", "B one"],
                    vec!["http://x/b2.xml", "B two"],
                ],
            ),
            ("schemaA", vec![vec!["http://x/a1.xml", "A one"]]),
        ]);

        let files = files_by_schema(&raw).unwrap();
        let schemas: Vec<&str> = files.schemas().collect();
        assert_eq!(schemas, vec!["schemaB", "schemaA"]);
        let bucket = files.get("schemaB").unwrap();
        assert_eq!(bucket[0], XmlFile::new("http://x/b1.xml", "B one"));
        assert_eq!(bucket[1], XmlFile::new("http://x/b2.xml", "B two"));
    }

    #[test]
    fn transform_of_nil_is_empty_not_error() {
        let files = files_by_schema(&RpcValue::Nil).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn transform_rejects_wrong_arity() {
        let raw = listing(vec![("schemaA", vec![vec!["http://x/a.xml"]])]);
        assert!(matches!(
            files_by_schema(&raw),
            Err(CdrError::MalformedUpstreamResponse { .. })
        ));
    }

    #[test]
    fn transform_rejects_non_struct_root_and_non_string_members() {
        assert!(matches!(
            files_by_schema(&RpcValue::Int(1)),
            Err(CdrError::MalformedUpstreamResponse { .. })
        ));

        let raw = RpcValue::Struct(vec![(
            "schemaA".into(),
            RpcValue::Array(vec![RpcValue::Array(vec![
                RpcValue::Int(4),
                RpcValue::from("title"),
            ])]),
        )]);
        assert!(matches!(
            files_by_schema(&raw),
            Err(CdrError::MalformedUpstreamResponse { .. })
        ));
    }

    fn cdr_file() -> UserFile {
        UserFile {
            name: "file.xml".into(),
            xml_schema: "schemaA".into(),
            content: Some(b"<data/>".to_vec()),
            from_cdr: true,
            envelope: "http://cdr.envelope.eu/env1".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn push_refuses_file_not_from_cdr() {
        let mut file = cdr_file();
        file.from_cdr = false;
        // UnusedRpc + unroutable envelope: reaching the network would fail
        // loudly, proving the precondition short-circuits.
        match service().push_xml_file(&file).await {
            Err(CdrError::InvalidOperation) => {}
            other => panic!("expected InvalidOperation, got {other:?}"),
        }
    }

    #[test]
    fn save_parts_without_restriction_flags() {
        let parts = service().save_request_parts(&cdr_file()).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[0],
            SavePart::File {
                filename: "file.xml".into(),
                content: b"<data/>".to_vec(),
            }
        );
        assert_eq!(
            parts[1],
            SavePart::Text {
                name: "file_id",
                value: "file.xml".into(),
            }
        );
        // Absent title is sent as the empty string.
        assert_eq!(
            parts[2],
            SavePart::Text {
                name: "title",
                value: String::new(),
            }
        );
    }

    #[test]
    fn save_parts_with_restriction_flags() {
        let mut file = cdr_file();
        file.title = Some("Annual report".into());
        file.apply_restriction = true;
        file.restricted = false;

        let parts = service().save_request_parts(&file).unwrap();
        assert_eq!(
            &parts[2..],
            &[
                SavePart::Text {
                    name: "title",
                    value: "Annual report".into(),
                },
                SavePart::Text {
                    name: "applyRestriction",
                    value: "1".into(),
                },
                SavePart::Text {
                    name: "restricted",
                    value: "0".into(),
                },
            ]
        );
    }

    #[test]
    fn save_parts_use_converted_content() {
        struct UpperCase;
        impl ConversionService for UpperCase {
            fn convert(&self, file: &UserFile, _conversion_id: i32) -> Result<Vec<u8>> {
                Ok(file
                    .content
                    .clone()
                    .unwrap_or_default()
                    .to_ascii_uppercase())
            }
        }

        let service = CdrEnvelopeService::new(
            Arc::new(UnusedRpc),
            Arc::new(UpperCase),
            EnvelopeConfig::default(),
        )
        .unwrap();

        let mut file = cdr_file();
        file.conversion_id = Some(7);
        let parts = service.save_request_parts(&file).unwrap();
        match &parts[0] {
            SavePart::File { content, .. } => assert_eq!(content, b"<DATA/>"),
            other => panic!("expected file part, got {other:?}"),
        }
    }
}
