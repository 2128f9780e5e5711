//! Data types exchanged with the CDR envelope and the webform resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameters of one inbound CDR integration request.
///
/// Immutable once constructed from the inbound request; carries no identity
/// beyond its field values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdrRequest {
    /// Base URL of the envelope this request refers to.
    pub envelope_url: String,
    /// Basic-auth user name, when the portal forwarded credentials.
    pub user_name: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Explicit schema filter; absent means "consider every schema the
    /// envelope reports".
    pub schema: Option<String>,
    /// URL of the concrete file instance to edit (direct-edit entry).
    pub instance_url: Option<String>,
    /// Suggested name for a newly created file.
    pub new_file_name: Option<String>,
    /// Whether the portal allows starting a brand new questionnaire file.
    pub new_form_creation_allowed: bool,
    /// Opaque extra query parameters, passed through to the editor.
    pub additional_parameters: String,
    /// Raw `Authorization` header value to forward on fetch and push.
    pub authorization: Option<String>,
}

impl CdrRequest {
    /// True when both basic-auth fields are present.
    pub fn is_authorization_set(&self) -> bool {
        self.user_name.is_some() && self.password.is_some()
    }
}

/// One XML file known to the envelope for a given schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlFile {
    /// Absolute URL of the file within the envelope.
    pub full_name: String,
    /// Human-readable title.
    pub title: String,
}

impl XmlFile {
    pub fn new(full_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            title: title.into(),
        }
    }
}

/// Insertion-ordered multimap from XML schema to the envelope files
/// conforming to it.
///
/// Key order is the order schemas first appear in the RPC response; file
/// order within a schema is the order of that schema's result array.
/// Repeated adds to the same key append. A schema with no files is simply
/// absent, never present with an empty bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesBySchema(Vec<(String, Vec<XmlFile>)>);

impl FilesBySchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a file to the schema's bucket, creating the bucket on first
    /// use.
    pub fn add(&mut self, schema: &str, file: XmlFile) {
        if let Some((_, files)) = self.0.iter_mut().find(|(key, _)| key == schema) {
            files.push(file);
        } else {
            self.0.push((schema.to_string(), vec![file]));
        }
    }

    /// Files registered under a schema, in response order.
    pub fn get(&self, schema: &str) -> Option<&[XmlFile]> {
        self.0
            .iter()
            .find(|(key, _)| key == schema)
            .map(|(_, files)| files.as_slice())
    }

    /// First file registered under a schema.
    pub fn first(&self, schema: &str) -> Option<&XmlFile> {
        self.get(schema).and_then(|files| files.first())
    }

    /// Number of distinct schema buckets.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Schema keys in insertion order.
    pub fn schemas(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[XmlFile])> {
        self.0
            .iter()
            .map(|(key, files)| (key.as_str(), files.as_slice()))
    }
}

/// A registered webform usable for editing files of one schema.
///
/// Read-only reference data for the resolver; lookups return only active,
/// main-form entries with a non-empty schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebForm {
    pub id: i32,
    pub title: String,
    pub xml_schema: String,
    pub active: bool,
    pub main_form: bool,
}

/// A file instance created locally to hold content fetched from (or
/// destined for) a CDR envelope.
#[derive(Debug, Clone, Default)]
pub struct UserFile {
    /// Assigned by the storage collaborator on save.
    pub id: Option<i32>,
    pub name: String,
    pub xml_schema: String,
    /// Raw content bytes; `None` until fetched.
    pub content: Option<Vec<u8>>,
    pub title: Option<String>,
    /// True when the file originates from a CDR envelope. Pushing a file
    /// without this flag is rejected before any network call.
    pub from_cdr: bool,
    /// Envelope base URL the file belongs to.
    pub envelope: String,
    /// Raw `Authorization` header value for the push request.
    pub authorization: Option<String>,
    /// Identifier of the conversion to apply before pushing.
    pub conversion_id: Option<i32>,
    pub apply_restriction: bool,
    pub restricted: bool,
    pub created: Option<DateTime<Utc>>,
}

/// Outcome of pushing an edited file back to the envelope.
///
/// Either success (with the remote side's result payload) or failure with a
/// displayable reason. There is no partial-success state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlSaveResult {
    pub success: bool,
    /// Remote result code; 0 for local/transport-level failures.
    pub code: i32,
    /// Displayable message: the remote message on success or rejection, a
    /// fixed reason otherwise.
    pub message: String,
}

impl XmlSaveResult {
    /// A failure produced on our side, before or instead of a remote answer.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: 0,
            message: message.into(),
        }
    }

    /// Parses the CDR save-XML response body.
    ///
    /// The envelope answers with a leading integer result code followed by
    /// an optional message; a positive code means the file was accepted.
    /// This is the only place that encoding lives.
    pub fn parse(body: &str) -> Self {
        let trimmed = body.trim();
        let (code_part, message) = match trimmed.split_once(char::is_whitespace) {
            Some((code, rest)) => (code, rest.trim().to_string()),
            None => (trimmed, String::new()),
        };
        match code_part.parse::<i32>() {
            Ok(code) if code > 0 => Self {
                success: true,
                code,
                message,
            },
            Ok(code) => Self {
                success: false,
                code,
                message,
            },
            Err(_) => Self {
                success: false,
                code: 0,
                message: trimmed.to_string(),
            },
        }
    }
}
