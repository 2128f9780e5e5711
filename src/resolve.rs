//! Webform resolution decision engine.
//!
//! Given one inbound CDR request, decides between opening an editor
//! directly, redirecting to a new-questionnaire flow, or presenting a
//! choice menu. All collaborators (webform lookup, file storage, remote
//! fetch) are injected traits so the engine is testable with substitutes
//! for each capability independently.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::envelope::CdrEnvelopeService;
use crate::error::{CdrError, Result};
use crate::model::{CdrRequest, FilesBySchema, UserFile, WebForm, XmlFile, XmlSaveResult};

/// Lookup of registered webforms. Implementations return only active,
/// main-form entries with a non-empty schema.
#[async_trait]
pub trait WebFormLookup: Send + Sync {
    /// Webforms matching any of the given schemas, in the store's order.
    async fn find_webforms_for_schemas(&self, schemas: &[String]) -> Result<Vec<WebForm>>;

    /// An active webform by id; an unknown or inactive id is an error.
    async fn find_active_webform_by_id(&self, id: i32) -> Result<WebForm>;
}

/// Persistence of locally created editable files.
#[async_trait]
pub trait UserFileStorage: Send + Sync {
    /// Saves the file and returns its assigned id.
    async fn save(&self, file: &UserFile) -> Result<i32>;
}

/// Remote file content fetch.
#[async_trait]
pub trait FileFetch: Send + Sync {
    async fn fetch(&self, url: &str, authorization: Option<&str>) -> Result<Vec<u8>>;
}

#[async_trait]
impl FileFetch for CdrEnvelopeService {
    async fn fetch(&self, url: &str, authorization: Option<&str>) -> Result<Vec<u8>> {
        self.fetch_file(url, authorization).await
    }
}

/// Open the given file with the given webform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditInstruction {
    pub web_form_id: i32,
    pub file_id: i32,
}

/// Start a new questionnaire with the given webform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInstruction {
    pub web_form_id: i32,
}

/// Everything a menu rendering needs for a manual choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuModel {
    pub parameters: CdrRequest,
    pub xml_files: FilesBySchema,
    pub web_forms: Vec<WebForm>,
}

/// Terminal outcome of the menu entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Resolution {
    Edit(EditInstruction),
    CreateNew(CreateInstruction),
    Menu(Box<MenuModel>),
}

/// The integration orchestrator: envelope listing in, navigation decision
/// out. Holds no per-request state.
pub struct CdrIntegration {
    envelope: Arc<CdrEnvelopeService>,
    webforms: Arc<dyn WebFormLookup>,
    storage: Arc<dyn UserFileStorage>,
    fetch: Arc<dyn FileFetch>,
}

impl CdrIntegration {
    pub fn new(
        envelope: Arc<CdrEnvelopeService>,
        webforms: Arc<dyn WebFormLookup>,
        storage: Arc<dyn UserFileStorage>,
        fetch: Arc<dyn FileFetch>,
    ) -> Self {
        Self {
            envelope,
            webforms,
            storage,
            fetch,
        }
    }

    /// Production wiring: the envelope service doubles as the fetch
    /// collaborator.
    pub fn with_envelope_fetch(
        envelope: Arc<CdrEnvelopeService>,
        webforms: Arc<dyn WebFormLookup>,
        storage: Arc<dyn UserFileStorage>,
    ) -> Self {
        let fetch = envelope.clone();
        Self::new(envelope, webforms, storage, fetch)
    }

    /// Menu entry point.
    ///
    /// Auto-edits when exactly one webform matches exactly one file under
    /// exactly one schema and new-file creation is off; auto-creates when
    /// one webform matches an empty envelope and creation is on; otherwise
    /// falls back to a menu, the always-safe outcome.
    pub async fn resolve_menu(&self, request: &CdrRequest) -> Result<Resolution> {
        let xml_files = self.envelope.get_xml_files(request).await?;
        let required_schemas: Vec<String> = match request.schema.as_deref().filter(|s| !s.is_empty())
        {
            Some(schema) => vec![schema.to_string()],
            None => xml_files.schemas().map(str::to_string).collect(),
        };
        let web_forms = self
            .webforms
            .find_webforms_for_schemas(&required_schemas)
            .await?;

        if let Some((form, file)) = auto_edit_target(&xml_files, &web_forms, request) {
            let form = form.clone();
            let file = file.clone();
            let instruction = self
                .edit_file(&form, &file.title, &file.full_name, request)
                .await?;
            return Ok(Resolution::Edit(instruction));
        }

        if web_forms.len() == 1 && xml_files.is_empty() && request.new_form_creation_allowed {
            info!(web_form_id = web_forms[0].id, "empty envelope, starting new questionnaire");
            return Ok(Resolution::CreateNew(CreateInstruction {
                web_form_id: web_forms[0].id,
            }));
        }

        Ok(Resolution::Menu(Box::new(MenuModel {
            parameters: request.clone(),
            xml_files,
            web_forms,
        })))
    }

    /// Direct-edit entry point; requires an explicit schema and instance
    /// URL.
    ///
    /// When several active main forms are registered for one schema the
    /// lookup collaborator's order decides: the first entry wins. No
    /// re-ordering happens here.
    pub async fn resolve_edit(&self, request: &CdrRequest) -> Result<EditInstruction> {
        let schema = request
            .schema
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(CdrError::MissingParameter { name: "schema" })?;

        let web_forms = self
            .webforms
            .find_webforms_for_schemas(&[schema.to_string()])
            .await?;
        let web_form = web_forms
            .first()
            .ok_or_else(|| CdrError::NoWebformForSchema {
                schema: schema.to_string(),
            })?
            .clone();

        let instance_url = request
            .instance_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(CdrError::MissingParameter { name: "instance" })?;
        // File name is the last path segment, or the whole string when
        // there is no '/'.
        let file_name = match instance_url.rfind('/') {
            Some(idx) => &instance_url[idx + 1..],
            None => instance_url,
        };

        self.edit_file(&web_form, file_name, instance_url, request)
            .await
    }

    /// Edit a named envelope file with an explicitly chosen webform (the
    /// menu's manual-choice follow-up).
    pub async fn edit_with_webform(
        &self,
        form_id: i32,
        file_name: &str,
        remote_file_url: &str,
        request: &CdrRequest,
    ) -> Result<EditInstruction> {
        let web_form = self.webforms.find_active_webform_by_id(form_id).await?;
        self.edit_file(&web_form, file_name, remote_file_url, request)
            .await
    }

    /// Push an edited file back to its envelope.
    pub async fn submit_edited_file(&self, file: &UserFile) -> Result<XmlSaveResult> {
        self.envelope.push_xml_file(file).await
    }

    /// Shared create-editable-file step: fetch the remote content, persist
    /// a new file sourced from the envelope, and point the caller at the
    /// editor.
    async fn edit_file(
        &self,
        web_form: &WebForm,
        file_name: &str,
        remote_file_url: &str,
        request: &CdrRequest,
    ) -> Result<EditInstruction> {
        let content = self
            .fetch
            .fetch(remote_file_url, request.authorization.as_deref())
            .await?;

        let file = UserFile {
            name: file_name.to_string(),
            xml_schema: web_form.xml_schema.clone(),
            content: Some(content),
            from_cdr: true,
            envelope: request.envelope_url.clone(),
            authorization: request.authorization.clone(),
            created: Some(Utc::now()),
            ..Default::default()
        };
        let file_id = self.storage.save(&file).await?;
        info!(
            web_form_id = web_form.id,
            file_id, file_name, "created editable file from envelope"
        );
        Ok(EditInstruction {
            web_form_id: web_form.id,
            file_id,
        })
    }
}

/// The auto-edit rule: one webform, one schema bucket, one file in that
/// bucket, and new-file creation not allowed.
fn auto_edit_target<'a>(
    xml_files: &'a FilesBySchema,
    web_forms: &'a [WebForm],
    request: &CdrRequest,
) -> Option<(&'a WebForm, &'a XmlFile)> {
    if web_forms.len() == 1 && xml_files.len() == 1 && !request.new_form_creation_allowed {
        let form = &web_forms[0];
        if let Some(files) = xml_files.get(&form.xml_schema) {
            if files.len() == 1 {
                return Some((form, &files[0]));
            }
        }
    }
    None
}
