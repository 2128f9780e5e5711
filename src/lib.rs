//! CDR envelope integration engine.
//!
//! Connects a data-submission portal (CDR) to locally registered webform
//! editors: lists an envelope's XML files over XML-RPC, matches them to
//! webforms by schema, resolves the navigation outcome (auto-edit,
//! new-questionnaire redirect, or a manual menu), and pushes edited files
//! back to the envelope as a multipart POST.
//!
//! The flow per request:
//!
//! ```text
//! CdrRequest → CdrIntegration ── RpcClient ──► envelope (XML-RPC listing)
//!                   │                 │
//!                   │        files_by_schema (typed transform)
//!                   │                 ▼
//!                   ├── WebFormLookup (schema match)
//!                   ▼
//!   Edit / CreateNew / Menu resolution
//! ```
//!
//! Pushing an edited file back is an independent, later call through
//! [`CdrEnvelopeService::push_xml_file`]. Nothing is retried: every remote
//! failure surfaces as a typed [`CdrError`].

pub mod config;
pub mod convert;
pub mod envelope;
pub mod error;
pub mod model;
pub mod resolve;
pub mod rpc;

pub use config::EnvelopeConfig;
pub use convert::{ConversionService, NoConversion};
pub use envelope::{files_by_schema, CdrEnvelopeService, SavePart};
pub use error::{CdrError, Result};
pub use model::{CdrRequest, FilesBySchema, UserFile, WebForm, XmlFile, XmlSaveResult};
pub use resolve::{
    CdrIntegration, CreateInstruction, EditInstruction, FileFetch, MenuModel, Resolution,
    UserFileStorage, WebFormLookup,
};
pub use rpc::{RpcClient, RpcClientConfig, RpcValue, XmlRpcClient};
