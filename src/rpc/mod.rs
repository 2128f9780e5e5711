//! Envelope RPC client.
//!
//! [`RpcClient`] is the pluggable transport boundary: the engine only
//! depends on the trait, tests substitute it, and [`XmlRpcClient`] is the
//! production implementation speaking XML-RPC over HTTP.

pub mod codec;
pub mod value;

use async_trait::async_trait;
use url::Url;

use crate::config::EnvelopeConfig;
use crate::error::{CdrError, Result};
use crate::model::CdrRequest;
pub use value::RpcValue;

/// Per-call transport configuration, built from the inbound request.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Validated envelope endpoint.
    pub server_url: Url,
    /// Basic-auth credentials, when the portal forwarded them.
    pub credentials: Option<(String, String)>,
}

impl RpcClientConfig {
    /// Builds the call configuration from request parameters.
    ///
    /// A malformed envelope URL fails fast here, before any network
    /// activity.
    pub fn for_request(request: &CdrRequest) -> Result<Self> {
        let server_url = Url::parse(&request.envelope_url).map_err(CdrError::remote)?;
        let credentials = if request.is_authorization_set() {
            Some((
                request.user_name.clone().unwrap_or_default(),
                request.password.clone().unwrap_or_default(),
            ))
        } else {
            None
        };
        Ok(Self {
            server_url,
            credentials,
        })
    }
}

/// Remote procedure transport collaborator.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Executes one remote procedure call. Exactly one network round trip;
    /// no retries, no caching.
    async fn execute(
        &self,
        config: &RpcClientConfig,
        method: &str,
        params: &[RpcValue],
    ) -> Result<RpcValue>;
}

/// XML-RPC over HTTP implementation of [`RpcClient`].
pub struct XmlRpcClient {
    http: reqwest::Client,
}

impl XmlRpcClient {
    pub fn new(config: &EnvelopeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(CdrError::remote)?;
        Ok(Self { http })
    }

    /// Reuse an already configured HTTP client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl RpcClient for XmlRpcClient {
    async fn execute(
        &self,
        config: &RpcClientConfig,
        method: &str,
        params: &[RpcValue],
    ) -> Result<RpcValue> {
        let body = codec::encode_call(method, params);

        let mut request = self
            .http
            .post(config.server_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body);
        if let Some((user, password)) = &config.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await.map_err(CdrError::remote)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CdrError::RemoteUnavailable(
                format!("envelope RPC endpoint answered {status}").into(),
            ));
        }
        let text = response.text().await.map_err(CdrError::remote)?;
        codec::decode_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_malformed_envelope_url() {
        let request = CdrRequest {
            envelope_url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            RpcClientConfig::for_request(&request),
            Err(CdrError::RemoteUnavailable(_))
        ));
    }

    #[test]
    fn config_attaches_credentials_only_when_complete() {
        let mut request = CdrRequest {
            envelope_url: "http://cdr.envelope.eu/env1".into(),
            user_name: Some("reporter".into()),
            ..Default::default()
        };
        let config = RpcClientConfig::for_request(&request).unwrap();
        assert!(config.credentials.is_none());

        request.password = Some("secret".into());
        let config = RpcClientConfig::for_request(&request).unwrap();
        assert_eq!(
            config.credentials,
            Some(("reporter".into(), "secret".into()))
        );
    }
}
