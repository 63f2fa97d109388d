use std::time::Duration;
use std::{error::Error as StdError, fmt};

use async_trait::async_trait;
use serde_json::{json, Value};
use taskweave_core::config::ModelConfig;

use super::compute::{ModelBackend, ModelRequest, ModelResponse};

const BODY_PREVIEW_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelHttpErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    Status,
    Shape,
    Unknown,
}

impl ModelHttpErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::Shape => "shape",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ModelHttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct ModelHttpError {
    kind: ModelHttpErrorKind,
    status: Option<u16>,
    url: Option<String>,
    message: String,
    source: Option<anyhow::Error>,
}

impl ModelHttpError {
    pub fn kind(&self) -> ModelHttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    fn from_reqwest(err: reqwest::Error, url: String) -> Self {
        let kind = if err.is_timeout() {
            ModelHttpErrorKind::Timeout
        } else if err.is_connect() {
            ModelHttpErrorKind::Connect
        } else if err.is_request() {
            ModelHttpErrorKind::Request
        } else if err.is_body() {
            ModelHttpErrorKind::Body
        } else if err.is_decode() {
            ModelHttpErrorKind::Decode
        } else {
            ModelHttpErrorKind::Unknown
        };
        ModelHttpError {
            kind,
            status: err.status().map(|s| s.as_u16()),
            url: Some(url),
            message: err.to_string(),
            source: Some(anyhow::Error::new(err)),
        }
    }

    fn status_error(status: u16, url: String, preview: String) -> Self {
        ModelHttpError {
            kind: ModelHttpErrorKind::Status,
            status: Some(status),
            url: Some(url),
            message: preview,
            source: None,
        }
    }

    fn decode_error(status: u16, url: String, err: serde_json::Error, preview: String) -> Self {
        ModelHttpError {
            kind: ModelHttpErrorKind::Decode,
            status: Some(status),
            url: Some(url),
            message: format!("failed to decode response body: {} | body={}", err, preview),
            source: Some(anyhow::Error::new(err)),
        }
    }

    fn shape_error(url: String, what: &str) -> Self {
        ModelHttpError {
            kind: ModelHttpErrorKind::Shape,
            status: None,
            url: Some(url),
            message: format!("unexpected completion payload: {what}"),
            source: None,
        }
    }
}

impl fmt::Display for ModelHttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model http error kind={}", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status)?;
        }
        if let Some(url) = &self.url {
            write!(f, " url={}", url)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl StdError for ModelHttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().nth(BODY_PREVIEW_LIMIT).is_some() {
        out.push_str("...");
    }
    out
}

async fn parse_json_response(resp: reqwest::Response) -> anyhow::Result<Value> {
    let status = resp.status();
    let url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .map_err(|err| ModelHttpError::from_reqwest(err, url.clone()))?;

    if !status.is_success() {
        let preview = preview_body(&body);
        return Err(ModelHttpError::status_error(status.as_u16(), url, preview).into());
    }

    serde_json::from_str::<Value>(&body).map_err(|err| {
        let preview = preview_body(&body);
        ModelHttpError::decode_error(status.as_u16(), url, err, preview).into()
    })
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone)]
pub struct HttpModelBackend {
    api_key: String,
    http: reqwest::Client,
    url_completions: String,
}

impl HttpModelBackend {
    pub fn new(endpoint: &str, api_key: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let normalized = endpoint.trim_end_matches('/');
        Ok(Self {
            api_key,
            http,
            url_completions: format!("{}/chat/completions", normalized),
        })
    }

    pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Self> {
        Self::new(
            &cfg.endpoint,
            cfg.api_key.clone(),
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn complete(&self, request: ModelRequest) -> anyhow::Result<ModelResponse> {
        let url = &self.url_completions;
        tracing::debug!(
            target: "taskweave.compute",
            stage = "model.http.complete.in",
            url = %url,
            model = %request.model,
            max_tokens = request.max_tokens
        );
        let payload = json!({
            "model": &request.model,
            "messages": [{"role": "user", "content": &request.prompt}],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        let resp = self
            .auth(self.http.post(url).json(&payload))
            .send()
            .await
            .map_err(|err| ModelHttpError::from_reqwest(err, url.clone()))?;
        let status = resp.status();
        let raw = parse_json_response(resp).await?;

        let content = raw
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ModelHttpError::shape_error(url.clone(), "missing choices[0].message.content")
            })?
            .to_string();
        let usage = |key: &str| {
            raw.get("usage")
                .and_then(|u| u.get(key))
                .and_then(Value::as_u64)
                .unwrap_or(0)
        };
        let response = ModelResponse {
            model: raw
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&request.model)
                .to_string(),
            input_tokens: usage("prompt_tokens"),
            output_tokens: usage("completion_tokens"),
            content,
            raw,
        };
        tracing::debug!(
            target: "taskweave.compute",
            stage = "model.http.complete.out",
            status = %status,
            output_tokens = response.output_tokens
        );
        Ok(response)
    }
}
