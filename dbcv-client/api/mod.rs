pub mod actions;
pub mod resources;

use std::future::Future;
use std::sync::Arc;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::auth::Credentials;
use crate::error::ClientError;
use crate::events::{self, ClientNotice, NoticeSender, INSUFFICIENT_RIGHTS, REQUEST_FAILED};

pub use resources::ResourceKind;

/// Detail string the backend uses for privilege failures, whatever the status.
const INSUFFICIENT_PRIVILEGES: &str = "The user doesn't have enough privileges.";

/// Thin REST client for the backend. Attaches the bearer credential and
/// classifies responses; `safe_call` is the boundary where errors become
/// notices and `None`.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    credentials: Arc<Credentials>,
    notices: NoticeSender,
}

impl ApiClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        credentials: Arc<Credentials>,
        notices: NoticeSender,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            notices,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientNotice> {
        self.notices.subscribe()
    }

    pub fn notices(&self) -> &NoticeSender {
        &self.notices
    }

    pub fn credentials(&self) -> &Arc<Credentials> {
        &self.credentials
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.credentials.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, ClientError> {
        let req = self.http.get(self.url(path)).query(query);
        self.execute(req).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let req = self.http.post(self.url(path)).json(body);
        self.execute(req).await
    }

    /// POST with no request body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let req = self.http.post(self.url(path));
        self.execute(req).await
    }

    pub async fn patch_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let req = self.http.patch(self.url(path)).json(body);
        self.execute(req).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        let req = self.http.delete(self.url(path));
        self.execute(req).await
    }

    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let req = self.http.post(self.url(path)).form(form);
        self.execute(req).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<T, ClientError> {
        let req = self.http.post(self.url(path)).multipart(form);
        self.execute(req).await
    }

    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        let resp = self.authorize(self.http.get(self.url(path))).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            check_status(status, &body)?;
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = self
            .authorize(req.header("Accept", "application/json"))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        check_status(status, &body)?;
        decode_body(&body)
    }

    /// Await `call`; on failure publish the matching notice and return `None`.
    /// A 401 also discards the stored credential.
    pub async fn safe_call<T>(
        &self,
        call: impl Future<Output = Result<T, ClientError>>,
    ) -> Option<T> {
        self.reported_call(call).await.ok()
    }

    /// Like `safe_call`, but hands the error back after reporting it.
    pub async fn reported_call<T>(
        &self,
        call: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        call.await.inspect_err(|err| self.report(err))
    }

    fn report(&self, err: &ClientError) {
        tracing::error!(error = %err, "API error");
        match err {
            ClientError::Unauthorized => {
                tracing::info!("credential rejected, login required");
                self.credentials.clear();
                events::publish(&self.notices, ClientNotice::login_required());
            }
            ClientError::Forbidden(_) => {
                events::publish(&self.notices, ClientNotice::error(INSUFFICIENT_RIGHTS));
            }
            _ => {
                events::publish(&self.notices, ClientNotice::error(REQUEST_FAILED));
            }
        }
    }
}

/// Map a response status (and the backend's `detail` field) onto the error taxonomy.
pub fn check_status(status: StatusCode, body: &str) -> Result<(), ClientError> {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(String::from));

    if detail.as_deref() == Some(INSUFFICIENT_PRIVILEGES) {
        return Err(ClientError::Forbidden(INSUFFICIENT_PRIVILEGES.to_string()));
    }
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
        StatusCode::FORBIDDEN => Err(ClientError::Forbidden(detail.unwrap_or_default())),
        _ => Err(ClientError::Status {
            status: status.as_u16(),
            body: body.to_string(),
        }),
    }
}

/// Empty bodies (e.g. 204 on delete) decode as JSON `null`.
fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, ClientError> {
    let text = if body.trim().is_empty() { "null" } else { body };
    Ok(serde_json::from_str(text)?)
}
