use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::auth::{AccessToken, CredentialProvider, TokenResponse, TokenStore};
use super::transport::{FormPart, HttpRequest, HttpResponse, HttpTransport, Method, RequestBody};
use crate::error::{ExchangeError, RegistryErrorDetail, RegistryErrors, Result};
use crate::models::{
    ANY_VERSION, ChangeMap, ComponentJson, RequestedChanges, ResolveRequest, ResolverResponse,
    Solution,
};

/// Response headers carrying a rotated access token and its lifetime in seconds
pub const ROTATING_TOKEN_HEADER: &str = "x-access-token";
pub const ROTATING_TOKEN_EXPIRES_HEADER: &str = "x-access-token-expires-in";

const TOKEN_ENDPOINT: &str = "auth/token";
const DEFAULT_ROTATED_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Progress of the re-authentication loop for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    Authenticating { attempt: u32 },
    Retrying { attempt: u32 },
    Failed,
}

impl AuthState {
    /// Transition taken when the exchange answers 401
    pub fn on_unauthorized(self, max_retries: u32) -> Self {
        match self {
            AuthState::Idle if max_retries > 0 => AuthState::Authenticating { attempt: 1 },
            AuthState::Retrying { attempt } if attempt < max_retries => {
                AuthState::Authenticating {
                    attempt: attempt + 1,
                }
            }
            _ => AuthState::Failed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<RegistryErrorDetail>,
}

enum CachedToken {
    Unloaded,
    Loaded(Option<AccessToken>),
}

/// HTTP access to the exchange with bearer tokens and 401-driven login
pub struct RegistryClient {
    base_url: Url,
    transport: Arc<dyn HttpTransport>,
    tokens: TokenStore,
    credentials: Arc<dyn CredentialProvider>,
    cached_token: Mutex<CachedToken>,
    max_auth_retries: u32,
}

impl RegistryClient {
    pub fn new(
        base_url: Url,
        transport: Arc<dyn HttpTransport>,
        tokens: TokenStore,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            base_url: normalize_base(base_url),
            transport,
            tokens,
            credentials,
            cached_token: Mutex::new(CachedToken::Unloaded),
            max_auth_retries: crate::options::DEFAULT_MAX_AUTH_RETRIES,
        }
    }

    pub fn with_max_auth_retries(mut self, retries: u32) -> Self {
        self.max_auth_retries = retries;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Send a request to the exchange.
    ///
    /// A 401 runs the credential prompt, stores the issued token and replays the
    /// request, at most `max_auth_retries` times. Other non-2xx answers are decoded
    /// into [`ExchangeError::HttpStatus`].
    pub async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let attach_token = !self.is_token_endpoint(&request.url);
        let mut state = AuthState::Idle;

        loop {
            let mut outgoing = request.clone();
            if attach_token && let Some(token) = self.current_token().await? {
                outgoing = outgoing.header("Authorization", token.bearer());
            }

            let response = self.send(outgoing).await?;

            if response.status == 401 {
                state = state.on_unauthorized(self.max_auth_retries);
                let AuthState::Authenticating { attempt } = state else {
                    return Err(ExchangeError::Auth(format!(
                        "the exchange rejected the request after {} login attempt(s)",
                        self.max_auth_retries
                    )));
                };

                info!(
                    "Authentication required for {} (attempt {}/{})",
                    request.url, attempt, self.max_auth_retries
                );
                match self.login().await {
                    Ok(_) => {}
                    Err(ExchangeError::Auth(message)) => warn!("Login rejected: {}", message),
                    Err(e) => return Err(e),
                }
                state = AuthState::Retrying { attempt };
                continue;
            }

            if !response.is_success() {
                return Err(self.status_error(&response));
            }

            self.refresh_rotating_token(&response).await?;
            return Ok(response);
        }
    }

    /// Prompt for credentials, obtain a token and persist it
    pub async fn login(&self) -> Result<AccessToken> {
        let credentials = self.credentials.credentials(&self.base_url).await?;
        let url = self.endpoint(TOKEN_ENDPOINT)?;

        let request = HttpRequest::new(Method::Get, url.as_str())
            .header("Authorization", credentials.basic_header());
        let response = self.send(request).await?;

        if response.status == 401 {
            return Err(ExchangeError::Auth(format!(
                "invalid credentials for user '{}'",
                credentials.username
            )));
        }
        if !response.is_success() {
            return Err(self.status_error(&response));
        }

        let token: AccessToken = decode::<TokenResponse>(&response)?.into();
        self.store_token(token.clone()).await?;
        info!("Logged in to {}", self.base_url);
        Ok(token)
    }

    /// Forget the stored token for this exchange
    pub async fn logout(&self) -> Result<bool> {
        *self.cached_token.lock().await = CachedToken::Loaded(None);
        self.tokens.clear(&self.base_url).await
    }

    /// `GET /components/<name>[/versions/<v>]`
    pub async fn get_metadata(&self, name: &str, version: Option<&str>) -> Result<ComponentJson> {
        let path = match version {
            Some(version) if version != ANY_VERSION => {
                format!("components/{}/versions/{}", name, version)
            }
            _ => format!("components/{}", name),
        };

        let response = self.get(&path).await?;
        decode(&response)
    }

    /// `PUT /dependencyResolver`
    pub async fn resolve(
        &self,
        config: &ChangeMap,
        environment: &ChangeMap,
        changes: &RequestedChanges,
    ) -> Result<Solution> {
        let body = serde_json::to_vec(&ResolveRequest {
            config,
            environment,
            changes,
        })?;

        let url = self.endpoint("dependencyResolver")?;
        let request = HttpRequest::new(Method::Put, url.as_str()).body(RequestBody::Json(body));
        let response = self.request(request).await?;

        decode::<ResolverResponse>(&response)?.into_solution()
    }

    /// `GET /components/<fullName>/versions/<v>/download`
    pub async fn download(&self, full_name: &str, version: &str) -> Result<Vec<u8>> {
        let path = format!("components/{}/versions/{}/download", full_name, version);
        let response = self.get(&path).await?;
        debug!("Downloaded {} bytes for {}@{}", response.body.len(), full_name, version);
        Ok(response.body)
    }

    /// `POST /components?access=PUBLIC` with the archive as a multipart file
    pub async fn publish(&self, file_name: &str, archive: Vec<u8>) -> Result<serde_json::Value> {
        let url = self.endpoint("components?access=PUBLIC")?;
        let request = HttpRequest::new(Method::Post, url.as_str()).body(RequestBody::Multipart(
            vec![FormPart {
                name: "file".to_string(),
                file_name: Some(file_name.to_string()),
                content_type: Some("application/zip".to_string()),
                data: archive,
            }],
        ));

        let response = self.request(request).await?;
        if response.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        decode(&response)
    }

    async fn get(&self, path: &str) -> Result<HttpResponse> {
        let url = self.endpoint(path)?;
        self.request(HttpRequest::new(Method::Get, url.as_str())).await
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        self.transport
            .execute(request)
            .await
            .map_err(|e| ExchangeError::Network {
                url,
                message: e.message,
            })
    }

    fn is_token_endpoint(&self, url: &str) -> bool {
        self.endpoint(TOKEN_ENDPOINT)
            .map(|endpoint| endpoint.as_str() == url)
            .unwrap_or(false)
    }

    async fn current_token(&self) -> Result<Option<AccessToken>> {
        let mut cached = self.cached_token.lock().await;
        if let CachedToken::Unloaded = *cached {
            *cached = CachedToken::Loaded(self.tokens.load(&self.base_url).await?);
        }

        Ok(match &*cached {
            CachedToken::Loaded(Some(token)) if !token.is_expired() => Some(token.clone()),
            _ => None,
        })
    }

    async fn store_token(&self, token: AccessToken) -> Result<()> {
        self.tokens.save(&self.base_url, &token).await?;
        *self.cached_token.lock().await = CachedToken::Loaded(Some(token));
        Ok(())
    }

    async fn refresh_rotating_token(&self, response: &HttpResponse) -> Result<()> {
        let Some(access_token) = response.header(ROTATING_TOKEN_HEADER) else {
            return Ok(());
        };

        let lifetime = response
            .header(ROTATING_TOKEN_EXPIRES_HEADER)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_ROTATED_TOKEN_LIFETIME_SECS);

        debug!("Exchange rotated the access token");
        self.store_token(AccessToken::from_lifetime(access_token, lifetime))
            .await
    }

    fn status_error(&self, response: &HttpResponse) -> ExchangeError {
        let mut details = match serde_json::from_slice::<ErrorBody>(&response.body) {
            Ok(body) if !body.errors.is_empty() => body.errors,
            _ => vec![RegistryErrorDetail {
                id: format!("HTTP_{}", response.status),
                message: fallback_message(response),
                link: None,
            }],
        };

        for detail in &mut details {
            if detail.link.is_none() && !detail.id.starts_with("HTTP_") {
                detail.link = self
                    .endpoint(&format!("docs/errors/{}", detail.id))
                    .ok()
                    .map(String::from);
            }
        }

        ExchangeError::HttpStatus {
            status: response.status,
            errors: RegistryErrors(details),
        }
    }
}

fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn fallback_message(response: &HttpResponse) -> String {
    let text = String::from_utf8_lossy(&response.body).trim().to_string();
    if text.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        text
    }
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(ExchangeError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_state_is_bounded() {
        let mut state = AuthState::Idle;
        state = state.on_unauthorized(2);
        assert_eq!(state, AuthState::Authenticating { attempt: 1 });

        state = AuthState::Retrying { attempt: 1 }.on_unauthorized(2);
        assert_eq!(state, AuthState::Authenticating { attempt: 2 });

        state = AuthState::Retrying { attempt: 2 }.on_unauthorized(2);
        assert_eq!(state, AuthState::Failed);

        assert_eq!(AuthState::Idle.on_unauthorized(0), AuthState::Failed);
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let url = normalize_base(Url::parse("https://exchange.example.com/api/v1").unwrap());
        assert_eq!(
            url.join("components/oj-sample").unwrap().as_str(),
            "https://exchange.example.com/api/v1/components/oj-sample"
        );
    }
}
