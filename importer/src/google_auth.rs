use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, ClientId, ClientSecret, CsrfToken,
    RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::config::GoogleConfig;
use crate::errors::{ImportError, ImportResult};
use crate::http_utils::handle_oauth2_response_with_text;

/// Full read/write access is needed to insert events.
/// If this changes, tokens stored with the old scope are no longer accepted.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Client secrets as downloaded from the Google Cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a `credentials.json` download (desktop or web application client)
    pub fn parse(content: &str) -> ImportResult<Self> {
        let file: CredentialsFile = serde_json::from_str(content)?;
        file.installed.or(file.web).ok_or_else(|| ImportError::Config {
            message: "credentials file has neither an 'installed' nor a 'web' client".to_string(),
        })
    }

    pub async fn load(path: &Path) -> ImportResult<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ImportError::FileSystem {
                operation: "read credentials".to_string(),
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Self::parse(&content)
    }
}

/// Token file contents. Also accepts the layout written by Google's client libraries
/// (`token` / `expiry`), so an existing `token.json` keeps working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(alias = "token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "expiry")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl StoredToken {
    /// Access tokens are refreshed five minutes ahead of expiry
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|expires_at| now + Duration::minutes(5) >= expires_at)
            .unwrap_or(false)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|s| s == scope)
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// URL the user has to visit, plus the state value Google will echo back
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub csrf_state: String,
}

pub struct GoogleAuth {
    secrets: ClientSecrets,
    redirect_uri: String,
    token_file_path: PathBuf,
    http_client: reqwest::Client,
    token: RwLock<Option<StoredToken>>,
}

impl GoogleAuth {
    pub fn new(secrets: ClientSecrets, redirect_uri: Option<String>, token_file_path: PathBuf) -> Self {
        let redirect_uri = redirect_uri
            .or_else(|| secrets.redirect_uris.first().cloned())
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

        Self {
            secrets,
            redirect_uri,
            token_file_path,
            http_client: reqwest::Client::new(),
            token: RwLock::new(None),
        }
    }

    pub async fn from_config(config: &GoogleConfig) -> ImportResult<Self> {
        let secrets = ClientSecrets::load(&config.credentials_path).await?;
        Ok(Self::new(
            secrets,
            config.redirect_uri.clone(),
            config.token_path.clone(),
        ))
    }

    /// Whether a stored token exists that is still valid or can be refreshed
    pub async fn is_authenticated(&self) -> bool {
        match self.load_stored_token().await {
            Ok(token) => {
                token.has_scope(CALENDAR_SCOPE)
                    && (!token.needs_refresh(Utc::now()) || token.refresh_token.is_some())
            }
            Err(_) => false,
        }
    }

    fn oauth_client(&self) -> ImportResult<BasicClient> {
        let config_error = |e: oauth2::url::ParseError| ImportError::Config {
            message: format!("Invalid OAuth2 URL in client secrets: {}", e),
        };

        Ok(BasicClient::new(
            ClientId::new(self.secrets.client_id.clone()),
            Some(ClientSecret::new(self.secrets.client_secret.clone())),
            AuthUrl::new(self.secrets.auth_uri.clone()).map_err(config_error)?,
            Some(TokenUrl::new(self.secrets.token_uri.clone()).map_err(config_error)?),
        )
        .set_redirect_uri(RedirectUrl::new(self.redirect_uri.clone()).map_err(config_error)?))
    }

    /// Get OAuth2 authorization URL for initial setup
    pub fn authorization_request(&self) -> ImportResult<AuthorizationRequest> {
        let (auth_url, csrf_token) = self
            .oauth_client()?
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(CALENDAR_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        Ok(AuthorizationRequest {
            url: auth_url.to_string(),
            csrf_state: csrf_token.secret().clone(),
        })
    }

    /// Exchange authorization code for access token
    pub async fn authenticate_with_code(&self, auth_code: &str) -> ImportResult<()> {
        debug!("Exchanging authorization code for access token");

        let token_response = self.exchange_code_manually(auth_code).await?;

        let stored_token = StoredToken {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_at: token_response
                .expires_in
                .map(|seconds| Utc::now() + Duration::seconds(seconds)),
            scopes: vec![CALENDAR_SCOPE.to_string()],
        };

        self.store_token(&stored_token).await?;

        info!("Google Calendar authentication successful");
        Ok(())
    }

    /// Get a valid access token, refreshing if necessary
    pub async fn access_token(&self) -> ImportResult<String> {
        let token = self.load_stored_token().await?;

        if token.needs_refresh(Utc::now()) {
            debug!("Access token expired, refreshing...");
            return Ok(self.refresh_token(&token).await?.access_token);
        }

        Ok(token.access_token)
    }

    async fn refresh_token(&self, current_token: &StoredToken) -> ImportResult<StoredToken> {
        let refresh_token = current_token.refresh_token.as_ref().ok_or_else(|| {
            ImportError::Authentication {
                service: "Google OAuth2".to_string(),
                message: "access token expired and no refresh token is available".to_string(),
            }
        })?;

        let token_result = self
            .oauth_client()?
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(async_http_client)
            .await
            .map_err(|e| ImportError::Authentication {
                service: "Google OAuth2".to_string(),
                message: format!("Failed to refresh token: {}", e),
            })?;

        let new_token = StoredToken {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result
                .refresh_token()
                .map(|t| t.secret().clone())
                .or_else(|| Some(refresh_token.clone())),
            expires_at: token_result
                .expires_in()
                .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64)),
            scopes: current_token.scopes.clone(),
        };

        self.store_token(&new_token).await?;
        info!("Google Calendar token refreshed successfully");
        Ok(new_token)
    }

    /// Manual token exchange; Google's token response trips up the oauth2 crate's parser
    async fn exchange_code_manually(&self, auth_code: &str) -> ImportResult<GoogleTokenResponse> {
        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("code", auth_code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        debug!("Sending token exchange request to {}", self.secrets.token_uri);
        let response = self
            .http_client
            .post(&self.secrets.token_uri)
            .form(&params)
            .send()
            .await?;

        let response_text = handle_oauth2_response_with_text(response).await?;

        serde_json::from_str(&response_text).map_err(|e| ImportError::Parsing {
            format: "Google token response".to_string(),
            message: e.to_string(),
        })
    }

    async fn store_token(&self, token: &StoredToken) -> ImportResult<()> {
        let token_json = serde_json::to_string_pretty(token)?;
        fs::write(&self.token_file_path, token_json)
            .await
            .map_err(|e| ImportError::FileSystem {
                operation: "write token".to_string(),
                path: self.token_file_path.display().to_string(),
                message: e.to_string(),
            })?;
        *self.token.write() = Some(token.clone());
        debug!("Stored Google Calendar token to {:?}", self.token_file_path);
        Ok(())
    }

    async fn load_stored_token(&self) -> ImportResult<StoredToken> {
        let cached = self.token.read().clone();
        if let Some(token) = cached {
            return Ok(token);
        }

        let token_data = fs::read_to_string(&self.token_file_path).await?;
        let token: StoredToken = serde_json::from_str(&token_data)?;
        *self.token.write() = Some(token.clone());
        Ok(token)
    }
}

/// Accepts either the bare authorization code or the whole redirect URL the
/// browser ended up on. For URLs the `state` parameter must match.
pub fn extract_authorization_code(input: &str, expected_state: &str) -> ImportResult<String> {
    let input = input.trim();
    let auth_error = |message: &str| ImportError::Authentication {
        service: "Google OAuth2".to_string(),
        message: message.to_string(),
    };

    if input.is_empty() {
        return Err(auth_error("no authorization code provided"));
    }

    let Ok(url) = reqwest::Url::parse(input) else {
        return Ok(input.to_string());
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(auth_error(&format!("authorization was denied: {}", value))),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(auth_error("state parameter does not match the authorization request"));
    }

    code.ok_or_else(|| auth_error("redirect URL does not contain a 'code' parameter"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    const CREDENTIALS: &str = r#"{
        "installed": {
            "client_id": "123.apps.googleusercontent.com",
            "project_id": "calendar-import",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "shh",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    #[test]
    fn test_parse_installed_credentials() {
        let secrets = ClientSecrets::parse(CREDENTIALS).unwrap();
        assert_eq!(secrets.client_id, "123.apps.googleusercontent.com");
        assert_eq!(secrets.client_secret, "shh");
        assert_eq!(secrets.redirect_uris, vec!["http://localhost".to_string()]);
    }

    #[test]
    fn test_parse_web_credentials_fills_default_uris() {
        let secrets = ClientSecrets::parse(r#"{"web": {"client_id": "a", "client_secret": "b"}}"#).unwrap();
        assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(secrets.auth_uri, DEFAULT_AUTH_URI);
    }

    #[test]
    fn test_parse_credentials_without_client_fails() {
        assert!(matches!(
            ClientSecrets::parse(r#"{"other": {}}"#),
            Err(ImportError::Config { .. })
        ));
    }

    #[test]
    fn test_reads_python_client_token_layout() {
        let json = r#"{
            "token": "ya29.access",
            "refresh_token": "1//refresh",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "123.apps.googleusercontent.com",
            "client_secret": "shh",
            "scopes": ["https://www.googleapis.com/auth/calendar"],
            "expiry": "2024-05-01T10:00:00.123456Z"
        }"#;

        let token: StoredToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "ya29.access");
        assert_eq!(token.refresh_token.as_deref(), Some("1//refresh"));
        assert!(token.expires_at.is_some());
        assert!(token.has_scope(CALENDAR_SCOPE));
    }

    #[test]
    fn test_needs_refresh_within_five_minutes() {
        let now = Utc::now();
        let mut token = StoredToken {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: Some(now + Duration::minutes(3)),
            scopes: vec![],
        };
        assert!(token.needs_refresh(now));

        token.expires_at = Some(now + Duration::minutes(30));
        assert!(!token.needs_refresh(now));

        token.expires_at = None;
        assert!(!token.needs_refresh(now));
    }

    #[test]
    fn test_readonly_token_lacks_calendar_scope() {
        let token = StoredToken {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: None,
            scopes: vec!["https://www.googleapis.com/auth/calendar.readonly".to_string()],
        };
        assert!(!token.has_scope(CALENDAR_SCOPE));
    }

    #[test]
    fn test_extract_code_from_redirect_url() {
        let code = extract_authorization_code(
            "http://localhost/?state=xyz&code=4/0AbCd&scope=https://www.googleapis.com/auth/calendar",
            "xyz",
        )
        .unwrap();
        assert_eq!(code, "4/0AbCd");
    }

    #[test]
    fn test_extract_code_rejects_mismatched_state() {
        assert!(extract_authorization_code("http://localhost/?state=other&code=abc", "xyz").is_err());
    }

    #[test]
    fn test_extract_code_reports_denied_consent() {
        let err = extract_authorization_code("http://localhost/?error=access_denied&state=xyz", "xyz")
            .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn test_extract_bare_code() {
        assert_eq!(extract_authorization_code("  4/0AbCd \n", "xyz").unwrap(), "4/0AbCd");
        assert!(extract_authorization_code("   ", "xyz").is_err());
    }

    #[test]
    fn test_authorization_url_requests_offline_calendar_access() {
        let secrets = ClientSecrets::parse(CREDENTIALS).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let auth = GoogleAuth::new(secrets, None, dir.path().join("token.json"));

        let request = auth.authorization_request().unwrap();
        assert!(request.url.starts_with(DEFAULT_AUTH_URI));
        assert!(request.url.contains("access_type=offline"));
        assert!(request.url.contains(&urlencoding::encode(CALENDAR_SCOPE).into_owned()));
        assert!(request.url.contains(&format!("state={}", request.csrf_state)));
    }

    #[tokio::test]
    async fn test_is_authenticated_reads_token_file() {
        let secrets = ClientSecrets::parse(CREDENTIALS).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");

        let auth = GoogleAuth::new(secrets.clone(), None, token_path.clone());
        assert!(!auth.is_authenticated().await);

        let token = StoredToken {
            access_token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: Some(Utc::now() - Duration::hours(1)),
            scopes: vec![CALENDAR_SCOPE.to_string()],
        };
        std::fs::write(&token_path, serde_json::to_string(&token).unwrap()).unwrap();

        let auth = GoogleAuth::new(secrets, None, token_path);
        assert!(auth.is_authenticated().await);
    }

    /// Answers one request with `body` and hands back the raw request
    fn serve_token_endpoint(body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/token", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf).unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            line.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|value| value.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (url, handle)
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_saved() {
        let (token_uri, server) = serve_token_endpoint(
            r#"{"access_token": "ya29.fresh", "expires_in": 3599, "token_type": "Bearer", "scope": "https://www.googleapis.com/auth/calendar"}"#,
        );
        let mut secrets = ClientSecrets::parse(CREDENTIALS).unwrap();
        secrets.token_uri = token_uri;

        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        let expired = StoredToken {
            access_token: "ya29.stale".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: Some(Utc::now() - Duration::hours(1)),
            scopes: vec![CALENDAR_SCOPE.to_string()],
        };
        std::fs::write(&token_path, serde_json::to_string(&expired).unwrap()).unwrap();

        let auth = GoogleAuth::new(secrets, None, token_path.clone());
        assert_eq!(auth.access_token().await.unwrap(), "ya29.fresh");

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /token"));
        assert!(request.contains("grant_type=refresh_token"));

        // Google omits the refresh token on refresh, so the old one is kept
        let saved: StoredToken =
            serde_json::from_str(&std::fs::read_to_string(&token_path).unwrap()).unwrap();
        assert_eq!(saved.access_token, "ya29.fresh");
        assert_eq!(saved.refresh_token.as_deref(), Some("1//refresh"));
        assert!(!saved.needs_refresh(Utc::now()));
        assert_eq!(saved.scopes, vec![CALENDAR_SCOPE.to_string()]);

        // served from the cache afterwards, no second request
        assert_eq!(auth.access_token().await.unwrap(), "ya29.fresh");
    }
}
