#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jex_store::registry::{
    CredentialProvider, Credentials, HttpRequest, HttpResponse, HttpTransport, TokenStore,
    TransportError,
};
use jex_store::{
    ComponentManager, ExchangeError, ExchangeOptions, HostPackageManager, RegistryClient,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use url::Url;
use zip::write::FileOptions;

pub const EXCHANGE_URL: &str = "https://exchange.test/api/";
pub const TOKEN: &str = "token-1";

/// Route library logs to the test output, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a zip archive in memory from `(path, content)` pairs
pub fn zip_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default();
    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn descriptor(name: &str, version: &str) -> String {
    json!({"name": name, "version": version}).to_string()
}

pub fn member_descriptor(pack: &str, name: &str, version: &str) -> String {
    json!({"name": name, "version": version, "pack": pack}).to_string()
}

pub fn pack_descriptor(name: &str, version: &str) -> String {
    json!({"name": name, "version": version, "type": "pack"}).to_string()
}

/// Scripted in-memory exchange.
///
/// Serves registered archives and metadata, pops resolver answers in order, and
/// optionally demands a bearer token on every request except `auth/token`.
#[derive(Default)]
pub struct FakeExchange {
    archives: Mutex<HashMap<String, Vec<u8>>>,
    metadata: Mutex<HashMap<String, Value>>,
    solutions: Mutex<VecDeque<(u16, Value)>>,
    failures: Mutex<HashMap<String, VecDeque<u16>>>,
    require_token: Mutex<Option<String>>,
    rotate_to: Mutex<Option<String>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn archive(&self, full_name: &str, version: &str, bytes: Vec<u8>) {
        self.archives.lock().unwrap().insert(
            format!("components/{}/versions/{}/download", full_name, version),
            bytes,
        );
    }

    pub fn metadata(&self, name: &str, body: Value) {
        self.metadata
            .lock()
            .unwrap()
            .insert(format!("components/{}", name), body);
    }

    pub fn solution(&self, body: Value) {
        self.solutions.lock().unwrap().push_back((200, body));
    }

    pub fn resolver_error(&self, status: u16, body: Value) {
        self.solutions.lock().unwrap().push_back((status, body));
    }

    /// Answer the next requests to `path` with these statuses before serving it
    pub fn fail(&self, path: &str, statuses: &[u16]) {
        self.failures
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .extend(statuses.iter().copied());
    }

    pub fn require_token(&self, token: &str) {
        *self.require_token.lock().unwrap() = Some(token.to_string());
    }

    /// Hand out `token` through the rotating-token headers on the next success
    pub fn rotate_to(&self, token: &str) {
        *self.rotate_to.lock().unwrap() = Some(token.to_string());
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Relative paths of every request made, in order
    pub fn paths(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| relative(&r.url).to_string())
            .collect()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.paths()
            .into_iter()
            .filter(|p| p.ends_with("/download"))
            .collect()
    }

    fn respond(&self, request: &HttpRequest) -> HttpResponse {
        let path = relative(&request.url).to_string();

        if let Some(status) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&path)
            .and_then(|queue| queue.pop_front())
        {
            return json_response(status, json!({"errors": [{"id": "SERVER_BUSY", "message": "try again"}]}));
        }

        if path == "auth/token" {
            return json_response(200, json!({"access_token": TOKEN, "expires_in": 3600}));
        }

        if let Some(token) = self.require_token.lock().unwrap().as_ref() {
            let expected = format!("Bearer {}", token);
            if request.header_value("Authorization") != Some(expected.as_str()) {
                return json_response(401, json!({}));
            }
        }

        if path == "dependencyResolver" {
            return match self.solutions.lock().unwrap().pop_front() {
                Some((status, body)) => json_response(status, body),
                None => json_response(200, json!({"solutions": [], "message": "no scripted solution"})),
            };
        }

        if let Some(bytes) = self.archives.lock().unwrap().get(&path) {
            return HttpResponse {
                status: 200,
                headers: vec![("content-type".to_string(), "application/zip".to_string())],
                body: bytes.clone(),
            };
        }

        if let Some(body) = self.metadata.lock().unwrap().get(&path) {
            return json_response(200, body.clone());
        }

        if path.starts_with("components?") {
            return json_response(201, json!({"status": "published"}));
        }

        json_response(
            404,
            json!({"errors": [{"id": "COMPONENT_NOT_FOUND", "message": format!("{} not found", path)}]}),
        )
    }
}

#[async_trait]
impl HttpTransport for FakeExchange {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut response = self.respond(&request);

        if response.is_success()
            && let Some(token) = self.rotate_to.lock().unwrap().take()
        {
            response
                .headers
                .push(("x-access-token".to_string(), token.clone()));
            response
                .headers
                .push(("x-access-token-expires-in".to_string(), "1800".to_string()));
            *self.require_token.lock().unwrap() = Some(token);
        }

        Ok(response)
    }
}

fn relative(url: &str) -> &str {
    url.strip_prefix(EXCHANGE_URL).unwrap_or(url)
}

fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: serde_json::to_vec(&body).unwrap(),
    }
}

/// Credential source that counts how often it was asked
#[derive(Default)]
pub struct CountingCredentials {
    pub prompts: AtomicUsize,
}

impl CountingCredentials {
    pub fn count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for CountingCredentials {
    async fn credentials(&self, _exchange_url: &Url) -> jex_store::Result<Credentials> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(Credentials::new("developer", "secret"))
    }
}

/// Host package manager that records installs and fails for listed packages
#[derive(Default)]
pub struct RecordingHost {
    pub installs: Mutex<Vec<String>>,
    pub failing: Vec<String>,
}

impl RecordingHost {
    pub fn failing(packages: &[&str]) -> Self {
        Self {
            installs: Mutex::new(Vec::new()),
            failing: packages.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn installs(&self) -> Vec<String> {
        self.installs.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostPackageManager for RecordingHost {
    async fn install(&self, package: &str, version: &str, _project_root: &Path) -> jex_store::Result<()> {
        self.installs
            .lock()
            .unwrap()
            .push(format!("{}@{}", package, version));

        if self.failing.iter().any(|p| p == package) {
            return Err(ExchangeError::HostPackageManager {
                command: format!("npm install {}@{}", package, version),
                message: "E404 not found".to_string(),
            });
        }
        Ok(())
    }
}

/// A temporary project wired to a fake exchange
pub struct TestProject {
    pub dir: TempDir,
    pub exchange: Arc<FakeExchange>,
    pub credentials: Arc<CountingCredentials>,
    pub host: Arc<RecordingHost>,
    pub client: Arc<RegistryClient>,
    pub manager: ComponentManager,
}

impl TestProject {
    pub fn new() -> Self {
        Self::with_host(RecordingHost::default())
    }

    pub fn with_host(host: RecordingHost) -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let exchange = FakeExchange::new();
        let credentials = Arc::new(CountingCredentials::default());
        let host = Arc::new(host);

        let client = Arc::new(RegistryClient::new(
            Url::parse(EXCHANGE_URL).unwrap(),
            exchange.clone(),
            TokenStore::new(dir.path().join(".tokens")),
            credentials.clone(),
        ));

        let options = ExchangeOptions::new(dir.path(), Url::parse(EXCHANGE_URL).unwrap())
            .with_lock_retry_delay(std::time::Duration::from_millis(1));
        let manager = ComponentManager::new(options, client.clone(), host.clone());

        Self {
            dir,
            exchange,
            credentials,
            host,
            client,
            manager,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn components(&self) -> std::path::PathBuf {
        self.dir.path().join("jet_components")
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read_json(&self, relative: &str) -> Value {
        let content = std::fs::read_to_string(self.root().join(relative)).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root().join(relative).exists()
    }

    /// Sorted directory names directly below `relative`
    pub fn dir_names(&self, relative: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.root().join(relative))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    /// Register a three-member pack (`button`, `input`, `slider`) at `version`
    pub fn publish_pack(&self, version: &str) {
        let descriptor = pack_descriptor("oj-pack", version);
        self.exchange.archive(
            "oj-pack",
            version,
            zip_archive(&[
                ("component.json", descriptor.as_str()),
                ("README.md", "pack readme"),
            ]),
        );
        for member in ["button", "input", "slider"] {
            let descriptor = member_descriptor("oj-pack", member, version);
            let script = format!("{}.js", member);
            let types = format!("{}.d.ts", member);
            self.exchange.archive(
                &format!("oj-pack-{}", member),
                version,
                zip_archive(&[
                    ("component.json", descriptor.as_str()),
                    (script.as_str(), "export default {}"),
                    ("min/bundle.min.js", "x"),
                    (types.as_str(), "export {}"),
                ]),
            );
        }
    }
}
