//! Shared test utilities for integration tests.
//!
//! Not all functions are used by every test file, but they're shared across tests.
#![allow(dead_code)]

use std::path::Path;

use git2::{Oid, Repository, Signature};
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rubbersoul::backend::Endpoint;

/// A test git repository builder for integration tests.
pub struct TestRepo {
    pub dir: tempfile::TempDir,
    pub repo: Repository,
}

impl TestRepo {
    /// Create a new empty git repository in a temp directory.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let repo = Repository::init(dir.path()).expect("Failed to init git repo");
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Get the test signature for commits.
    fn signature(&self) -> Signature<'_> {
        Signature::now("Test User", "test@example.com").expect("Failed to create signature")
    }

    /// Write `content` to `name` in the working tree without staging it.
    pub fn write(&self, name: &str, content: &str) {
        let file_path = self.dir.path().join(name);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(file_path, content).expect("Failed to write test file");
    }

    /// Write and stage a file.
    pub fn stage(&self, name: &str, content: &str) {
        self.write(name, content);
        let mut index = self.repo.index().expect("Failed to get index");
        index.add_path(Path::new(name)).expect("Failed to add file");
        index.write().expect("Failed to write index");
    }

    /// Commit whatever is staged. Returns the commit OID.
    pub fn commit(&self, message: &str) -> Oid {
        let sig = self.signature();

        let mut index = self.repo.index().expect("Failed to get index");
        let tree_id = index.write_tree().expect("Failed to write tree");
        let tree = self.repo.find_tree(tree_id).expect("Failed to find tree");

        // Get parent commit if exists
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("Failed to create commit")
    }
}

/// A mock Ollama server.
pub struct MockOllama {
    pub server: MockServer,
}

impl MockOllama {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Endpoint pointing at the mock server.
    pub fn endpoint(&self) -> Endpoint {
        let addr = self.server.address();
        Endpoint::new(addr.ip().to_string(), addr.port())
    }

    /// Serve `GET /api/tags` with the given model names.
    pub async fn with_models(&self, names: &[&str]) {
        let models: Vec<Value> = names
            .iter()
            .map(|n| json!({"name": n, "model": n}))
            .collect();

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": models})))
            .mount(&self.server)
            .await;
    }

    /// Serve a single-shot chat reply.
    pub async fn with_reply(&self, content: &str) {
        self.with_reply_json(json!({
            "model": "llama3",
            "message": {"role": "assistant", "content": content},
            "done": true
        }))
        .await;
    }

    /// Serve an arbitrary single-shot chat body.
    pub async fn with_reply_json(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"stream": false, "keep_alive": "300s"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Serve a streaming reply made of `chunks`, followed by a `done` line.
    pub async fn with_stream(&self, chunks: &[&str]) {
        self.with_stream_body(ndjson(chunks)).await;
    }

    /// Serve a raw NDJSON body to streaming requests.
    pub async fn with_stream_body(&self, body: String) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-ndjson")
                    .set_body_string(body),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer every chat request with `status`.
    pub async fn with_chat_status(&self, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"keep_alive": "300s"})))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Expect exactly `times` unload requests for any model.
    pub async fn expect_unload(&self, times: u64) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"messages": [], "keep_alive": "0s"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Number of chat requests received so far, unloads included.
    pub async fn chat_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == "/api/chat")
            .count()
    }
}

/// Streaming body for `chunks`, one JSON object per line.
pub fn ndjson(chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        let line = json!({
            "message": {"role": "assistant", "content": chunk},
            "done": false
        });
        body.push_str(&line.to_string());
        body.push('\n');
    }
    body.push_str(&json!({"message": {"role": "assistant", "content": ""}, "done": true}).to_string());
    body.push('\n');
    body
}
