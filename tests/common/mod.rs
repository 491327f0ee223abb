use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tempfile::TempDir;

use chatstream::chat::Session;
use chatstream::completion::{output_channel, ChatCompletionStream, CompletionOutput};
use chatstream::providers::{CompletionDelta, CompletionRequest, DeltaStream, Provider};
use chatstream::storage::{InMemorySessionStore, SessionGateway, SessionSummary, SqliteSessionStore};
use chatstream::tokenizer::WordCounter;
use tokio::sync::mpsc;

#[allow(dead_code)]
pub fn create_temp_store() -> (SqliteSessionStore, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("sessions.db");
    let store =
        SqliteSessionStore::new_with_path(db_path).expect("failed to create sqlite store with path");
    (store, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Text that costs exactly `n` tokens under `WordCounter`
#[allow(dead_code)]
pub fn words(n: usize) -> String {
    vec!["w"; n].join(" ")
}

/// Provider that replays a fixed script of fragments and failures
#[allow(dead_code)]
pub struct ScriptedProvider {
    script: Vec<std::result::Result<String, String>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new(script: Vec<std::result::Result<&str, &str>>) -> Self {
        Self {
            script: script
                .into_iter()
                .map(|step| step.map(str::to_string).map_err(str::to_string))
                .collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(fragments: &[&str]) -> Self {
        Self::new(fragments.iter().map(|f| Ok(*f)).collect())
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().expect("requests lock").last().cloned()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> chatstream::Result<DeltaStream> {
        self.requests.lock().expect("requests lock").push(request);
        let items: Vec<chatstream::Result<CompletionDelta>> = self
            .script
            .iter()
            .map(|step| match step {
                Ok(text) => Ok(CompletionDelta::text(text.clone())),
                Err(message) => Err(anyhow::anyhow!(message.clone())),
            })
            .collect();
        Ok(Box::pin(stream::iter(items)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// In-memory gateway that counts calls and can be told to fail saves
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingGateway {
    pub inner: InMemorySessionStore,
    pub creates: AtomicUsize,
    pub saves: AtomicUsize,
    pub fail_writes: AtomicBool,
}

#[allow(dead_code)]
impl CountingGateway {
    pub fn writes(&self) -> usize {
        self.creates.load(Ordering::SeqCst) + self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionGateway for CountingGateway {
    async fn find_by_id(&self, id: &str) -> chatstream::Result<Option<Session>> {
        self.inner.find_by_id(id).await
    }

    async fn create(&self, session: &Session) -> chatstream::Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("write rejected");
        }
        self.inner.create(session).await
    }

    async fn save(&self, session: &Session) -> chatstream::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("write rejected");
        }
        self.inner.save(session).await
    }

    async fn list(&self) -> chatstream::Result<Vec<SessionSummary>> {
        self.inner.list().await
    }

    async fn delete(&self, id: &str) -> chatstream::Result<bool> {
        self.inner.delete(id).await
    }
}

/// Orchestrator wired to `gateway` and `provider` with a word-count tokenizer
#[allow(dead_code)]
pub fn engine(
    gateway: Arc<dyn SessionGateway>,
    provider: Arc<dyn Provider>,
    capacity: usize,
) -> (ChatCompletionStream, mpsc::Receiver<CompletionOutput>) {
    let (tx, rx) = output_channel(capacity);
    (
        ChatCompletionStream::new(gateway, provider, Arc::new(WordCounter), tx),
        rx,
    )
}

/// Every snapshot currently queued, in order
#[allow(dead_code)]
pub fn drain(rx: &mut mpsc::Receiver<CompletionOutput>) -> Vec<CompletionOutput> {
    let mut out = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        out.push(snapshot);
    }
    out
}
