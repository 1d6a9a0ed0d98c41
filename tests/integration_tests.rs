//! Integration tests for the article pipeline
//!
//! These tests drive the full graph end-to-end with scripted collaborators.

use async_trait::async_trait;
use digest_pipeline::error::{CheckpointError, WorkflowError};
use digest_pipeline::model::{ChatModel, GenerationConfig, Message, ModelClient, ResponseSchema};
use digest_pipeline::tools::{Article, ArticleFeed, PostReceipt, Publisher};
use digest_pipeline::workflow::nodes::{
    ARTICLES_FETCHER, COPYRIGHTER, LEVEL_DEFINE, PLANNER, QUALITY_CHECKER, QUALITY_FIXER,
};
use digest_pipeline::workflow::{
    build_engine, AudienceLevel, Checkpoint, Checkpointer, Collaborators, Cursor, Engine,
    EngineEvent, InMemoryCheckpointer, PipelineSettings, SqliteCheckpointer, WorkflowState,
};
use digest_pipeline::DigestError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock Components
// ============================================================================

const APPROVED: &str = r#"{"verdict": "approved", "issues": []}"#;
const REJECTED: &str = r#"{"verdict": "needs_revision", "issues": ["add an example"]}"#;

/// Mock model replying from per-schema queues; free-text calls share one queue
#[derive(Default)]
struct MockModel {
    structured: Mutex<HashMap<String, VecDeque<String>>>,
    text: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockModel {
    fn new() -> Self {
        Self::default()
    }

    fn on(self, schema: &str, reply: &str) -> Self {
        self.structured
            .lock()
            .unwrap()
            .entry(schema.to_string())
            .or_default()
            .push_back(reply.to_string());
        self
    }

    fn text(self, reply: &str) -> Self {
        self.text.lock().unwrap().push_back(reply.to_string());
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Standard front half of the pipeline: level, plan, first draft
    fn drafting() -> Self {
        Self::new()
            .on("audience_level", r#"{"level": "intermediate"}"#)
            .on(
                "article_plan",
                r#"{"title": "Weekly AI", "sections": [{"heading": "News", "key_points": ["a"]}]}"#,
            )
            .text("Draft v0")
    }

    fn calls_to(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == name)
            .count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Concatenated message contents of call number `i`
    fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl ChatModel for MockModel {
    async fn complete(
        &self,
        messages: &[Message],
        _config: Option<&GenerationConfig>,
        schema: Option<&ResponseSchema>,
    ) -> Result<String, DigestError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let key = schema.map(|s| s.name.clone()).unwrap_or_else(|| "text".to_string());
        self.calls.lock().unwrap().push(key.clone());
        self.prompts.lock().unwrap().push(
            messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        );

        let reply = match schema {
            Some(schema) => self
                .structured
                .lock()
                .unwrap()
                .get_mut(&schema.name)
                .and_then(|queue| queue.pop_front()),
            None => self.text.lock().unwrap().pop_front(),
        };
        reply.ok_or_else(|| DigestError::transport("mock", format!("no reply scripted for {}", key)))
    }
}

struct MockFeed {
    fetches: AtomicUsize,
}

impl MockFeed {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fetches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ArticleFeed for MockFeed {
    async fn fetch(&self, n: usize) -> Result<Vec<Article>, DigestError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok((1..=3)
            .take(n)
            .map(|i| Article {
                title: format!("Article {}", i),
                link: format!("https://habr.com/ru/articles/{}/", i),
                full_text: format!("Full text {}", i),
                summary: format!("Summary {}", i),
            })
            .collect())
    }
}

/// Records posts, optionally failing every attempt
#[derive(Default)]
struct MockPublisher {
    posts: Mutex<Vec<String>>,
    fail: bool,
}

impl MockPublisher {
    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, text: &str) -> Result<PostReceipt, DigestError> {
        if self.fail {
            return Err(DigestError::transport("vk", "HTTP 503"));
        }
        let mut posts = self.posts.lock().unwrap();
        posts.push(text.to_string());
        Ok(PostReceipt {
            post_id: format!("{}", 1000 + posts.len()),
        })
    }
}

/// Fails the first save that records a successful publish, as if the
/// process died between posting and checkpointing
struct CrashAfterPublish {
    inner: InMemoryCheckpointer,
    crashed: Mutex<bool>,
}

impl CrashAfterPublish {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryCheckpointer::new(),
            crashed: Mutex::new(false),
        })
    }
}

#[async_trait]
impl Checkpointer for CrashAfterPublish {
    async fn save(&self, session_id: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        {
            let mut crashed = self.crashed.lock().unwrap();
            if checkpoint.state.published && !*crashed {
                *crashed = true;
                return Err(CheckpointError::Storage("disk I/O error".to_string()));
            }
        }
        self.inner.save(session_id, checkpoint).await
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        self.inner.load(session_id).await
    }
}

struct Harness {
    model: Arc<MockModel>,
    feed: Arc<MockFeed>,
    publisher: Arc<MockPublisher>,
    engine: Engine,
}

fn harness_with(
    model: MockModel,
    publisher: Arc<MockPublisher>,
    checkpointer: Arc<dyn Checkpointer>,
    model_timeout: Duration,
) -> Harness {
    harness_with_settings(
        model,
        publisher,
        checkpointer,
        model_timeout,
        PipelineSettings::default(),
    )
}

fn harness_with_settings(
    model: MockModel,
    publisher: Arc<MockPublisher>,
    checkpointer: Arc<dyn Checkpointer>,
    model_timeout: Duration,
    settings: PipelineSettings,
) -> Harness {
    let model = Arc::new(model);
    let feed = MockFeed::new();
    let client = ModelClient::new(model.clone(), GenerationConfig::default(), model_timeout);
    let collaborators = Collaborators::new(client, feed.clone(), publisher.clone());
    let engine = build_engine(&collaborators, &settings, checkpointer).unwrap();
    Harness {
        model,
        feed,
        publisher,
        engine,
    }
}

fn harness(model: MockModel) -> Harness {
    harness_with(
        model,
        Arc::new(MockPublisher::default()),
        Arc::new(InMemoryCheckpointer::new()),
        Duration::from_secs(5),
    )
}

// ============================================================================
// Pipeline Scenarios
// ============================================================================

#[tokio::test]
async fn test_approved_on_first_review() {
    let h = harness(MockModel::drafting().on("quality_review", APPROVED));

    let state = h.engine.invoke("a", "Write about this week's AI news").await.unwrap();

    assert!(state.published);
    assert_eq!(state.fix_num, 0);
    assert!(state.plan_to_fix.is_empty());
    assert_eq!(state.post_id.as_deref(), Some("1001"));
    assert_eq!(state.result, "Draft v0");
    assert!(state.original_articles.contains("Article 2"));
    assert!(!state.original_articles.contains("Article 3"));
    assert_eq!(h.publisher.posts(), vec!["Draft v0".to_string()]);
    assert_eq!(h.model.calls_to("quality_review"), 1);
    assert_eq!(h.feed.fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_two_revisions_then_approved() {
    let model = MockModel::drafting()
        .on("quality_review", REJECTED)
        .on("quality_review", REJECTED)
        .on("quality_review", APPROVED)
        .text("Draft v1")
        .text("Draft v2");
    let h = harness(model);

    let state = h.engine.invoke("b", "prompt").await.unwrap();

    assert!(state.published);
    assert_eq!(state.fix_num, 2);
    assert_eq!(state.result, "Draft v2");
    assert_eq!(h.publisher.posts(), vec!["Draft v2".to_string()]);
    assert_eq!(h.model.calls_to("quality_review"), 3);
}

#[tokio::test]
async fn test_novice_request_revised_once() {
    let model = MockModel::new()
        .on("audience_level", r#"{"level": "novice"}"#)
        .on(
            "article_plan",
            r#"{"title": "What is a neural network", "sections": [{"heading": "Idea", "key_points": ["neurons"]}]}"#,
        )
        .text("Draft v0")
        .on("quality_review", REJECTED)
        .text("Draft v1")
        .on("quality_review", APPROVED);
    let h = harness(model);

    let state = h
        .engine
        .invoke("novice", "Explain neural networks to my grandmother")
        .await
        .unwrap();

    assert_eq!(state.auditory, Some(AudienceLevel::Novice));
    assert!(state.published);
    assert_eq!(state.fix_num, 1);
    assert!(state.plan_to_fix.is_empty());
    assert_eq!(state.result, "Draft v1");
    assert_eq!(h.publisher.posts(), vec!["Draft v1".to_string()]);
    assert_eq!(h.model.calls_to("quality_review"), 2);
}

#[tokio::test]
async fn test_never_approved_stops_at_fix_budget() {
    let mut model = MockModel::drafting();
    for i in 0..4 {
        model = model.on("quality_review", REJECTED);
        if i < 3 {
            model = model.text(&format!("Draft v{}", i + 1));
        }
    }
    let h = harness(model);

    let state = h.engine.invoke("c", "prompt").await.unwrap();

    assert!(!state.published);
    assert_eq!(state.fix_num, 3);
    assert_eq!(state.plan_to_fix, "- add an example");
    assert!(state.post_id.is_none());
    assert!(h.publisher.posts().is_empty());
    assert_eq!(h.model.calls_to("quality_review"), 4);

    let cp = h.engine.get_checkpoint("c").await.unwrap().unwrap();
    assert_eq!(cp.cursor, Cursor::Terminal);
    assert_eq!(cp.last_completed.as_deref(), Some(QUALITY_CHECKER));
}

#[tokio::test]
async fn test_large_fix_budget_is_not_cut_by_step_limit() {
    let mut model = MockModel::drafting();
    for i in 0..26 {
        model = model.on("quality_review", REJECTED);
        if i < 25 {
            model = model.text(&format!("Draft v{}", i + 1));
        }
    }
    let h = harness_with_settings(
        model,
        Arc::new(MockPublisher::default()),
        Arc::new(InMemoryCheckpointer::new()),
        Duration::from_secs(5),
        PipelineSettings {
            max_fixes: 25,
            max_steps: None,
        },
    );

    let state = h.engine.invoke("long", "prompt").await.unwrap();

    assert!(!state.published);
    assert_eq!(state.fix_num, 25);
    assert_eq!(state.result, "Draft v25");
    assert_eq!(h.model.calls_to("quality_review"), 26);
    let cp = h.engine.get_checkpoint("long").await.unwrap().unwrap();
    assert_eq!(cp.cursor, Cursor::Terminal);
    assert_eq!(cp.step, 55);
}

#[tokio::test]
async fn test_event_stream() {
    let h = harness(
        MockModel::drafting()
            .on("quality_review", REJECTED)
            .on("quality_review", APPROVED)
            .text("Draft v1"),
    );
    let (tx, mut rx) = tokio::sync::mpsc::channel(128);

    h.engine.invoke_with_events("e", "prompt", Some(tx)).await.unwrap();

    let mut started = Vec::new();
    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::NodeStarted { node, .. } = &event {
            started.push(node.clone());
        }
        last = Some(event);
    }
    assert_eq!(
        started,
        vec![
            LEVEL_DEFINE,
            ARTICLES_FETCHER,
            PLANNER,
            COPYRIGHTER,
            QUALITY_CHECKER,
            QUALITY_FIXER,
            QUALITY_CHECKER
        ]
    );
    assert_eq!(last, Some(EngineEvent::Finished { published: true }));
}

// ============================================================================
// Failures and Resumption
// ============================================================================

#[tokio::test]
async fn test_publish_failure_aborts_run() {
    let h = harness_with(
        MockModel::drafting().on("quality_review", APPROVED),
        MockPublisher::failing(),
        Arc::new(InMemoryCheckpointer::new()),
        Duration::from_secs(5),
    );

    let err = h.engine.invoke("p", "prompt").await.unwrap_err();
    match err {
        DigestError::Workflow(WorkflowError::NodeExecution { node, source }) => {
            assert_eq!(node, QUALITY_CHECKER);
            assert!(matches!(*source, DigestError::Transport { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let cp = h.engine.get_checkpoint("p").await.unwrap().unwrap();
    assert!(!cp.state.published);
    assert_eq!(cp.cursor, Cursor::Next(QUALITY_CHECKER.to_string()));
}

#[tokio::test]
async fn test_post_is_never_repeated_after_lost_checkpoint() {
    let store = CrashAfterPublish::new();
    let h = harness_with(
        MockModel::drafting()
            .on("quality_review", APPROVED)
            .on("quality_review", APPROVED),
        Arc::new(MockPublisher::default()),
        store.clone(),
        Duration::from_secs(5),
    );

    let err = h.engine.invoke("once", "prompt").await.unwrap_err();
    assert!(matches!(err, DigestError::Checkpoint(_)));
    assert_eq!(h.publisher.posts().len(), 1);
    let cp = store.load("once").await.unwrap().unwrap();
    assert_eq!(cp.cursor, Cursor::Next(QUALITY_CHECKER.to_string()));
    assert!(cp.state.publish_pending);

    let state = h.engine.invoke("once", "prompt").await.unwrap();
    assert_eq!(h.publisher.posts().len(), 1);
    assert!(!state.published);
    assert!(state.publish_pending);
    assert_eq!(h.model.calls_to("quality_review"), 1);
    let cp = store.load("once").await.unwrap().unwrap();
    assert_eq!(cp.cursor, Cursor::Terminal);
}

#[tokio::test]
async fn test_model_timeout_aborts_run() {
    let h = harness_with(
        MockModel::drafting().slow(Duration::from_millis(200)),
        Arc::new(MockPublisher::default()),
        Arc::new(InMemoryCheckpointer::new()),
        Duration::from_millis(20),
    );

    let err = h.engine.invoke("t", "prompt").await.unwrap_err();
    match err {
        DigestError::Workflow(WorkflowError::NodeExecution { node, source }) => {
            assert_eq!(node, LEVEL_DEFINE);
            assert!(matches!(*source, DigestError::Timeout { .. }));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    let state = h.engine.get_state("t").await.unwrap().unwrap();
    assert!(state.auditory.is_none());
}

#[tokio::test]
async fn test_concurrent_same_session_rejected() {
    let h = harness_with(
        MockModel::drafting()
            .on("quality_review", APPROVED)
            .slow(Duration::from_millis(100)),
        Arc::new(MockPublisher::default()),
        Arc::new(InMemoryCheckpointer::new()),
        Duration::from_secs(5),
    );
    let engine = Arc::new(h.engine);

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.invoke("busy", "prompt").await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let err = engine.invoke("busy", "prompt").await.unwrap_err();
    assert!(matches!(
        err,
        DigestError::Workflow(WorkflowError::SessionBusy(id)) if id == "busy"
    ));

    let state = first.await.unwrap().unwrap();
    assert!(state.published);
}

#[tokio::test]
async fn test_engines_sharing_sqlite_file_do_not_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let slow = || {
        MockModel::drafting()
            .on("quality_review", APPROVED)
            .slow(Duration::from_millis(50))
    };
    let a = harness_with(
        slow(),
        Arc::new(MockPublisher::default()),
        Arc::new(SqliteCheckpointer::new(&path).unwrap()),
        Duration::from_secs(5),
    );
    let b = harness_with(
        slow(),
        Arc::new(MockPublisher::default()),
        Arc::new(SqliteCheckpointer::new(&path).unwrap()),
        Duration::from_secs(5),
    );

    let (first, second) = tokio::join!(
        a.engine.invoke("shared", "prompt"),
        b.engine.invoke("shared", "prompt")
    );

    let busy = [&first, &second]
        .iter()
        .filter(|r| matches!(r, Err(DigestError::Workflow(WorkflowError::SessionBusy(_)))))
        .count();
    assert_eq!(busy, 1);
    assert!(first.is_ok() || second.is_ok());
    assert_eq!(a.publisher.posts().len() + b.publisher.posts().len(), 1);

    // the claim is released once the winner finishes
    let again = b.engine.invoke("shared", "prompt").await.unwrap();
    assert!(again.published);
}

#[tokio::test]
async fn test_terminal_session_returns_stored_state() {
    let h = harness(MockModel::drafting().on("quality_review", APPROVED));

    let first = h.engine.invoke("done", "prompt").await.unwrap();
    let calls = h.model.total_calls();
    let second = h.engine.invoke("done", "a different prompt").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second.original_prompt, "prompt");
    assert_eq!(h.model.total_calls(), calls);
    assert_eq!(h.publisher.posts().len(), 1);
}

#[tokio::test]
async fn test_sqlite_resume_after_failed_publish() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints.db");

    {
        let store = Arc::new(SqliteCheckpointer::new(&path).unwrap());
        let h = harness_with(
            MockModel::drafting().on("quality_review", APPROVED),
            MockPublisher::failing(),
            store,
            Duration::from_secs(5),
        );
        assert!(h.engine.invoke("resume-me", "prompt").await.is_err());
        assert_eq!(h.feed.fetches.load(Ordering::SeqCst), 1);
    }

    // Fresh process: only the review is left to run
    let store = Arc::new(SqliteCheckpointer::new(&path).unwrap());
    let h = harness_with(
        MockModel::new().on("quality_review", APPROVED),
        Arc::new(MockPublisher::default()),
        store,
        Duration::from_secs(5),
    );

    let state = h.engine.invoke("resume-me", "prompt").await.unwrap();
    assert!(state.published);
    assert_eq!(state.result, "Draft v0");
    assert_eq!(h.model.total_calls(), 1);
    assert_eq!(h.feed.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(h.publisher.posts(), vec!["Draft v0".to_string()]);
}

#[tokio::test]
async fn test_resume_at_fixer_keeps_earlier_outputs() {
    let store = Arc::new(InMemoryCheckpointer::new());
    let mut state = WorkflowState::new("Write about retrieval-augmented generation");
    state.auditory = Some(AudienceLevel::Beginner);
    state.plan_of_article = "1. What RAG is\n2. Why it helps".to_string();
    state.original_articles = "Source text about RAG".to_string();
    state.result = "Draft v0".to_string();
    state.plan_to_fix = "- add an example".to_string();
    let mut cp = Checkpoint::initial(state, QUALITY_FIXER);
    cp.step = 5;
    cp.last_completed = Some(QUALITY_CHECKER.to_string());
    store.save("mid-loop", &cp).await.unwrap();

    let h = harness_with(
        MockModel::new()
            .text("Draft v1")
            .on("quality_review", APPROVED),
        Arc::new(MockPublisher::default()),
        store.clone(),
        Duration::from_secs(5),
    );
    let (tx, mut rx) = tokio::sync::mpsc::channel(32);

    let state = h
        .engine
        .invoke_with_events("mid-loop", "ignored", Some(tx))
        .await
        .unwrap();

    let mut started = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::NodeStarted { node, .. } = event {
            started.push(node);
        }
    }
    assert_eq!(started, vec![QUALITY_FIXER, QUALITY_CHECKER]);
    assert_eq!(h.model.calls_to("audience_level"), 0);
    assert_eq!(h.model.calls_to("article_plan"), 0);
    assert_eq!(h.feed.fetches.load(Ordering::SeqCst), 0);
    assert!(h.model.prompt(0).contains("add an example"));

    assert_eq!(state.auditory, Some(AudienceLevel::Beginner));
    assert_eq!(state.plan_of_article, "1. What RAG is\n2. Why it helps");
    assert_eq!(state.original_articles, "Source text about RAG");
    assert_eq!(state.original_prompt, "Write about retrieval-augmented generation");
    assert_eq!(state.fix_num, 1);
    assert!(state.published);
    assert_eq!(h.publisher.posts(), vec!["Draft v1".to_string()]);
    let cp = store.load("mid-loop").await.unwrap().unwrap();
    assert_eq!(cp.step, 7);
}
