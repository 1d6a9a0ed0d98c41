// SPDX-License-Identifier: MIT

//! Review and revision stages of the quality loop

use super::{prompts, QUALITY_CHECKER, QUALITY_FIXER};
use crate::error::DigestError;
use crate::model::ModelClient;
use crate::retry::with_timeout;
use crate::tools::Publisher;
use crate::workflow::graph::{Node, NodeContext};
use crate::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    NeedsRevision,
}

/// Structured reviewer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Review {
    pub verdict: Verdict,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl Review {
    /// Revision request text; never empty
    pub fn fix_plan(&self) -> String {
        let issues: Vec<String> = self
            .issues
            .iter()
            .map(|issue| issue.trim())
            .filter(|issue| !issue.is_empty())
            .map(|issue| format!("- {}", issue))
            .collect();
        if issues.is_empty() {
            prompts::GENERIC_FIX.to_string()
        } else {
            issues.join("\n")
        }
    }
}

/// Reviews the draft and publishes it once approved
pub struct QualityChecker {
    model: ModelClient,
    publisher: Arc<dyn Publisher>,
    publish_timeout: Duration,
}

impl QualityChecker {
    pub fn new(model: ModelClient, publisher: Arc<dyn Publisher>, publish_timeout: Duration) -> Self {
        Self {
            model,
            publisher,
            publish_timeout,
        }
    }

    async fn review(&self, state: &WorkflowState) -> Result<Review, DigestError> {
        let messages = prompts::quality_checker(&state.result, &state.plan_of_article, state.auditory);
        match self.model.structured::<Review>("quality_review", &messages).await {
            Ok(review) => Ok(review),
            Err(DigestError::ClassificationAmbiguity { output, .. }) => {
                log::warn!("Reviewer answer not understood, asking for revision: {}", output);
                Ok(Review {
                    verdict: Verdict::NeedsRevision,
                    issues: Vec::new(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

fn finished() -> StateUpdate {
    StateUpdate {
        plan_to_fix: Some(String::new()),
        ..Default::default()
    }
}

impl QualityChecker {
    async fn check(
        &self,
        state: &WorkflowState,
        mut ctx: Option<&mut NodeContext<'_>>,
    ) -> Result<StateUpdate, DigestError> {
        if state.published {
            log::info!("Draft already published, skipping review");
            return Ok(finished());
        }
        if state.publish_pending {
            // The last publish attempt may have reached the wall; never post twice
            log::error!(
                "An earlier publish attempt has an unknown outcome; finishing without publishing"
            );
            return Ok(finished());
        }

        let review = self.review(state).await?;
        if review.verdict == Verdict::NeedsRevision {
            log::info!("Draft needs revision ({} issues)", review.issues.len());
            return Ok(StateUpdate {
                plan_to_fix: Some(review.fix_plan()),
                ..Default::default()
            });
        }

        if let Some(ctx) = ctx.as_deref_mut() {
            ctx.record(StateUpdate {
                publish_pending: Some(true),
                ..Default::default()
            })
            .await?;
        }
        let outcome = with_timeout(
            "publish",
            self.publish_timeout,
            self.publisher.publish(&state.result),
        )
        .await;

        match outcome {
            Ok(receipt) => {
                log::info!("Draft approved and published as {}", receipt.post_id);
                Ok(StateUpdate {
                    plan_to_fix: Some(String::new()),
                    published: Some(true),
                    post_id: Some(receipt.post_id),
                    publish_pending: Some(false),
                    ..Default::default()
                })
            }
            // A timed out call may still land, so the pending mark stays
            Err(e @ DigestError::Timeout { .. }) => Err(e),
            Err(e) => {
                if let Some(ctx) = ctx {
                    let cleared = ctx
                        .record(StateUpdate {
                            publish_pending: Some(false),
                            ..Default::default()
                        })
                        .await;
                    if let Err(clear_err) = cleared {
                        log::warn!("Could not clear the pending publish mark: {}", clear_err);
                    }
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Node for QualityChecker {
    fn name(&self) -> &str {
        QUALITY_CHECKER
    }

    /// Review and publish without persisting the publish intent
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, DigestError> {
        self.check(state, None).await
    }

    async fn run_with_context(
        &self,
        ctx: &mut NodeContext<'_>,
    ) -> Result<StateUpdate, DigestError> {
        let state = ctx.state().clone();
        self.check(&state, Some(ctx)).await
    }
}

/// Rewrites the draft per the review and counts the round
pub struct QualityFixer {
    model: ModelClient,
}

impl QualityFixer {
    pub fn new(model: ModelClient) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node for QualityFixer {
    fn name(&self) -> &str {
        QUALITY_FIXER
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, DigestError> {
        let messages = prompts::quality_fixer(&state.result, &state.plan_to_fix, state.auditory);
        let revised = self.model.text(&messages).await?;
        if revised.trim().is_empty() {
            return Err(DigestError::parse("model returned an empty revision"));
        }
        let fix_num = state.fix_num + 1;
        log::info!("Revision round {} done", fix_num);

        Ok(StateUpdate {
            result: Some(revised.trim().to_string()),
            fix_num: Some(fix_num),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::PostReceipt;
    use crate::workflow::checkpoint::{Checkpoint, Checkpointer, InMemoryCheckpointer};
    use crate::workflow::nodes::testing::{client, ScriptedModel};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        posts: Mutex<Vec<String>>,
        reject: bool,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, text: &str) -> Result<PostReceipt, DigestError> {
            if self.reject {
                return Err(DigestError::PublishRejected {
                    code: 15,
                    message: "Access denied".to_string(),
                });
            }
            let mut posts = self.posts.lock().unwrap();
            posts.push(text.to_string());
            Ok(PostReceipt {
                post_id: format!("post-{}", posts.len()),
            })
        }
    }

    fn drafted() -> WorkflowState {
        WorkflowState {
            result: "Final text".to_string(),
            plan_to_fix: "- old remark".to_string(),
            ..WorkflowState::new("p")
        }
    }

    fn checker(model: Arc<ScriptedModel>, publisher: Arc<RecordingPublisher>) -> QualityChecker {
        QualityChecker::new(client(model), publisher, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_approved_publishes_literal_result() {
        let publisher = Arc::new(RecordingPublisher::default());
        let node = checker(
            ScriptedModel::new([r#"{"verdict": "approved", "issues": []}"#]),
            publisher.clone(),
        );

        let update = node.run(&drafted()).await.unwrap();
        assert_eq!(update.published, Some(true));
        assert_eq!(update.plan_to_fix.as_deref(), Some(""));
        assert_eq!(update.post_id.as_deref(), Some("post-1"));
        assert_eq!(*publisher.posts.lock().unwrap(), vec!["Final text".to_string()]);
    }

    #[tokio::test]
    async fn test_needs_revision_lists_issues() {
        let publisher = Arc::new(RecordingPublisher::default());
        let node = checker(
            ScriptedModel::new([
                r#"{"verdict": "needs_revision", "issues": ["intro too long", " "]}"#,
            ]),
            publisher.clone(),
        );

        let update = node.run(&drafted()).await.unwrap();
        assert_eq!(update.plan_to_fix.as_deref(), Some("- intro too long"));
        assert!(update.published.is_none());
        assert!(publisher.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revision_without_issues_gets_generic_plan() {
        let node = checker(
            ScriptedModel::new([r#"{"verdict": "needs_revision"}"#]),
            Arc::new(RecordingPublisher::default()),
        );
        let update = node.run(&drafted()).await.unwrap();
        assert_eq!(update.plan_to_fix.as_deref(), Some(prompts::GENERIC_FIX));
    }

    #[tokio::test]
    async fn test_unparseable_review_never_approves() {
        let publisher = Arc::new(RecordingPublisher::default());
        let node = checker(
            ScriptedModel::new(["Looks approved to me!"]),
            publisher.clone(),
        );

        let update = node.run(&drafted()).await.unwrap();
        assert!(!update.plan_to_fix.unwrap().is_empty());
        assert!(update.published.is_none());
        assert!(publisher.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_fails_node() {
        let publisher = Arc::new(RecordingPublisher {
            reject: true,
            ..Default::default()
        });
        let node = checker(ScriptedModel::new([r#"{"verdict": "approved"}"#]), publisher);

        let err = node.run(&drafted()).await.unwrap_err();
        assert!(matches!(err, DigestError::PublishRejected { code: 15, .. }));
    }

    #[tokio::test]
    async fn test_already_published_is_not_reposted() {
        let model = ScriptedModel::new(Vec::<String>::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let node = checker(model.clone(), publisher.clone());

        let mut state = drafted();
        state.published = true;
        let update = node.run(&state).await.unwrap();
        assert_eq!(update.plan_to_fix.as_deref(), Some(""));
        assert_eq!(model.calls(), 0);
        assert!(publisher.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_publish_is_not_retried() {
        let model = ScriptedModel::new(Vec::<String>::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let node = checker(model.clone(), publisher.clone());

        let mut state = drafted();
        state.publish_pending = true;
        let update = node.run(&state).await.unwrap();
        assert_eq!(update.plan_to_fix.as_deref(), Some(""));
        assert!(update.published.is_none());
        assert_eq!(model.calls(), 0);
        assert!(publisher.posts.lock().unwrap().is_empty());
    }

    /// Asserts the intent is already stored when the post goes out
    struct IntentCheckingPublisher {
        store: Arc<InMemoryCheckpointer>,
        pending_seen: Mutex<Option<bool>>,
        fail: bool,
    }

    #[async_trait]
    impl Publisher for IntentCheckingPublisher {
        async fn publish(&self, _text: &str) -> Result<PostReceipt, DigestError> {
            let stored = self.store.load("s1").await.unwrap().unwrap();
            *self.pending_seen.lock().unwrap() = Some(stored.state.publish_pending);
            if self.fail {
                return Err(DigestError::transport("vk", "HTTP 502"));
            }
            Ok(PostReceipt {
                post_id: "77".to_string(),
            })
        }
    }

    fn intent_publisher(store: &Arc<InMemoryCheckpointer>, fail: bool) -> Arc<IntentCheckingPublisher> {
        Arc::new(IntentCheckingPublisher {
            store: store.clone(),
            pending_seen: Mutex::new(None),
            fail,
        })
    }

    #[tokio::test]
    async fn test_publish_intent_saved_before_posting() {
        let store = Arc::new(InMemoryCheckpointer::new());
        let publisher = intent_publisher(&store, false);
        let node = QualityChecker::new(
            client(ScriptedModel::new([r#"{"verdict": "approved"}"#])),
            publisher.clone(),
            Duration::from_secs(5),
        );

        let mut cp = Checkpoint::initial(drafted(), QUALITY_CHECKER);
        let mut ctx = NodeContext::new("s1", store.as_ref(), &mut cp);
        let update = node.run_with_context(&mut ctx).await.unwrap();

        assert_eq!(*publisher.pending_seen.lock().unwrap(), Some(true));
        assert_eq!(update.published, Some(true));
        assert_eq!(update.publish_pending, Some(false));
        assert_eq!(update.post_id.as_deref(), Some("77"));
    }

    #[tokio::test]
    async fn test_definite_publish_failure_clears_intent() {
        let store = Arc::new(InMemoryCheckpointer::new());
        let publisher = intent_publisher(&store, true);
        let node = QualityChecker::new(
            client(ScriptedModel::new([r#"{"verdict": "approved"}"#])),
            publisher.clone(),
            Duration::from_secs(5),
        );

        let mut cp = Checkpoint::initial(drafted(), QUALITY_CHECKER);
        let mut ctx = NodeContext::new("s1", store.as_ref(), &mut cp);
        let err = node.run_with_context(&mut ctx).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(*publisher.pending_seen.lock().unwrap(), Some(true));
        let stored = store.load("s1").await.unwrap().unwrap();
        assert!(!stored.state.publish_pending);
        assert!(!stored.state.published);
    }

    #[tokio::test]
    async fn test_fixer_increments_fix_num() {
        let model = ScriptedModel::new(["Better text"]);
        let node = QualityFixer::new(client(model.clone()));

        let mut state = drafted();
        state.fix_num = 1;
        let update = node.run(&state).await.unwrap();
        assert_eq!(update.result.as_deref(), Some("Better text"));
        assert_eq!(update.fix_num, Some(2));
        assert!(update.plan_to_fix.is_none());
        assert!(model.seen.lock().unwrap()[0][1].content.contains("old remark"));
    }
}
