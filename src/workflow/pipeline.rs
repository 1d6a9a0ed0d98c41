// SPDX-License-Identifier: MIT

//! The article pipeline graph
//!
//! ```text
//! level_define -> articles_fetcher -> planner -> copyrighter -> quality_checker
//!                                                    quality_checker --revise--> quality_fixer
//!                                                    quality_checker --finish--> END
//!                                                    quality_fixer -> quality_checker
//! ```

use super::graph::{Engine, Graph, GraphBuilder, Target, DEFAULT_MAX_STEPS};
use super::nodes::{
    ArticlesFetcher, Copyrighter, LevelDefine, Planner, QualityChecker, QualityFixer,
    ARTICLES_FETCHER, COPYRIGHTER, LEVEL_DEFINE, PLANNER, QUALITY_CHECKER, QUALITY_FIXER,
    DEFAULT_ARTICLES_PER_RUN,
};
use super::router::{LoopGuard, QualityDecision, QualityRouter, MAX_FIXES};
use crate::error::DigestError;
use crate::model::ModelClient;
use crate::tools::{ArticleFeed, Publisher};
use crate::workflow::checkpoint::Checkpointer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// External services the nodes call, injected at construction
#[derive(Clone)]
pub struct Collaborators {
    pub model: ModelClient,
    pub feed: Arc<dyn ArticleFeed>,
    pub publisher: Arc<dyn Publisher>,
    /// Articles requested from the feed per run
    pub articles_per_run: usize,
    /// Deadline for one whole feed fetch, retries included
    pub feed_timeout: Duration,
    /// Deadline for one publish call, retries included
    pub publish_timeout: Duration,
}

impl Collaborators {
    pub fn new(
        model: ModelClient,
        feed: Arc<dyn ArticleFeed>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            model,
            feed,
            publisher,
            articles_per_run: DEFAULT_ARTICLES_PER_RUN,
            feed_timeout: Duration::from_secs(300),
            publish_timeout: Duration::from_secs(120),
        }
    }
}

/// Node executions of a run that never needs a revision
const LINEAR_STEPS: u32 = 5;

/// Loop and safety limits of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_fixes: u32,
    /// Node executions per invocation; derived from `max_fixes` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_fixes: MAX_FIXES,
            max_steps: None,
        }
    }
}

impl PipelineSettings {
    /// Steps of the longest legal run: the linear stages plus one
    /// fixer and checker pass per allowed revision
    pub fn required_steps(&self) -> u32 {
        self.max_fixes.saturating_mul(2).saturating_add(LINEAR_STEPS)
    }

    pub fn effective_max_steps(&self) -> u32 {
        self.max_steps
            .unwrap_or_else(|| self.required_steps().max(DEFAULT_MAX_STEPS))
    }

    /// An explicit step limit must leave room for every allowed revision
    pub fn validate(&self) -> Result<(), DigestError> {
        match self.max_steps {
            Some(limit) if limit < self.required_steps() => Err(DigestError::config(format!(
                "pipeline.max_steps ({}) is below the {} steps that max_fixes = {} needs",
                limit,
                self.required_steps(),
                self.max_fixes
            ))),
            _ => Ok(()),
        }
    }
}

/// Wire the six stages into a validated graph
pub fn build_pipeline(
    collaborators: &Collaborators,
    settings: &PipelineSettings,
) -> Result<Graph, DigestError> {
    let model = collaborators.model.clone();
    let fetcher = ArticlesFetcher::new(
        collaborators.feed.clone(),
        collaborators.articles_per_run,
        collaborators.feed_timeout,
    )?;
    let checker = QualityChecker::new(
        model.clone(),
        collaborators.publisher.clone(),
        collaborators.publish_timeout,
    );
    let budget = LoopGuard::fix_budget(settings.max_fixes);

    let graph = GraphBuilder::new()
        .add_node(Arc::new(LevelDefine::new(model.clone())))
        .add_node(Arc::new(fetcher))
        .add_node(Arc::new(Planner::new(model.clone())))
        .add_node(Arc::new(Copyrighter::new(model.clone())))
        .add_node(Arc::new(checker))
        .add_node(Arc::new(QualityFixer::new(model)))
        .set_entry(LEVEL_DEFINE)
        .add_edge(LEVEL_DEFINE, Target::node(ARTICLES_FETCHER))
        .add_edge(ARTICLES_FETCHER, Target::node(PLANNER))
        .add_edge(PLANNER, Target::node(COPYRIGHTER))
        .add_edge(COPYRIGHTER, Target::node(QUALITY_CHECKER))
        .add_conditional_edge(
            QUALITY_CHECKER,
            Arc::new(QualityRouter::new(budget)),
            [
                (QualityDecision::REVISE, Target::node(QUALITY_FIXER)),
                (QualityDecision::FINISH, Target::End),
            ],
        )
        .add_edge(QUALITY_FIXER, Target::node(QUALITY_CHECKER))
        .guard(QUALITY_FIXER, budget)
        .compile()?;

    Ok(graph)
}

/// Pipeline graph plus engine over the given checkpointer
pub fn build_engine(
    collaborators: &Collaborators,
    settings: &PipelineSettings,
    checkpointer: Arc<dyn Checkpointer>,
) -> Result<Engine, DigestError> {
    settings.validate()?;
    let graph = build_pipeline(collaborators, settings)?;
    Ok(Engine::new(graph, checkpointer).with_max_steps(settings.effective_max_steps()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::DryRunPublisher;
    use crate::tools::{Article, PostReceipt};
    use crate::workflow::nodes::testing::{client, ScriptedModel};
    use crate::workflow::state::WorkflowState;
    use async_trait::async_trait;

    struct NoFeed;

    #[async_trait]
    impl ArticleFeed for NoFeed {
        async fn fetch(&self, _n: usize) -> Result<Vec<Article>, DigestError> {
            Ok(Vec::new())
        }
    }

    struct NoPublish;

    #[async_trait]
    impl Publisher for NoPublish {
        async fn publish(&self, _text: &str) -> Result<PostReceipt, DigestError> {
            Err(DigestError::transport("vk", "offline"))
        }
    }

    fn collaborators() -> Collaborators {
        Collaborators::new(
            client(ScriptedModel::new(Vec::<String>::new())),
            Arc::new(NoFeed),
            Arc::new(DryRunPublisher::new()),
        )
    }

    #[test]
    fn test_topology() {
        let graph = build_pipeline(&collaborators(), &PipelineSettings::default()).unwrap();
        let mut state = WorkflowState::new("p");

        assert_eq!(graph.entry(), LEVEL_DEFINE);
        assert_eq!(graph.next(LEVEL_DEFINE, &state).unwrap(), Target::node(ARTICLES_FETCHER));
        assert_eq!(graph.next(ARTICLES_FETCHER, &state).unwrap(), Target::node(PLANNER));
        assert_eq!(graph.next(PLANNER, &state).unwrap(), Target::node(COPYRIGHTER));
        assert_eq!(graph.next(COPYRIGHTER, &state).unwrap(), Target::node(QUALITY_CHECKER));
        assert_eq!(graph.next(QUALITY_FIXER, &state).unwrap(), Target::node(QUALITY_CHECKER));
        assert_eq!(graph.next(QUALITY_CHECKER, &state).unwrap(), Target::End);

        state.plan_to_fix = "- tighten".to_string();
        assert_eq!(graph.next(QUALITY_CHECKER, &state).unwrap(), Target::node(QUALITY_FIXER));
        state.fix_num = MAX_FIXES;
        assert_eq!(graph.next(QUALITY_CHECKER, &state).unwrap(), Target::End);
        assert!(graph.check_guard(QUALITY_FIXER, &state).is_err());
    }

    #[test]
    fn test_custom_fix_budget() {
        let settings = PipelineSettings {
            max_fixes: 1,
            ..Default::default()
        };
        let mut collab = collaborators();
        collab.publisher = Arc::new(NoPublish);
        let graph = build_pipeline(&collab, &settings).unwrap();

        let mut state = WorkflowState::new("p");
        state.plan_to_fix = "x".to_string();
        state.fix_num = 1;
        assert_eq!(graph.next(QUALITY_CHECKER, &state).unwrap(), Target::End);
    }

    #[test]
    fn test_zero_articles_rejected() {
        let mut collab = collaborators();
        collab.articles_per_run = 0;
        assert!(matches!(
            build_pipeline(&collab, &PipelineSettings::default()).err().unwrap(),
            DigestError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_settings_yaml_defaults() {
        let settings: PipelineSettings = serde_yaml::from_str("max_fixes: 5").unwrap();
        assert_eq!(settings.max_fixes, 5);
        assert_eq!(settings.max_steps, None);
        assert_eq!(settings.effective_max_steps(), DEFAULT_MAX_STEPS);
    }

    #[test]
    fn test_step_limit_follows_fix_budget() {
        let settings = PipelineSettings {
            max_fixes: 25,
            max_steps: None,
        };
        assert_eq!(settings.required_steps(), 55);
        assert_eq!(settings.effective_max_steps(), 55);
        assert!(settings.validate().is_ok());

        let too_tight = PipelineSettings {
            max_fixes: 25,
            max_steps: Some(50),
        };
        assert!(matches!(too_tight.validate(), Err(DigestError::Config(_))));
        assert!(matches!(
            build_engine(
                &collaborators(),
                &too_tight,
                Arc::new(crate::workflow::checkpoint::InMemoryCheckpointer::new())
            )
            .err()
            .unwrap(),
            DigestError::Config(_)
        ));
    }
}
