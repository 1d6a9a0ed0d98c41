// SPDX-License-Identifier: MIT

use super::{prompts, require_audience, PLANNER};
use crate::error::DigestError;
use crate::model::ModelClient;
use crate::workflow::graph::Node;
use crate::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanSection {
    pub heading: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// Article outline produced by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArticlePlan {
    pub title: String,
    pub sections: Vec<PlanSection>,
}

impl ArticlePlan {
    /// Plain-text outline, one numbered section per block
    pub fn render(&self) -> String {
        let mut out = format!("{}\n", self.title.trim());
        for (i, section) in self.sections.iter().enumerate() {
            out.push_str(&format!("\n{}. {}\n", i + 1, section.heading.trim()));
            for point in &section.key_points {
                out.push_str(&format!("   - {}\n", point.trim()));
            }
        }
        out
    }
}

/// Outlines the article from the sources and audience level
pub struct Planner {
    model: ModelClient,
}

impl Planner {
    pub fn new(model: ModelClient) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node for Planner {
    fn name(&self) -> &str {
        PLANNER
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, DigestError> {
        let audience = require_audience(state, PLANNER)?;
        let messages = prompts::planner(&state.original_prompt, &state.original_articles, audience);
        let plan: ArticlePlan = self.model.structured("article_plan", &messages).await?;

        if plan.title.trim().is_empty() || plan.sections.is_empty() {
            return Err(DigestError::ambiguity(
                "article_plan",
                serde_json::to_string(&plan)?,
            ));
        }
        log::info!("Planned '{}' with {} sections", plan.title, plan.sections.len());

        Ok(StateUpdate {
            plan_of_article: Some(plan.render()),
            ..Default::default()
        })
    }
}
