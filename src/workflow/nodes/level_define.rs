// SPDX-License-Identifier: MIT

use super::{prompts, LEVEL_DEFINE};
use crate::error::DigestError;
use crate::model::ModelClient;
use crate::workflow::graph::Node;
use crate::workflow::state::{AudienceLevel, StateUpdate, WorkflowState};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Structured answer of the audience classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LevelAnswer {
    pub level: AudienceLevel,
}

/// Classifies the request into an audience level
pub struct LevelDefine {
    model: ModelClient,
}

impl LevelDefine {
    pub fn new(model: ModelClient) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node for LevelDefine {
    fn name(&self) -> &str {
        LEVEL_DEFINE
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, DigestError> {
        let messages = prompts::level_define(&state.original_prompt);
        let answer: LevelAnswer = self.model.structured("audience_level", &messages).await?;
        log::info!("Audience level: {}", answer.level);

        Ok(StateUpdate {
            auditory: Some(answer.level),
            ..Default::default()
        })
    }
}
