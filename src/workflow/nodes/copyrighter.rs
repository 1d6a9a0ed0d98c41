// SPDX-License-Identifier: MIT

use super::{prompts, require_audience, COPYRIGHTER};
use crate::error::DigestError;
use crate::model::ModelClient;
use crate::workflow::graph::Node;
use crate::workflow::state::{StateUpdate, WorkflowState};
use async_trait::async_trait;

/// Writes the first draft from the plan
pub struct Copyrighter {
    model: ModelClient,
}

impl Copyrighter {
    pub fn new(model: ModelClient) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Node for Copyrighter {
    fn name(&self) -> &str {
        COPYRIGHTER
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, DigestError> {
        let audience = require_audience(state, COPYRIGHTER)?;
        let messages =
            prompts::copyrighter(&state.plan_of_article, &state.original_articles, audience);
        let draft = self.model.text(&messages).await?;
        if draft.trim().is_empty() {
            return Err(DigestError::parse("model returned an empty draft"));
        }
        log::info!("Draft written ({} chars)", draft.len());

        Ok(StateUpdate {
            result: Some(draft.trim().to_string()),
            ..Default::default()
        })
    }
}
