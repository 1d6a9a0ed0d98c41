// SPDX-License-Identifier: MIT

//! Runtime state record for workflow execution

use super::{AudienceLevel, StateUpdate};
use crate::error::StateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The record every node reads and updates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowState {
    /// The user's request
    pub original_prompt: String,
    pub auditory: Option<AudienceLevel>,
    pub plan_of_article: String,
    /// Concatenated source material
    pub original_articles: String,
    /// Current article draft
    pub result: String,
    /// Completed revision rounds
    pub fix_num: u32,
    /// Outstanding revision request; empty when the last review approved
    pub plan_to_fix: String,
    pub published: bool,
    #[serde(default)]
    pub post_id: Option<String>,
    /// A publish call was started and its outcome is unknown
    #[serde(default)]
    pub publish_pending: bool,
}

impl WorkflowState {
    /// Initial state for a fresh run
    pub fn new(original_prompt: impl Into<String>) -> Self {
        Self {
            original_prompt: original_prompt.into(),
            ..Default::default()
        }
    }

    /// Overwrite the fields present in `update`; leave the rest untouched
    pub fn merge(&mut self, update: StateUpdate) {
        let StateUpdate {
            original_prompt,
            auditory,
            plan_of_article,
            original_articles,
            result,
            fix_num,
            plan_to_fix,
            published,
            post_id,
            publish_pending,
        } = update;

        if let Some(v) = original_prompt {
            self.original_prompt = v;
        }
        if let Some(v) = auditory {
            self.auditory = Some(v);
        }
        if let Some(v) = plan_of_article {
            self.plan_of_article = v;
        }
        if let Some(v) = original_articles {
            self.original_articles = v;
        }
        if let Some(v) = result {
            self.result = v;
        }
        if let Some(v) = fix_num {
            self.fix_num = v;
        }
        if let Some(v) = plan_to_fix {
            self.plan_to_fix = v;
        }
        if let Some(v) = published {
            self.published = v;
        }
        if let Some(v) = post_id {
            self.post_id = Some(v);
        }
        if let Some(v) = publish_pending {
            self.publish_pending = v;
        }
    }

    /// Merge an update given as JSON; unknown fields are rejected and leave
    /// the state untouched
    pub fn merge_json(&mut self, value: Value) -> Result<(), StateError> {
        let update = StateUpdate::from_json(value)?;
        self.merge(update);
        Ok(())
    }

    /// Whether a revision request is outstanding
    pub fn needs_revision(&self) -> bool {
        !self.plan_to_fix.is_empty()
    }
}
