// SPDX-License-Identifier: MIT

//! Pipeline stages
//!
//! Each stage is a `Node` holding the collaborators it needs. Nodes read a
//! snapshot of the state and return only the fields they change.

mod articles_fetcher;
mod copyrighter;
mod level_define;
mod planner;
pub mod prompts;
mod quality;

pub use articles_fetcher::{render_articles, ArticlesFetcher, DEFAULT_ARTICLES_PER_RUN};
pub use copyrighter::Copyrighter;
pub use level_define::{LevelAnswer, LevelDefine};
pub use planner::{ArticlePlan, PlanSection, Planner};
pub use quality::{QualityChecker, QualityFixer, Review, Verdict};

use crate::error::{DigestError, StateError};
use crate::workflow::state::{AudienceLevel, WorkflowState};

pub const LEVEL_DEFINE: &str = "level_define";
pub const ARTICLES_FETCHER: &str = "articles_fetcher";
pub const PLANNER: &str = "planner";
pub const COPYRIGHTER: &str = "copyrighter";
pub const QUALITY_CHECKER: &str = "quality_checker";
pub const QUALITY_FIXER: &str = "quality_fixer";

/// Audience level a stage depends on; `level_define` must have run
fn require_audience(state: &WorkflowState, node: &str) -> Result<AudienceLevel, DigestError> {
    state.auditory.ok_or_else(|| {
        StateError::Invalid(format!("{} requires an audience level", node)).into()
    })
}
