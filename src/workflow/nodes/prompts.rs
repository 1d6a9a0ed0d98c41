// SPDX-License-Identifier: MIT

//! Message builders for the pipeline stages

use crate::model::Message;
use crate::workflow::state::AudienceLevel;

const AUTHOR_ROLE: &str = "You are a technical author who writes short, accurate \
articles for a social-network tech blog. Always answer in the language of the \
user's request.";

/// Used when a review asks for changes without naming any
pub const GENERIC_FIX: &str =
    "Improve clarity and structure, and make sure every claim is backed by the sources.";

pub fn level_define(prompt: &str) -> Vec<Message> {
    let levels = AudienceLevel::ALL
        .iter()
        .map(|level| format!("- {}: {}", level, level.description()))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        Message::system(format!(
            "Classify the reader the request is written for into exactly one audience level.\n\
             Levels:\n{}\n\
             Answer with JSON: {{\"level\": \"<level>\"}}",
            levels
        )),
        Message::user(prompt),
    ]
}

pub fn planner(prompt: &str, articles: &str, audience: AudienceLevel) -> Vec<Message> {
    vec![
        Message::system(format!(
            "{}\nPlan an article for a {} reader ({}). Base it only on the source \
             articles. Answer with JSON containing a title and a list of sections, \
             each with a heading and key points.",
            AUTHOR_ROLE,
            audience,
            audience.description()
        )),
        Message::user(format!(
            "Request:\n{}\n\nSource articles:\n{}",
            prompt, articles
        )),
    ]
}

pub fn copyrighter(
    plan: &str,
    articles: &str,
    audience: AudienceLevel,
) -> Vec<Message> {
    vec![
        Message::system(format!(
            "{}\nWrite the post following the plan exactly. The reader is {} ({}). \
             Return only the post text.",
            AUTHOR_ROLE,
            audience,
            audience.description()
        )),
        Message::user(format!("Plan:\n{}\n\nSource articles:\n{}", plan, articles)),
    ]
}

pub fn quality_checker(draft: &str, plan: &str, audience: Option<AudienceLevel>) -> Vec<Message> {
    let reader = audience
        .map(|level| level.to_string())
        .unwrap_or_else(|| "a general".to_string());
    vec![
        Message::system(format!(
            "You review blog posts before publication for {} readers. Check that the \
             post follows the plan, is factually consistent, and reads well. Answer \
             with JSON: {{\"verdict\": \"approved\" | \"needs_revision\", \
             \"issues\": [\"...\"]}}",
            reader
        )),
        Message::user(format!("Plan:\n{}\n\nPost:\n{}", plan, draft)),
    ]
}

pub fn quality_fixer(draft: &str, fixes: &str, audience: Option<AudienceLevel>) -> Vec<Message> {
    let reader = audience
        .map(|level| format!("The reader is {} ({}).", level, level.description()))
        .unwrap_or_default();
    vec![
        Message::system(format!(
            "{}\nRevise the post to address every review remark. {} Return only the \
             revised post text.",
            AUTHOR_ROLE, reader
        )),
        Message::user(format!("Post:\n{}\n\nReview remarks:\n{}", draft, fixes)),
    ]
}
