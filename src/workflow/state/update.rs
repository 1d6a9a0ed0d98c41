// SPDX-License-Identifier: MIT

//! Partial state updates returned by nodes

use super::AudienceLevel;
use crate::error::StateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields a node wants to overwrite. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auditory: Option<AudienceLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_of_article: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_articles: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_num: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_to_fix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_pending: Option<bool>,
}

impl StateUpdate {
    /// Every field name an update may carry
    pub const FIELDS: [&'static str; 10] = [
        "original_prompt",
        "auditory",
        "plan_of_article",
        "original_articles",
        "result",
        "fix_num",
        "plan_to_fix",
        "published",
        "post_id",
        "publish_pending",
    ];

    /// Decode an update from a JSON object. Unknown keys are an error.
    pub fn from_json(value: Value) -> Result<Self, StateError> {
        let Value::Object(map) = &value else {
            return Err(StateError::Invalid(format!(
                "expected a JSON object, got {}",
                value
            )));
        };
        if let Some(unknown) = map.keys().find(|k| !Self::FIELDS.contains(&k.as_str())) {
            return Err(StateError::UnknownField(unknown.clone()));
        }
        serde_json::from_value(value).map_err(|e| StateError::Invalid(e.to_string()))
    }

    /// Names of the fields present in this update
    pub fn present_fields(&self) -> Vec<&'static str> {
        let present = [
            self.original_prompt.is_some(),
            self.auditory.is_some(),
            self.plan_of_article.is_some(),
            self.original_articles.is_some(),
            self.result.is_some(),
            self.fix_num.is_some(),
            self.plan_to_fix.is_some(),
            self.published.is_some(),
            self.post_id.is_some(),
            self.publish_pending.is_some(),
        ];
        Self::FIELDS
            .iter()
            .zip(present)
            .filter(|(_, p)| *p)
            .map(|(name, _)| *name)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.present_fields().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_known_fields() {
        let update = StateUpdate::from_json(json!({
            "result": "draft",
            "fix_num": 2,
            "auditory": "expert"
        }))
        .unwrap();
        assert_eq!(update.result.as_deref(), Some("draft"));
        assert_eq!(update.fix_num, Some(2));
        assert_eq!(update.auditory, Some(AudienceLevel::Expert));
        assert!(update.plan_to_fix.is_none());
    }

    #[test]
    fn test_from_json_unknown_field_fails() {
        let err = StateUpdate::from_json(json!({"result": "x", "messages": []})).unwrap_err();
        match err {
            StateError::UnknownField(name) => assert_eq!(name, "messages"),
            other => panic!("expected UnknownField, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_wrong_type_fails() {
        let err = StateUpdate::from_json(json!({"fix_num": "three"})).unwrap_err();
        assert!(matches!(err, StateError::Invalid(_)));
        assert!(StateUpdate::from_json(json!(["result"])).is_err());
    }

    #[test]
    fn test_present_fields() {
        let update = StateUpdate {
            result: Some("d".to_string()),
            fix_num: Some(1),
            ..Default::default()
        };
        assert_eq!(update.present_fields(), vec!["result", "fix_num"]);
        assert!(!update.is_empty());
        assert!(StateUpdate::default().is_empty());
    }

    #[test]
    fn test_serialize_skips_absent() {
        let update = StateUpdate {
            published: Some(false),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"published": false}));
    }
}
