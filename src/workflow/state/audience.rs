// SPDX-License-Identifier: MIT

//! Audience levels

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target-reader sophistication, lowest first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum AudienceLevel {
    /// No technical background at all
    Novice,
    /// Curious reader who knows the basic vocabulary
    Beginner,
    /// Uses the technology, not an engineer in the field
    Intermediate,
    /// Working engineer
    Advanced,
    /// Researcher or specialist
    Expert,
}

impl AudienceLevel {
    pub const ALL: [AudienceLevel; 5] = [
        AudienceLevel::Novice,
        AudienceLevel::Beginner,
        AudienceLevel::Intermediate,
        AudienceLevel::Advanced,
        AudienceLevel::Expert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AudienceLevel::Novice => "novice",
            AudienceLevel::Beginner => "beginner",
            AudienceLevel::Intermediate => "intermediate",
            AudienceLevel::Advanced => "advanced",
            AudienceLevel::Expert => "expert",
        }
    }

    /// Writing guidance handed to generation prompts
    pub fn description(&self) -> &'static str {
        match self {
            AudienceLevel::Novice => {
                "readers with no technical background; avoid jargon and explain every term"
            }
            AudienceLevel::Beginner => {
                "readers who know the basic vocabulary but not how things work inside"
            }
            AudienceLevel::Intermediate => {
                "practitioners who use these tools daily but do not build them"
            }
            AudienceLevel::Advanced => {
                "engineers comfortable with implementation details and trade-offs"
            }
            AudienceLevel::Expert => {
                "researchers and specialists; be precise, dense and cite specifics"
            }
        }
    }
}

impl fmt::Display for AudienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(AudienceLevel::Novice < AudienceLevel::Expert);
        assert_eq!(AudienceLevel::ALL.iter().min(), Some(&AudienceLevel::Novice));
    }

    #[test]
    fn test_serde_names_match_as_str() {
        for level in AudienceLevel::ALL {
            let json = serde_json::to_value(level).unwrap();
            assert_eq!(json, level.as_str());
        }
    }
}
