// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Rule templates, the static catalog documents and the eligibility
//! records derived from them.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Evaluation function a rule is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum RuleTemplate {
    NFollowers,
    NPosts,
    NDaysConsecutivePost,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleArgs {
    pub started_at: String,
    pub num: i64,
    /// `["all"]` or a list of app ids.
    pub app_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementTemplate {
    #[serde(rename = "_id")]
    pub id: String,
    pub contract_address: String,
    pub name: String,
    pub category: String,
    pub provider: String,
    pub description: String,
    pub picture: String,
    pub total_amount: i64,
    pub args: RuleArgs,
    pub tmpl: RuleTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTemplate {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub category: String,
    pub provider: String,
    pub description: String,
    pub url: String,
    pub args: RuleArgs,
    pub tmpl: RuleTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub picture: String,
    pub achievements: Vec<String>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Benefit {
    #[serde(rename = "_id")]
    pub id: String,
    pub reward_type: String,
    pub category: String,
    pub provider: String,
    pub name: String,
    pub benefit_name: String,
    pub description: String,
    pub picture: String,
    pub provider_picture: String,
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AchievementStatus {
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub achv_id: String,
    pub profile_id: String,
    pub category: String,
    pub provider: String,
    pub name: String,
    pub description: String,
    pub picture: String,
    pub token_id: Option<String>,
    pub url: Option<String>,
    pub status: AchievementStatus,
}

impl AchievementRecord {
    pub fn for_profile(template: &AchievementTemplate, profile_id: &str) -> Self {
        Self {
            id: record_id(profile_id, &template.id),
            achv_id: template.id.clone(),
            profile_id: profile_id.to_string(),
            category: template.category.clone(),
            provider: template.provider.clone(),
            name: template.name.clone(),
            description: template.description.clone(),
            picture: template.picture.clone(),
            token_id: None,
            url: None,
            status: AchievementStatus::Ready,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub task_id: String,
    pub profile_id: String,
    pub category: String,
    pub provider: String,
    pub name: String,
    pub description: String,
    pub url: String,
}

impl TaskRecord {
    pub fn for_profile(template: &TaskTemplate, profile_id: &str) -> Self {
        Self {
            id: record_id(profile_id, &template.id),
            task_id: template.id.clone(),
            profile_id: profile_id.to_string(),
            category: template.category.clone(),
            provider: template.provider.clone(),
            name: template.name.clone(),
            description: template.description.clone(),
            url: template.url.clone(),
        }
    }
}

/// Derived records are keyed `{profileId}-{ruleId}`.
pub fn record_id(profile_id: &str, rule_id: &str) -> String {
    format!("{}-{}", profile_id, rule_id)
}
