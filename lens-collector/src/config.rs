// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Collector configuration

use crate::chain_syncer::BlockWindowConfig;
use crate::content::ContentResolverConfig;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use strum_macros::{AsRefStr, Display};

/// Complete collector configuration. Every field has a default, so an
/// empty file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_lens_hub_address")]
    pub lens_hub_address: String,
    #[serde(default = "default_lens_periphery_address")]
    pub lens_periphery_address: String,
    #[serde(default = "default_achievement_contract")]
    pub achievement_contract: String,
    /// Start block recorded on first start; the chain height when unset.
    #[serde(default)]
    pub start_block: Option<u64>,
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub lens_api_url: Option<String>,
    #[serde(default)]
    pub lens_access_token: Option<String>,

    #[serde(default = "default_block_window")]
    pub block_window: u64,
    #[serde(default = "default_windows_per_tick")]
    pub windows_per_tick: usize,
    #[serde(default = "default_height_retry_limit")]
    pub height_retry_limit: usize,
    #[serde(default = "default_fetch_max_elapsed_secs")]
    pub fetch_max_elapsed_secs: u64,

    /// Concurrency bound of dispatch phases and publication backfills.
    #[serde(default = "default_max_task")]
    pub max_task: usize,
    /// Page size of every Lens API walk.
    #[serde(default = "default_lens_data_limit")]
    pub lens_data_limit: i64,
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
    #[serde(default = "default_page_jitter_min_secs")]
    pub page_jitter_min_secs: u64,
    #[serde(default = "default_page_jitter_max_secs")]
    pub page_jitter_max_secs: u64,
    #[serde(default = "default_publication_max_tries")]
    pub publication_max_tries: usize,

    #[serde(default = "default_content_timeout_secs")]
    pub content_timeout_secs: u64,
    #[serde(default = "default_content_retries")]
    pub content_retries: usize,
    #[serde(default = "default_content_retry_delay_secs")]
    pub content_retry_delay_secs: u64,

    /// Earliest day counted by the consecutive-post template.
    #[serde(default = "default_activity_since")]
    pub activity_since: String,

    #[serde(default)]
    pub tasks: TasksConfig,
}

fn default_lens_hub_address() -> String {
    "0xDb46d1Dc155634FbC732f92E853b10B288AD5a1d".to_string()
}

fn default_lens_periphery_address() -> String {
    "0xeff187b4190E551FC25a7fA4dFC6cf7fDeF7194f".to_string()
}

fn default_achievement_contract() -> String {
    "0x9B82DAF85E9dcC4409ed13970035a181fB411542".to_string()
}

fn default_block_window() -> u64 {
    2000
}

fn default_windows_per_tick() -> usize {
    5
}

fn default_height_retry_limit() -> usize {
    10
}

fn default_fetch_max_elapsed_secs() -> u64 {
    30
}

fn default_max_task() -> usize {
    10
}

fn default_lens_data_limit() -> i64 {
    50
}

fn default_rate_limit_backoff_secs() -> u64 {
    300
}

fn default_page_jitter_min_secs() -> u64 {
    1
}

fn default_page_jitter_max_secs() -> u64 {
    5
}

fn default_publication_max_tries() -> usize {
    3
}

fn default_content_timeout_secs() -> u64 {
    10
}

fn default_content_retries() -> usize {
    3
}

fn default_content_retry_delay_secs() -> u64 {
    1
}

fn default_activity_since() -> String {
    "2022-12-01".to_string()
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            lens_hub_address: default_lens_hub_address(),
            lens_periphery_address: default_lens_periphery_address(),
            achievement_contract: default_achievement_contract(),
            start_block: None,
            rpc_url: None,
            lens_api_url: None,
            lens_access_token: None,
            block_window: default_block_window(),
            windows_per_tick: default_windows_per_tick(),
            height_retry_limit: default_height_retry_limit(),
            fetch_max_elapsed_secs: default_fetch_max_elapsed_secs(),
            max_task: default_max_task(),
            lens_data_limit: default_lens_data_limit(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
            page_jitter_min_secs: default_page_jitter_min_secs(),
            page_jitter_max_secs: default_page_jitter_max_secs(),
            publication_max_tries: default_publication_max_tries(),
            content_timeout_secs: default_content_timeout_secs(),
            content_retries: default_content_retries(),
            content_retry_delay_secs: default_content_retry_delay_secs(),
            activity_since: default_activity_since(),
            tasks: TasksConfig::default(),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from YAML file with environment variable substitution
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .context(format!("Failed to read collector config file: {:?}", path))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let contents = substitute_env_vars(contents)?;
        let config: CollectorConfig =
            serde_yaml::from_str(&contents).context("Failed to parse collector config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_window == 0 {
            return Err(anyhow!("block_window must be positive"));
        }
        if self.lens_data_limit <= 0 {
            return Err(anyhow!("lens_data_limit must be positive"));
        }
        if self.page_jitter_min_secs > self.page_jitter_max_secs {
            return Err(anyhow!(
                "page_jitter_min_secs {} exceeds page_jitter_max_secs {}",
                self.page_jitter_min_secs,
                self.page_jitter_max_secs
            ));
        }
        self.contract_addresses()?;
        self.activity_since_date()?;
        Ok(())
    }

    /// Lens Hub and Periphery, the emitters the monitor fetches logs from.
    pub fn contract_addresses(&self) -> Result<Vec<Address>> {
        [&self.lens_hub_address, &self.lens_periphery_address]
            .into_iter()
            .map(|address| {
                Address::from_str(address)
                    .context(format!("Invalid contract address {}", address))
            })
            .collect()
    }

    pub fn activity_since_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.activity_since, "%Y-%m-%d")
            .context(format!("Invalid activity_since {}", self.activity_since))
    }

    pub fn block_window_config(&self) -> Result<BlockWindowConfig> {
        Ok(BlockWindowConfig {
            block_window: self.block_window,
            windows_per_tick: self.windows_per_tick,
            height_retry_limit: self.height_retry_limit,
            fetch_max_elapsed: Duration::from_secs(self.fetch_max_elapsed_secs),
            contracts: self.contract_addresses()?,
        })
    }

    pub fn content_resolver_config(&self) -> ContentResolverConfig {
        ContentResolverConfig {
            timeout: Duration::from_secs(self.content_timeout_secs),
            retries: self.content_retries,
            retry_delay: Duration::from_secs(self.content_retry_delay_secs),
        }
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }

    pub fn page_jitter(&self) -> RangeInclusive<Duration> {
        let min = Duration::from_secs(self.page_jitter_min_secs);
        let max = Duration::from_secs(self.page_jitter_max_secs);
        min..=max
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> Result<String> {
    use regex::Regex;

    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;
    let mut result = content.to_string();

    for cap in re.captures_iter(content) {
        let full_match = &cap[0];
        let var_name = &cap[1];

        if let Ok(var_value) = std::env::var(var_name) {
            result = result.replace(full_match, &var_value);
        } else {
            // Keep the placeholder if env var is not set
            tracing::warn!(
                "Environment variable {} not found, keeping placeholder",
                var_name
            );
        }
    }

    Ok(result)
}

/// Periodic tasks of the `run` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum TaskName {
    Monitor,
    Profiles,
    Publications,
    Whitelist,
    Achievements,
    Tasks,
    Enrich,
}

impl TaskName {
    pub const ALL: [TaskName; 7] = [
        TaskName::Monitor,
        TaskName::Profiles,
        TaskName::Publications,
        TaskName::Whitelist,
        TaskName::Achievements,
        TaskName::Tasks,
        TaskName::Enrich,
    ];

    pub fn default_interval(&self) -> Duration {
        let secs = match self {
            TaskName::Monitor => 1,
            TaskName::Profiles => 5,
            TaskName::Publications | TaskName::Whitelist | TaskName::Enrich => 3,
            TaskName::Achievements | TaskName::Tasks => 15,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_task_enabled")]
    pub enabled: bool,
    /// Idle time between two runs; the task's own default when unset.
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

fn default_task_enabled() -> bool {
    true
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            enabled: default_task_enabled(),
            interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default)]
    pub monitor: TaskConfig,
    #[serde(default)]
    pub profiles: TaskConfig,
    #[serde(default)]
    pub publications: TaskConfig,
    #[serde(default)]
    pub whitelist: TaskConfig,
    #[serde(default)]
    pub achievements: TaskConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub enrich: TaskConfig,
}

impl TasksConfig {
    pub fn get(&self, name: TaskName) -> &TaskConfig {
        match name {
            TaskName::Monitor => &self.monitor,
            TaskName::Profiles => &self.profiles,
            TaskName::Publications => &self.publications,
            TaskName::Whitelist => &self.whitelist,
            TaskName::Achievements => &self.achievements,
            TaskName::Tasks => &self.tasks,
            TaskName::Enrich => &self.enrich,
        }
    }

    pub fn is_enabled(&self, name: TaskName) -> bool {
        self.get(name).enabled
    }

    pub fn interval(&self, name: TaskName) -> Duration {
        self.get(name)
            .interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| name.default_interval())
    }
}
