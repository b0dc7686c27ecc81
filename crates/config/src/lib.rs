//! Environment-loaded configuration for a caption relay session (spec §6.1).
//!
//! `ServiceConfig` is a flat, `serde`-deserializable record of every option
//! named in the external interface contract. It loads from the process
//! environment (prefixed `CAPTIONRELAY_`) via `envy`, with `.env` support via
//! `dotenvy` for local development, mirroring how the `hyprnote` example
//! loads its `Env`. Each downstream crate keeps its own typed `*Config`
//! struct with its own `Default`; this crate only translates the flat
//! environment view into those native types.

use std::path::Path;

use serde::{Deserialize, Deserializer};

use captionrelay_broadcast::{BroadcastConfig, QueueConfig};
use captionrelay_core::{
    DeduplicatorConfig, FinalizationConfig, ForcedCommitConfig, PipelineConfig,
};
use captionrelay_stt::SttPoolConfig;
use captionrelay_translate::TranslationRouterConfig;

fn comma_separated<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

fn default_false_final_patterns() -> Vec<String> {
    vec![
        "you just can't".to_string(),
        "i just can't".to_string(),
        "we just can't".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    // STT pool (spec §4.7, §6)
    pub stt_pool_size: usize,
    pub stt_max_buffered_bytes: usize,
    pub stt_initial_backoff_ms: u64,
    pub stt_max_backoff_ms: u64,
    pub stt_model_id: String,
    pub stt_vad_prefix_padding_ms: u64,
    pub stt_vad_silence_duration_ms: u64,
    pub stt_reinforcement_interval: u32,

    // Finalization (spec §4.4, §6)
    pub finalization_base_wait_ms: u64,
    pub finalization_max_wait_ms: u64,
    pub finalization_sentence_incomplete_floor_ms: u64,
    pub finalization_sentence_incomplete_ceiling_ms: u64,
    pub false_final_short_len: usize,
    pub false_final_base_ms: u64,
    #[serde(deserialize_with = "comma_separated")]
    pub false_final_patterns: Vec<String>,

    // Forced commit (spec §4.5, §6)
    pub forced_commit_capture_window_ms: u64,
    pub forced_commit_post_commit_gap_ms: u64,

    // Deduplication (spec §4.2, §6)
    pub dedup_time_window_ms: u64,
    pub dedup_max_words_to_check: usize,
    pub dedup_min_overlap_words: usize,

    // Translation (spec §4.8, §6)
    pub partial_cache_size: u64,
    pub partial_cache_ttl_ms: u64,
    pub final_cache_size: u64,
    pub final_cache_ttl_ms: u64,
    pub translation_request_timeout_ms: u64,

    // Broadcaster (spec §4.9, §6)
    pub listener_queue_depth: usize,
    pub final_retry_attempts: u32,
    pub final_retry_backoff_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let pool = SttPoolConfig::default();
        let finalization = FinalizationConfig::default();
        let forced_commit = ForcedCommitConfig::default();
        let dedup = DeduplicatorConfig::default();
        let queue = QueueConfig::default();
        let broadcast = BroadcastConfig::default();
        let router = TranslationRouterConfig::default();

        Self {
            stt_pool_size: pool.session_count,
            stt_max_buffered_bytes: pool.max_buffered_bytes,
            stt_initial_backoff_ms: pool.initial_backoff_ms,
            stt_max_backoff_ms: pool.max_backoff_ms,
            stt_model_id: "default".to_string(),
            stt_vad_prefix_padding_ms: 300,
            stt_vad_silence_duration_ms: 750,
            stt_reinforcement_interval: 50,

            finalization_base_wait_ms: finalization.base_wait_ms,
            finalization_max_wait_ms: finalization.max_wait_ms,
            finalization_sentence_incomplete_floor_ms: finalization.sentence_incomplete_floor_ms,
            finalization_sentence_incomplete_ceiling_ms: finalization.sentence_incomplete_ceiling_ms,
            false_final_short_len: finalization.false_final_short_len,
            false_final_base_ms: finalization.false_final_base_ms,
            false_final_patterns: default_false_final_patterns(),

            forced_commit_capture_window_ms: forced_commit.capture_window_ms,
            forced_commit_post_commit_gap_ms: forced_commit.post_commit_gap_ms,

            dedup_time_window_ms: dedup.time_window_ms,
            dedup_max_words_to_check: dedup.max_words_to_check,
            dedup_min_overlap_words: dedup.min_overlap_words,

            partial_cache_size: router.partial_cache_capacity,
            partial_cache_ttl_ms: router.partial_cache_ttl.as_millis() as u64,
            final_cache_size: router.final_cache_capacity,
            final_cache_ttl_ms: router.final_cache_ttl.as_millis() as u64,
            translation_request_timeout_ms: router.request_timeout.as_millis() as u64,

            listener_queue_depth: queue.depth,
            final_retry_attempts: broadcast.final_retry_attempts,
            final_retry_backoff_ms: broadcast.final_retry_backoff_ms,
        }
    }
}

impl ServiceConfig {
    /// Load from `CAPTIONRELAY_*` environment variables, falling back to
    /// `Default` for anything unset. Reads a `.env` file in `dir` first, if
    /// one exists, so local development doesn't need exported shell vars.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::from_path(dir.join(".env"));
        let defaults = Self::default();
        envy::prefixed("CAPTIONRELAY_")
            .from_env::<PartialServiceConfig>()
            .map(|partial| partial.merge(defaults))
            .map_err(ConfigError::Env)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            finalization: FinalizationConfig {
                base_wait_ms: self.finalization_base_wait_ms,
                max_wait_ms: self.finalization_max_wait_ms,
                false_final_short_len: self.false_final_short_len,
                false_final_base_ms: self.false_final_base_ms,
                false_final_patterns: self.false_final_patterns.clone(),
                sentence_incomplete_floor_ms: self.finalization_sentence_incomplete_floor_ms,
                sentence_incomplete_ceiling_ms: self.finalization_sentence_incomplete_ceiling_ms,
            },
            forced_commit: ForcedCommitConfig {
                capture_window_ms: self.forced_commit_capture_window_ms,
                post_commit_gap_ms: self.forced_commit_post_commit_gap_ms,
            },
            dedup: DeduplicatorConfig {
                time_window_ms: self.dedup_time_window_ms,
                max_words_to_check: self.dedup_max_words_to_check,
                min_overlap_words: self.dedup_min_overlap_words,
            },
            ..PipelineConfig::default()
        }
    }

    pub fn stt_pool(&self) -> SttPoolConfig {
        SttPoolConfig {
            session_count: self.stt_pool_size,
            max_buffered_bytes: self.stt_max_buffered_bytes,
            initial_backoff_ms: self.stt_initial_backoff_ms,
            max_backoff_ms: self.stt_max_backoff_ms,
        }
    }

    pub fn translation_router(&self) -> TranslationRouterConfig {
        TranslationRouterConfig {
            partial_cache_capacity: self.partial_cache_size,
            partial_cache_ttl: std::time::Duration::from_millis(self.partial_cache_ttl_ms),
            final_cache_capacity: self.final_cache_size,
            final_cache_ttl: std::time::Duration::from_millis(self.final_cache_ttl_ms),
            request_timeout: std::time::Duration::from_millis(self.translation_request_timeout_ms),
        }
    }

    pub fn broadcast(&self) -> BroadcastConfig {
        BroadcastConfig {
            queue: QueueConfig { depth: self.listener_queue_depth },
            final_retry_attempts: self.final_retry_attempts,
            final_retry_backoff_ms: self.final_retry_backoff_ms,
        }
    }
}

/// Mirrors `ServiceConfig` with every field optional, so `envy` only
/// requires the variables the operator actually set.
#[derive(Debug, Deserialize, Default)]
struct PartialServiceConfig {
    stt_pool_size: Option<usize>,
    stt_max_buffered_bytes: Option<usize>,
    stt_initial_backoff_ms: Option<u64>,
    stt_max_backoff_ms: Option<u64>,
    stt_model_id: Option<String>,
    stt_vad_prefix_padding_ms: Option<u64>,
    stt_vad_silence_duration_ms: Option<u64>,
    stt_reinforcement_interval: Option<u32>,
    finalization_base_wait_ms: Option<u64>,
    finalization_max_wait_ms: Option<u64>,
    finalization_sentence_incomplete_floor_ms: Option<u64>,
    finalization_sentence_incomplete_ceiling_ms: Option<u64>,
    false_final_short_len: Option<usize>,
    false_final_base_ms: Option<u64>,
    #[serde(default, deserialize_with = "opt_comma_separated")]
    false_final_patterns: Option<Vec<String>>,
    forced_commit_capture_window_ms: Option<u64>,
    forced_commit_post_commit_gap_ms: Option<u64>,
    dedup_time_window_ms: Option<u64>,
    dedup_max_words_to_check: Option<usize>,
    dedup_min_overlap_words: Option<usize>,
    partial_cache_size: Option<u64>,
    partial_cache_ttl_ms: Option<u64>,
    final_cache_size: Option<u64>,
    final_cache_ttl_ms: Option<u64>,
    translation_request_timeout_ms: Option<u64>,
    listener_queue_depth: Option<usize>,
    final_retry_attempts: Option<u32>,
    final_retry_backoff_ms: Option<u64>,
}

fn opt_comma_separated<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }))
}

impl PartialServiceConfig {
    fn merge(self, defaults: ServiceConfig) -> ServiceConfig {
        ServiceConfig {
            stt_pool_size: self.stt_pool_size.unwrap_or(defaults.stt_pool_size),
            stt_max_buffered_bytes: self.stt_max_buffered_bytes.unwrap_or(defaults.stt_max_buffered_bytes),
            stt_initial_backoff_ms: self.stt_initial_backoff_ms.unwrap_or(defaults.stt_initial_backoff_ms),
            stt_max_backoff_ms: self.stt_max_backoff_ms.unwrap_or(defaults.stt_max_backoff_ms),
            stt_model_id: self.stt_model_id.unwrap_or(defaults.stt_model_id),
            stt_vad_prefix_padding_ms: self.stt_vad_prefix_padding_ms.unwrap_or(defaults.stt_vad_prefix_padding_ms),
            stt_vad_silence_duration_ms: self
                .stt_vad_silence_duration_ms
                .unwrap_or(defaults.stt_vad_silence_duration_ms),
            stt_reinforcement_interval: self
                .stt_reinforcement_interval
                .unwrap_or(defaults.stt_reinforcement_interval),
            finalization_base_wait_ms: self.finalization_base_wait_ms.unwrap_or(defaults.finalization_base_wait_ms),
            finalization_max_wait_ms: self.finalization_max_wait_ms.unwrap_or(defaults.finalization_max_wait_ms),
            finalization_sentence_incomplete_floor_ms: self
                .finalization_sentence_incomplete_floor_ms
                .unwrap_or(defaults.finalization_sentence_incomplete_floor_ms),
            finalization_sentence_incomplete_ceiling_ms: self
                .finalization_sentence_incomplete_ceiling_ms
                .unwrap_or(defaults.finalization_sentence_incomplete_ceiling_ms),
            false_final_short_len: self.false_final_short_len.unwrap_or(defaults.false_final_short_len),
            false_final_base_ms: self.false_final_base_ms.unwrap_or(defaults.false_final_base_ms),
            false_final_patterns: self.false_final_patterns.unwrap_or(defaults.false_final_patterns),
            forced_commit_capture_window_ms: self
                .forced_commit_capture_window_ms
                .unwrap_or(defaults.forced_commit_capture_window_ms),
            forced_commit_post_commit_gap_ms: self
                .forced_commit_post_commit_gap_ms
                .unwrap_or(defaults.forced_commit_post_commit_gap_ms),
            dedup_time_window_ms: self.dedup_time_window_ms.unwrap_or(defaults.dedup_time_window_ms),
            dedup_max_words_to_check: self.dedup_max_words_to_check.unwrap_or(defaults.dedup_max_words_to_check),
            dedup_min_overlap_words: self.dedup_min_overlap_words.unwrap_or(defaults.dedup_min_overlap_words),
            partial_cache_size: self.partial_cache_size.unwrap_or(defaults.partial_cache_size),
            partial_cache_ttl_ms: self.partial_cache_ttl_ms.unwrap_or(defaults.partial_cache_ttl_ms),
            final_cache_size: self.final_cache_size.unwrap_or(defaults.final_cache_size),
            final_cache_ttl_ms: self.final_cache_ttl_ms.unwrap_or(defaults.final_cache_ttl_ms),
            translation_request_timeout_ms: self
                .translation_request_timeout_ms
                .unwrap_or(defaults.translation_request_timeout_ms),
            listener_queue_depth: self.listener_queue_depth.unwrap_or(defaults.listener_queue_depth),
            final_retry_attempts: self.final_retry_attempts.unwrap_or(defaults.final_retry_attempts),
            final_retry_backoff_ms: self.final_retry_backoff_ms.unwrap_or(defaults.final_retry_backoff_ms),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration from the environment: {0}")]
    Env(#[from] envy::Error),
}
