//! Smart eviction planning
//!
//! Planning is a pure function of the index so it can run under the index
//! lock and be tested without I/O. The manager applies the resulting steps and
//! deletes the files afterwards.
//!
//! Candidate order:
//! 1. Priority tier ascending. `High` entries are only candidates in
//!    [`EvictionMode::Forced`], and then only after every other entry.
//! 2. On high-tier devices, lower best-held resolution first.
//! 3. Composite score ascending (see [`ScoringWeights`]), normalised over the
//!    candidate set.
//!
//! Before any entry is removed, popular entries lose the variants below their
//! best held quality.

use crate::cache::config::ScoringWeights;
use crate::cache::entry::{CacheEntry, CacheIndex, Priority};
use bridge_traits::{device::DeviceTier, quality::Quality};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

/// Whether `High` priority entries may be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionMode {
    Normal,
    Forced,
}

/// Inputs to a planning pass besides the index itself.
#[derive(Debug, Clone, Copy)]
pub struct EvictionContext<'a> {
    pub target_bytes: u64,
    pub mode: EvictionMode,
    pub device_tier: DeviceTier,
    pub weights: ScoringWeights,
    pub popular_access_threshold: u32,
    pub now: i64,
    /// Key that is never a candidate, e.g. the download that triggered
    /// the sweep
    pub protect: Option<&'a str>,
}

/// One mutation of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionStep {
    PruneVariant { key: String, quality: Quality },
    RemoveEntry { key: String },
}

/// Outcome of an eviction sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    pub entries_evicted: usize,
    pub variants_pruned: usize,
    pub bytes_freed: u64,
    /// Another sweep was already running, so this one did nothing
    pub skipped: bool,
}

impl EvictionReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries_evicted == 0 && self.variants_pruned == 0
    }

    pub fn merge(&mut self, other: &EvictionReport) {
        self.entries_evicted += other.entries_evicted;
        self.variants_pruned += other.variants_pruned;
        self.bytes_freed += other.bytes_freed;
    }
}

struct Candidate<'a> {
    key: &'a str,
    entry: &'a CacheEntry,
    score: f64,
}

/// Eviction candidates in the order they should go.
pub fn rank_candidates<'a>(index: &'a CacheIndex, ctx: &EvictionContext<'_>) -> Vec<&'a str> {
    let eligible: Vec<(&String, &CacheEntry)> = index
        .iter()
        .filter(|(key, _)| ctx.protect != Some(key.as_str()))
        .filter(|(_, entry)| ctx.mode == EvictionMode::Forced || entry.priority != Priority::High)
        .collect();

    let max_count = eligible
        .iter()
        .map(|(_, e)| e.access_count)
        .max()
        .unwrap_or(1)
        .max(1) as f64;
    let max_age = eligible
        .iter()
        .map(|(_, e)| (ctx.now - e.last_access_time).max(0))
        .max()
        .unwrap_or(0) as f64;

    let mut candidates: Vec<Candidate<'a>> = eligible
        .into_iter()
        .map(|(key, entry)| {
            let frequency = entry.access_count as f64 / max_count;
            let recency = if max_age > 0.0 {
                1.0 - (ctx.now - entry.last_access_time).max(0) as f64 / max_age
            } else {
                1.0
            };
            Candidate {
                key: key.as_str(),
                entry,
                score: ctx.weights.frequency * frequency + ctx.weights.recency * recency,
            }
        })
        .collect();

    candidates.sort_by(|a, b| compare(a, b, ctx.device_tier));
    candidates.into_iter().map(|c| c.key).collect()
}

fn compare(a: &Candidate<'_>, b: &Candidate<'_>, device_tier: DeviceTier) -> Ordering {
    a.entry
        .priority
        .cmp(&b.entry.priority)
        .then_with(|| {
            if device_tier == DeviceTier::High {
                a.entry.best_quality().cmp(&b.entry.best_quality())
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| a.score.total_cmp(&b.score))
        .then_with(|| a.entry.last_access_time.cmp(&b.entry.last_access_time))
        .then_with(|| a.key.cmp(b.key))
}

/// Steps that bring the index to `ctx.target_bytes` or as close as the
/// eligible candidates allow.
pub fn plan(index: &CacheIndex, ctx: &EvictionContext<'_>) -> Vec<EvictionStep> {
    let mut size = index.total_size();
    if size <= ctx.target_bytes {
        return Vec::new();
    }

    let ranked = rank_candidates(index, ctx);
    let mut steps = Vec::new();
    let mut pruned_bytes: Vec<u64> = vec![0; ranked.len()];

    'prune: for (i, key) in ranked.iter().enumerate() {
        let Some(entry) = index.get(key) else { continue };
        if !entry.is_popular(ctx.popular_access_threshold) {
            continue;
        }
        for quality in entry.redundant_variants() {
            if size <= ctx.target_bytes {
                break 'prune;
            }
            let variant_size = entry.variant_uris.get(&quality).map_or(0, |v| v.size_bytes);
            steps.push(EvictionStep::PruneVariant {
                key: key.to_string(),
                quality,
            });
            size = size.saturating_sub(variant_size);
            pruned_bytes[i] += variant_size;
        }
    }

    for (i, key) in ranked.iter().enumerate() {
        if size <= ctx.target_bytes {
            break;
        }
        let Some(entry) = index.get(key) else { continue };
        steps.push(EvictionStep::RemoveEntry {
            key: key.to_string(),
        });
        size = size.saturating_sub(entry.size_bytes - pruned_bytes[i]);
    }

    steps
}

/// Variants whose quality differs from `preferred`, for severe memory
/// pressure.
pub fn plan_variant_strip(index: &CacheIndex, preferred: Quality) -> Vec<EvictionStep> {
    let mut targets: Vec<(String, Quality)> = index
        .iter()
        .flat_map(|(key, entry)| {
            entry
                .variant_uris
                .keys()
                .filter(|q| **q != preferred)
                .map(move |quality| (key.clone(), *quality))
        })
        .collect();
    targets.sort();

    targets
        .into_iter()
        .map(|(key, quality)| EvictionStep::PruneVariant { key, quality })
        .collect()
}

/// Index mutations performed by [`apply`]; the files still need deleting.
#[derive(Debug, Default)]
pub struct AppliedEviction {
    pub report: EvictionReport,
    pub removed_keys: Vec<String>,
    pub files: Vec<PathBuf>,
}

/// Apply `steps` to the index. Steps whose target is already gone are
/// skipped.
pub fn apply(index: &mut CacheIndex, steps: Vec<EvictionStep>) -> AppliedEviction {
    let mut applied = AppliedEviction::default();

    for step in steps {
        match step {
            EvictionStep::PruneVariant { key, quality } => {
                if let Some(variant) = index.detach_variant(&key, quality) {
                    applied.report.variants_pruned += 1;
                    applied.report.bytes_freed += variant.size_bytes;
                    applied.files.push(variant.path);
                }
            }
            EvictionStep::RemoveEntry { key } => {
                if let Some(entry) = index.remove(&key) {
                    applied.report.entries_evicted += 1;
                    applied.report.bytes_freed += entry.size_bytes;
                    applied.files.extend(entry.all_paths());
                    applied.removed_keys.push(key);
                }
            }
        }
    }

    applied
}

/// Low priority entries untouched for longer than `stale_after_ms`.
pub fn stale_low_priority(index: &CacheIndex, now: i64, stale_after_ms: i64) -> Vec<String> {
    index
        .iter()
        .filter(|(_, e)| e.priority == Priority::Low && now - e.last_access_time > stale_after_ms)
        .map(|(key, _)| key.clone())
        .collect()
}
