//! Integration tests for the media cache manager
//!
//! Run against in-memory fakes of the host capabilities and a manual clock.

mod common;

use bridge_traits::device::DeviceTier;
use bridge_traits::network::NetworkQuality;
use bridge_traits::quality::{Quality, QualitySelection, QualitySelector, SelectionContext};
use common::*;
use core_async::time::Duration;
use core_cache::cache::PreloadSettings;
use core_cache::{CacheError, ContentType, MediaCacheManager, MediaSource, Priority};
use mockall::mock;
use std::path::Path;
use std::sync::Arc;

fn cached_path(source: &MediaSource) -> &Path {
    source.local_path().expect("expected a cached source")
}

// ============================================================================
// Reads and writes
// ============================================================================

#[core_async::test]
async fn test_materialize_then_lookup_returns_same_file() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    h.store.serve("https://cdn.example.com/a.mp4", MB);

    let source = h
        .cache
        .materialize("https://cdn.example.com/a.mp4", Priority::Normal)
        .await;
    let path = cached_path(&source).to_path_buf();
    assert!(h.store.has_file(&path));
    assert!(path.starts_with("/cache/medium_quality"));

    let found = h
        .cache
        .lookup("https://cdn.example.com/a.mp4", Priority::Normal)
        .await;
    assert_eq!(found, Some(path));

    let stats = h.cache.stats().await;
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.downloads, 1);
    assert_eq!(stats.total_bytes, MB);
    assert_eq!(h.store.download_count(), 1);
}

#[core_async::test]
async fn test_second_materialize_is_a_hit() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    h.store.serve("https://cdn.example.com/a.mp4", MB);

    let first = h
        .cache
        .materialize("https://cdn.example.com/a.mp4", Priority::Normal)
        .await;
    let second = h
        .cache
        .materialize("https://cdn.example.com/a.mp4", Priority::High)
        .await;

    assert_eq!(first, second);
    assert_eq!(h.store.download_count(), 1);
    assert_eq!(h.cache.stats().await.high_priority_entries, 1);
}

#[core_async::test]
async fn test_content_type_partition() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    h.store.serve("https://cdn.example.com/thumbs/42", 10_000);

    let source = h
        .cache
        .materialize_content(
            "https://cdn.example.com/thumbs/42",
            Priority::Low,
            ContentType::Thumbnail,
        )
        .await;

    let path = cached_path(&source);
    assert!(path.starts_with("/cache/thumbnail"));
    assert_eq!(path.extension().unwrap(), "jpg");
}

#[core_async::test]
async fn test_concurrent_requests_share_one_download() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    h.store.serve("https://cdn.example.com/a.mp4", MB);
    h.store.set_delay(Duration::from_millis(20));

    let id = "https://cdn.example.com/a.mp4";
    let (a, b, c) = futures::join!(
        h.cache.materialize(id, Priority::Normal),
        h.cache.materialize(id, Priority::Normal),
        h.cache.materialize(id, Priority::High),
    );

    assert!(a.is_cached());
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(h.store.downloads_of(id), 1);
    assert_eq!(h.cache.stats().await.total_entries, 1);
}

#[core_async::test]
async fn test_joined_request_reasserts_its_priority() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    let id = "https://cdn.example.com/a.mp4";
    h.store.serve(id, MB);
    h.store.set_delay(Duration::from_millis(50));

    let (first, second) = futures::join!(
        h.cache.materialize(id, Priority::Normal),
        h.cache.materialize(id, Priority::High),
    );

    assert!(first.is_cached());
    assert_eq!(first, second);
    assert_eq!(h.store.downloads_of(id), 1);

    let stats = h.cache.stats().await;
    assert_eq!(stats.high_priority_entries, 1);
    assert_eq!(stats.normal_priority_entries, 0);
    // One lookup per call, joined or not.
    assert_eq!(stats.requests, 2);

    let report = h.cache.evict().await;
    assert_eq!(report.entries_evicted, 0);
    assert!(h.cache.contains(id).await);
}

// ============================================================================
// Failure handling
// ============================================================================

#[core_async::test]
async fn test_fallback_quality_after_failed_target() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    let id = "https://cdn.example.com/v";
    h.selector
        .insert(id, ladder(id, Quality::High, Some(Quality::Medium)));
    h.store.fail(&format!("{}_high.mp4", id));
    h.store.serve(&format!("{}_medium.mp4", id), 2 * MB);

    let source = h.cache.materialize(id, Priority::Normal).await;

    let path = cached_path(&source);
    assert!(path.to_string_lossy().ends_with("_medium.mp4"));
    assert_eq!(h.store.download_count(), 2);
    assert_eq!(h.cache.current_size().await, 2 * MB);
}

#[core_async::test]
async fn test_pass_through_when_nothing_downloads() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    let id = "https://cdn.example.com/missing";
    h.selector
        .insert(id, ladder(id, Quality::High, Some(Quality::Low)));

    let source = h.cache.materialize(id, Priority::High).await;

    assert_eq!(source, MediaSource::Remote(id.to_string()));
    assert!(!h.cache.contains(id).await);
    let stats = h.cache.stats().await;
    assert_eq!(stats.pass_throughs, 1);
    assert_eq!(stats.total_bytes, 0);
}

#[core_async::test]
async fn test_selector_failure_passes_through() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    h.store.serve("https://cdn.example.com/a.mp4", MB);
    h.selector.break_selection();

    let source = h
        .cache
        .materialize("https://cdn.example.com/a.mp4", Priority::Normal)
        .await;

    assert_eq!(
        source,
        MediaSource::Remote("https://cdn.example.com/a.mp4".to_string())
    );
    assert_eq!(h.store.download_count(), 0);
}

#[core_async::test]
async fn test_resource_larger_than_budget_is_not_kept() {
    let h = HarnessBuilder::new(config(10 * MB)).start().await;
    h.store.serve("https://cdn.example.com/huge.mp4", 12 * MB);

    let source = h
        .cache
        .materialize("https://cdn.example.com/huge.mp4", Priority::Normal)
        .await;

    assert!(!source.is_cached());
    assert_eq!(h.cache.current_size().await, 0);
}

#[core_async::test]
async fn test_missing_file_self_heals() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    let id = "https://cdn.example.com/a.mp4";
    h.store.serve(id, MB);

    let source = h.cache.materialize(id, Priority::Normal).await;
    h.store.remove_file(cached_path(&source));

    assert_eq!(h.cache.lookup(id, Priority::Normal).await, None);
    assert!(!h.cache.contains(id).await);
    assert_eq!(h.cache.current_size().await, 0);
    assert_eq!(h.cache.stats().await.self_heals, 1);

    let again = h.cache.materialize(id, Priority::Normal).await;
    assert!(again.is_cached());
    assert_eq!(h.store.downloads_of(id), 2);
}

// ============================================================================
// Eviction
// ============================================================================

#[core_async::test]
async fn test_size_converges_below_eviction_target() {
    let h = HarnessBuilder::new(config(10 * MB)).start().await;

    for name in ["a", "b", "c"] {
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.store.serve(&id, 4 * MB);
        h.cache.materialize(&id, Priority::Normal).await;
        h.clock.advance(Duration::from_secs(1));
    }

    assert!(h.cache.current_size().await <= 7 * MB);
    assert!(h.cache.contains("https://cdn.example.com/c.mp4").await);
    assert!(!h.cache.contains("https://cdn.example.com/a.mp4").await);

    let stats = h.cache.stats().await;
    assert_eq!(stats.evictions, 2);
    assert_eq!(h.store.media_file_count(), 1);
}

#[core_async::test]
async fn test_fresh_download_survives_its_own_sweep() {
    let h = HarnessBuilder::new(config(10 * MB)).start().await;
    for name in ["a", "b"] {
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.store.serve(&id, 4 * MB);
        h.cache.materialize(&id, Priority::Normal).await;
        h.cache.lookup(&id, Priority::Normal).await;
        h.cache.lookup(&id, Priority::Normal).await;
        h.clock.advance(Duration::from_secs(1));
    }

    let id = "https://cdn.example.com/c.mp4";
    h.store.serve(id, 4 * MB);
    let source = h.cache.materialize(id, Priority::Normal).await;

    assert!(source.is_cached());
    assert!(h.store.has_file(cached_path(&source)));
    assert!(h.cache.current_size().await <= 7 * MB);

    let again = h.cache.materialize(id, Priority::Normal).await;
    assert_eq!(again, source);
    assert_eq!(h.store.downloads_of(id), 1);
}

#[core_async::test]
async fn test_lookup_over_threshold_sweeps_in_background() {
    let h = HarnessBuilder::new(config(10 * MB)).start().await;
    for (name, size) in [("a", 4 * MB), ("b", 4 * MB), ("c", 2 * MB)] {
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.store.serve(&id, size);
        h.cache.materialize(&id, Priority::Normal).await;
        h.clock.advance(Duration::from_secs(1));
    }
    assert_eq!(h.cache.current_size().await, 10 * MB);
    assert_eq!(h.cache.stats().await.eviction_sweeps, 0);

    let served = h.cache.lookup("https://cdn.example.com/c.mp4", Priority::Normal).await;
    assert!(served.is_some());

    settle().await;
    let stats = h.cache.stats().await;
    assert_eq!(stats.eviction_sweeps, 1);
    assert!(stats.total_bytes <= 7 * MB);
    assert!(h.cache.contains("https://cdn.example.com/c.mp4").await);
}

#[core_async::test]
async fn test_sweep_not_repeated_while_nothing_can_go() {
    let h = HarnessBuilder::new(config(10 * MB)).start().await;
    for (name, size) in [("a", 4 * MB), ("b", 4 * MB), ("c", 2 * MB)] {
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.store.serve(&id, size);
        h.cache.materialize(&id, Priority::High).await;
    }

    h.cache.lookup("https://cdn.example.com/a.mp4", Priority::High).await;
    settle().await;
    assert_eq!(h.cache.stats().await.eviction_sweeps, 1);

    for name in ["a", "b", "c"] {
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.cache.lookup(&id, Priority::High).await;
    }
    settle().await;
    assert_eq!(h.cache.stats().await.eviction_sweeps, 1);
    assert_eq!(h.cache.current_size().await, 10 * MB);

    // Demoting an entry gives the next sweep something to remove.
    h.cache.lookup("https://cdn.example.com/a.mp4", Priority::Low).await;
    settle().await;
    let stats = h.cache.stats().await;
    assert_eq!(stats.eviction_sweeps, 2);
    assert_eq!(stats.total_bytes, 6 * MB);
    assert!(!h.cache.contains("https://cdn.example.com/a.mp4").await);
}

#[core_async::test]
async fn test_lower_priority_evicted_first() {
    let h = HarnessBuilder::new(config(10 * MB)).start().await;

    let entries = [
        ("high", 2 * MB, Priority::High),
        ("low", 5 * MB, Priority::Low),
        ("normal", 4 * MB, Priority::Normal),
    ];
    for (name, size, priority) in entries {
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.store.serve(&id, size);
        h.cache.materialize(&id, priority).await;
        h.clock.advance(Duration::from_secs(1));
    }

    assert!(h.cache.contains("https://cdn.example.com/high.mp4").await);
    assert!(h.cache.contains("https://cdn.example.com/normal.mp4").await);
    assert!(!h.cache.contains("https://cdn.example.com/low.mp4").await);
    assert_eq!(h.cache.current_size().await, 6 * MB);
}

#[core_async::test]
async fn test_busy_low_entries_never_outrank_high() {
    let h = HarnessBuilder::new(config(10 * MB)).start().await;

    let pinned = "https://cdn.example.com/pinned.mp4";
    h.store.serve(pinned, 4 * MB);
    h.cache.materialize(pinned, Priority::High).await;

    for name in ["low-1", "low-2", "low-3"] {
        h.clock.advance(Duration::from_secs(60));
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.store.serve(&id, 4 * MB);
        h.cache.materialize(&id, Priority::Low).await;
        for _ in 0..5 {
            h.cache.lookup(&id, Priority::Low).await;
        }
    }

    assert!(h.cache.contains(pinned).await);
    assert!(h.cache.current_size().await <= 10 * MB);
    assert_eq!(h.cache.stats().await.high_priority_entries, 1);
}

#[core_async::test]
async fn test_high_priority_survives_budget_eviction() {
    let h = HarnessBuilder::new(config(10 * MB)).start().await;

    for name in ["pinned-1", "pinned-2"] {
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.store.serve(&id, 4 * MB);
        h.cache.materialize(&id, Priority::High).await;
    }

    let report = h.cache.evict().await;
    assert_eq!(report.entries_evicted, 0);
    assert_eq!(h.cache.current_size().await, 8 * MB);
}

#[core_async::test]
async fn test_memory_pressure_reduction() {
    let h = HarnessBuilder::new(config(10 * MB)).start().await;
    for name in ["a", "b", "c"] {
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.store.serve(&id, 3 * MB);
        h.cache.materialize(&id, Priority::Normal).await;
        h.clock.advance(Duration::from_secs(1));
    }

    h.device.set_memory_usage(0.5);
    assert!(h.cache.relieve_memory_pressure().await.is_none());

    h.device.set_memory_usage(0.85);
    let report = h.cache.relieve_memory_pressure().await.unwrap();
    assert_eq!(report.entries_evicted, 2);
    assert!(h.cache.current_size().await <= 5 * MB);
}

#[core_async::test]
async fn test_severe_memory_pressure_reaches_high_priority() {
    let h = HarnessBuilder::new(config(10 * MB)).start().await;
    for name in ["a", "b"] {
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.store.serve(&id, 3 * MB);
        h.cache.materialize(&id, Priority::High).await;
        h.clock.advance(Duration::from_secs(1));
    }

    h.device.set_memory_usage(0.85);
    let report = h.cache.relieve_memory_pressure().await.unwrap();
    assert_eq!(report.entries_evicted, 0);

    h.device.set_memory_usage(0.95);
    let report = h.cache.relieve_memory_pressure().await.unwrap();
    assert_eq!(report.entries_evicted, 1);
    assert!(h.cache.contains("https://cdn.example.com/b.mp4").await);
    assert_eq!(h.cache.current_size().await, 3 * MB);
}

#[core_async::test]
async fn test_severe_memory_pressure_strips_other_variants() {
    let h = HarnessBuilder::new(config(100 * MB))
        .with_jobs()
        .start()
        .await;
    let id = "https://cdn.example.com/v";
    h.selector
        .insert(id, ladder(id, Quality::Medium, Some(Quality::Low)));
    h.store.serve(&format!("{}_high.mp4", id), 4 * MB);
    h.store.serve(&format!("{}_medium.mp4", id), 2 * MB);
    h.store.serve(&format!("{}_low.mp4", id), MB);

    h.cache.materialize(id, Priority::Normal).await;
    let low_path = h
        .jobs
        .queued()
        .into_iter()
        .find(|(q, _)| *q == Quality::Low)
        .map(|(_, path)| path)
        .unwrap();
    h.jobs.run_all().await;
    assert_eq!(h.cache.current_size().await, 7 * MB);

    h.device.set_memory_usage(0.95);
    let report = h.cache.relieve_memory_pressure().await.unwrap();

    assert_eq!(report.entries_evicted, 0);
    assert_eq!(report.variants_pruned, 1);
    assert_eq!(report.bytes_freed, MB);
    assert!(!h.store.has_file(&low_path));
    assert_eq!(h.cache.current_size().await, 6 * MB);

    // The preferred High variant is still served.
    let served = h.cache.lookup(id, Priority::Normal).await.unwrap();
    assert!(served.starts_with("/cache/high_quality"));
}

#[core_async::test]
async fn test_idle_cleanup_removes_stale_low_priority() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    for (name, priority) in [("low", Priority::Low), ("normal", Priority::Normal)] {
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.store.serve(&id, MB);
        h.cache.materialize(&id, priority).await;
    }

    assert_eq!(h.cache.cleanup_idle().await, 0);

    h.clock.advance(Duration::from_secs(3 * 60 * 60));
    assert_eq!(h.cache.cleanup_idle().await, 1);
    assert!(!h.cache.contains("https://cdn.example.com/low.mp4").await);
    assert!(h.cache.contains("https://cdn.example.com/normal.mp4").await);
}

#[core_async::test]
async fn test_remove_and_clear_delete_files() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    for name in ["a", "b", "c"] {
        let id = format!("https://cdn.example.com/{}.mp4", name);
        h.store.serve(&id, MB);
        h.cache.materialize(&id, Priority::Normal).await;
    }

    assert!(h.cache.remove("https://cdn.example.com/a.mp4").await);
    assert!(!h.cache.remove("https://cdn.example.com/a.mp4").await);
    assert_eq!(h.store.media_file_count(), 2);

    assert_eq!(h.cache.clear().await, 2);
    assert_eq!(h.store.media_file_count(), 0);
    assert_eq!(h.cache.current_size().await, 0);
}

// ============================================================================
// Variants and adaptation
// ============================================================================

#[core_async::test]
async fn test_secondary_variants_attach_in_background() {
    let h = HarnessBuilder::new(config(100 * MB))
        .with_jobs()
        .start()
        .await;
    let id = "https://cdn.example.com/v";
    h.selector
        .insert(id, ladder(id, Quality::Medium, Some(Quality::Low)));
    h.store.serve(&format!("{}_high.mp4", id), 4 * MB);
    h.store.serve(&format!("{}_medium.mp4", id), 2 * MB);
    h.store.serve(&format!("{}_low.mp4", id), MB);

    let source = h.cache.materialize(id, Priority::Normal).await;
    assert!(cached_path(&source).to_string_lossy().ends_with("_medium.mp4"));

    let queued: Vec<Quality> = h.jobs.queued().into_iter().map(|(q, _)| q).collect();
    assert_eq!(queued, vec![Quality::High, Quality::Low]);

    assert_eq!(h.jobs.run_all().await, 2);
    let stats = h.cache.stats().await;
    assert_eq!(stats.variant_files, 2);
    assert_eq!(stats.total_bytes, 7 * MB);

    // Good network on a mid-tier device prefers High.
    let served = h.cache.lookup(id, Priority::Normal).await.unwrap();
    assert!(served.starts_with("/cache/high_quality"));
}

#[core_async::test]
async fn test_variant_for_removed_entry_is_discarded() {
    let h = HarnessBuilder::new(config(100 * MB))
        .with_jobs()
        .start()
        .await;
    let id = "https://cdn.example.com/v";
    h.selector.insert(id, ladder(id, Quality::Medium, None));
    for quality in Quality::ALL {
        h.store.serve(&format!("{}_{}.mp4", id, quality.label()), MB);
    }

    h.cache.materialize(id, Priority::Normal).await;
    h.cache.remove(id).await;
    h.jobs.run_all().await;

    assert_eq!(h.cache.current_size().await, 0);
    assert_eq!(h.store.media_file_count(), 0);
}

#[core_async::test]
async fn test_poor_network_downloads_fallback_only() {
    let h = HarnessBuilder::new(config(100 * MB))
        .network(NetworkQuality::Poor)
        .with_jobs()
        .start()
        .await;
    let id = "https://cdn.example.com/v";
    h.selector
        .insert(id, ladder(id, Quality::High, Some(Quality::Low)));
    for quality in Quality::ALL {
        h.store.serve(&format!("{}_{}.mp4", id, quality.label()), MB);
    }

    let source = h.cache.materialize(id, Priority::Normal).await;

    assert!(cached_path(&source).starts_with("/cache/low_quality"));
    assert_eq!(h.store.download_count(), 1);
    assert!(h.jobs.queued().is_empty());
}

#[core_async::test]
async fn test_network_change_adapts_policies() {
    let h = HarnessBuilder::new(config(100 * MB))
        .device(DeviceTier::High)
        .start()
        .await;
    assert_eq!(h.cache.network_quality().await, NetworkQuality::Good);
    assert_eq!(h.cache.preferred_quality().await, Quality::High);

    assert!(
        h.cache
            .apply_network_info(&network_info(NetworkQuality::Poor))
            .await
    );
    assert_eq!(h.cache.preferred_quality().await, Quality::Low);
    assert_eq!(h.cache.preload_settings().await, PreloadSettings::CONSERVATIVE);

    assert!(
        !h.cache
            .apply_network_info(&network_info(NetworkQuality::Poor))
            .await
    );

    h.network.set(NetworkQuality::Excellent);
    h.cache.refresh_conditions().await;
    assert_eq!(h.cache.preload_settings().await, PreloadSettings::AGGRESSIVE);
}

#[core_async::test]
async fn test_preload_warms_predicted_entries() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    let id = "https://cdn.example.com/a.mp4";
    h.store.serve(id, MB);

    h.cache.materialize(id, Priority::Normal).await;
    assert_eq!(h.cache.preload().await, 0);

    // Accesses one second apart predict the next one a second out.
    h.clock.advance(Duration::from_secs(1));
    h.cache.lookup(id, Priority::Normal).await;
    assert_eq!(h.cache.preload().await, 1);

    h.clock.advance(Duration::from_secs(10 * 60));
    assert_eq!(h.cache.preload().await, 0);
}

// ============================================================================
// Persistence and lifecycle
// ============================================================================

#[core_async::test]
async fn test_index_survives_restart() {
    let store = Arc::new(MemoryFileStore::new());
    store.serve("https://cdn.example.com/a.mp4", MB);
    store.serve("https://cdn.example.com/b.mp4", 2 * MB);

    let first = HarnessBuilder::new(config(100 * MB))
        .store(store.clone())
        .start()
        .await;
    let a = first
        .cache
        .materialize("https://cdn.example.com/a.mp4", Priority::High)
        .await;
    first
        .cache
        .materialize("https://cdn.example.com/b.mp4", Priority::Low)
        .await;
    first.cache.flush().await.unwrap();
    assert!(store.has_file(Path::new("/cache/index.json")));
    assert!(store.has_file(Path::new("/cache/patterns.json")));

    let second = HarnessBuilder::new(config(100 * MB))
        .store(store.clone())
        .start()
        .await;
    let stats = second.cache.stats().await;
    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.total_bytes, 3 * MB);
    assert_eq!(stats.high_priority_entries, 1);

    let found = second
        .cache
        .lookup("https://cdn.example.com/a.mp4", Priority::High)
        .await;
    assert_eq!(found.as_deref(), a.local_path());
    assert_eq!(store.download_count(), 2);
}

#[core_async::test]
async fn test_unreadable_records_fall_back_to_memory_only() {
    let store = Arc::new(MemoryFileStore::new());
    store.break_reads();
    store.serve("https://cdn.example.com/a.mp4", MB);

    let h = HarnessBuilder::new(config(100 * MB))
        .store(store.clone())
        .start()
        .await;
    assert!(h.cache.stats().await.memory_only);

    let source = h
        .cache
        .materialize("https://cdn.example.com/a.mp4", Priority::Normal)
        .await;
    assert!(source.is_cached());

    h.cache.flush().await.unwrap();
    settle().await;
    assert!(!store.has_file(Path::new("/cache/index.json")));
}

#[core_async::test]
async fn test_corrupt_index_is_memory_only() {
    let store = Arc::new(MemoryFileStore::new());
    store.put(Path::new("/cache/index.json"), "{ not json");

    let h = HarnessBuilder::new(config(100 * MB))
        .store(store)
        .start()
        .await;
    let stats = h.cache.stats().await;
    assert!(stats.memory_only);
    assert_eq!(stats.total_entries, 0);
}

#[core_async::test]
async fn test_start_and_shutdown() {
    let h = HarnessBuilder::new(config(100 * MB)).start().await;
    h.store.serve("https://cdn.example.com/a.mp4", MB);

    h.cache.start().await;
    h.cache.start().await;
    h.cache
        .materialize("https://cdn.example.com/a.mp4", Priority::Normal)
        .await;

    h.cache.shutdown().await.unwrap();
    assert!(h.store.has_file(Path::new("/cache/index.json")));
}

// ============================================================================
// Construction
// ============================================================================

#[core_async::test]
async fn test_builder_requires_capabilities() {
    let result = MediaCacheManager::builder(config(10 * MB))
        .file_store(Arc::new(MemoryFileStore::new()))
        .build();

    match result {
        Err(CacheError::CapabilityMissing { capability, .. }) => {
            assert_eq!(capability, "NetworkMonitor")
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("builder accepted missing capabilities"),
    }
}

#[core_async::test]
async fn test_builder_rejects_invalid_config() {
    let result = MediaCacheManager::builder(config(10 * MB).with_cleanup_threshold(1.5))
        .file_store(Arc::new(MemoryFileStore::new()))
        .network_monitor(Arc::new(StaticNetwork::new(NetworkQuality::Good)))
        .device_classifier(Arc::new(StaticDevice::new(DeviceTier::Mid)))
        .quality_selector(Arc::new(TableSelector::new()))
        .build();

    assert!(matches!(result, Err(CacheError::Configuration(_))));
}

// ============================================================================
// Selection cache
// ============================================================================

mock! {
    pub Selector {}

    #[async_trait::async_trait]
    impl QualitySelector for Selector {
        async fn select(
            &self,
            logical_id: &str,
            context: &SelectionContext,
        ) -> bridge_traits::error::Result<QualitySelection>;
    }
}

#[core_async::test]
async fn test_selection_cached_until_network_changes() {
    let mut selector = MockSelector::new();
    selector
        .expect_select()
        .times(2)
        .returning(|id, _| Ok(QualitySelection::single(Quality::Medium, id)));

    // Nothing is served, so every materialisation passes through and has to
    // consult the selection again.
    let cache = MediaCacheManager::builder(config(10 * MB))
        .file_store(Arc::new(MemoryFileStore::new()))
        .network_monitor(Arc::new(StaticNetwork::new(NetworkQuality::Good)))
        .device_classifier(Arc::new(StaticDevice::new(DeviceTier::Mid)))
        .quality_selector(Arc::new(selector))
        .build()
        .unwrap();
    cache.initialize().await.unwrap();

    let id = "https://cdn.example.com/a.mp4";
    assert!(!cache.materialize(id, Priority::Normal).await.is_cached());
    assert!(!cache.materialize(id, Priority::Normal).await.is_cached());

    cache
        .apply_network_info(&network_info(NetworkQuality::Fair))
        .await;
    assert!(!cache.materialize(id, Priority::Normal).await.is_cached());
}
