//! Size- and age-bounded eviction planning
//!
//! Planning is a pure function over a snapshot of candidates so the ordering
//! rules can be tested without touching the filesystem. The service applies
//! the plan under its lock and deletes files afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::PictogramId;

/// Limits that trigger eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionPolicy {
    pub max_bytes: u64,
    pub max_age: Option<Duration>,
}

/// A `Present` entry considered for eviction
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub pictogram_id: PictogramId,
    pub size_bytes: u64,
    pub last_accessed: DateTime<Utc>,
    pub access_seq: u64,
    pub pinned: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionStats {
    pub entries_evicted: usize,
    pub bytes_freed: u64,
    pub expired_removed: usize,
    pub pinned_skipped: usize,
    pub remaining_entries: usize,
    pub remaining_bytes: u64,
}

/// Ids to evict, oldest first, plus the resulting stats
pub fn plan_eviction(
    mut candidates: Vec<EvictionCandidate>,
    policy: &EvictionPolicy,
    now: DateTime<Utc>,
) -> (Vec<PictogramId>, EvictionStats) {
    candidates.sort_by(|a, b| {
        a.last_accessed
            .cmp(&b.last_accessed)
            .then(a.access_seq.cmp(&b.access_seq))
            .then(a.pictogram_id.cmp(&b.pictogram_id))
    });

    let mut total: u64 = candidates.iter().map(|c| c.size_bytes).sum();
    let mut remaining_entries = candidates.len();
    let mut stats = EvictionStats::default();
    let mut victims = Vec::new();

    let age_cutoff = policy
        .max_age
        .and_then(|age| chrono::Duration::from_std(age).ok())
        .map(|age| now - age);

    for candidate in &candidates {
        let expired = age_cutoff.is_some_and(|cutoff| candidate.last_accessed < cutoff);
        let over_budget = total > policy.max_bytes;
        if !expired && !over_budget {
            // sorted oldest first: nothing later is expired either
            break;
        }
        if candidate.pinned {
            stats.pinned_skipped += 1;
            continue;
        }

        victims.push(candidate.pictogram_id);
        total -= candidate.size_bytes;
        remaining_entries -= 1;
        stats.entries_evicted += 1;
        stats.bytes_freed += candidate.size_bytes;
        if expired && !over_budget {
            stats.expired_removed += 1;
        }
    }

    stats.remaining_entries = remaining_entries;
    stats.remaining_bytes = total;
    (victims, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: PictogramId, size: u64, minutes_ago: i64, pinned: bool) -> EvictionCandidate {
        EvictionCandidate {
            pictogram_id: id,
            size_bytes: size,
            last_accessed: Utc::now() - chrono::Duration::minutes(minutes_ago),
            access_seq: 0,
            pinned,
        }
    }

    #[test]
    fn test_evicts_least_recently_used_until_under_budget() {
        let policy = EvictionPolicy {
            max_bytes: 250,
            max_age: None,
        };
        let (victims, stats) = plan_eviction(
            vec![
                candidate(1, 100, 1, false),
                candidate(2, 100, 30, false),
                candidate(3, 100, 10, false),
            ],
            &policy,
            Utc::now(),
        );

        assert_eq!(victims, vec![2]);
        assert_eq!(stats.bytes_freed, 100);
        assert_eq!(stats.remaining_bytes, 200);
        assert_eq!(stats.remaining_entries, 2);
    }

    #[test]
    fn test_pinned_entries_are_never_evicted() {
        let policy = EvictionPolicy {
            max_bytes: 100,
            max_age: None,
        };
        let (victims, stats) = plan_eviction(
            vec![
                candidate(1, 100, 60, true),
                candidate(2, 100, 30, false),
                candidate(3, 100, 10, false),
            ],
            &policy,
            Utc::now(),
        );

        assert_eq!(victims, vec![2, 3]);
        assert_eq!(stats.pinned_skipped, 1);
        assert_eq!(stats.remaining_bytes, 100);
    }

    #[test]
    fn test_expired_entries_go_even_under_budget() {
        let policy = EvictionPolicy {
            max_bytes: 10_000,
            max_age: Some(Duration::from_secs(3600)),
        };
        let (victims, stats) = plan_eviction(
            vec![candidate(1, 100, 120, false), candidate(2, 100, 5, false)],
            &policy,
            Utc::now(),
        );

        assert_eq!(victims, vec![1]);
        assert_eq!(stats.expired_removed, 1);
    }

    #[test]
    fn test_access_sequence_breaks_timestamp_ties() {
        let now = Utc::now();
        let policy = EvictionPolicy {
            max_bytes: 100,
            max_age: None,
        };
        let mut older = candidate(9, 100, 0, false);
        let mut newer = candidate(1, 100, 0, false);
        older.last_accessed = now;
        newer.last_accessed = now;
        older.access_seq = 1;
        newer.access_seq = 2;

        let (victims, _) = plan_eviction(vec![newer, older], &policy, now);
        assert_eq!(victims, vec![9]);
    }

    #[test]
    fn test_nothing_to_do_within_limits() {
        let policy = EvictionPolicy {
            max_bytes: 1000,
            max_age: None,
        };
        let (victims, stats) =
            plan_eviction(vec![candidate(1, 10, 1, false)], &policy, Utc::now());
        assert!(victims.is_empty());
        assert_eq!(stats.remaining_entries, 1);
    }
}
