//! Rollout arithmetic and victim ordering.

use convoy_state::{DEFAULT_STEP_PAUSE_MS, Millis, Pod, PodId, RolloutPolicy, RolloutProgress};

/// New-digest pods wanted at `percent` of `replicas`, rounded up.
pub fn desired_new_count(percent: u32, replicas: u32) -> u32 {
    let wanted = (u64::from(percent) * u64::from(replicas)).div_ceil(100);
    u32::try_from(wanted).unwrap_or(u32::MAX)
}

/// Step percent for the current progress; past the last step means 100.
pub fn current_step_percent(policy: &RolloutPolicy, progress: &RolloutProgress) -> u32 {
    policy
        .steps
        .get(progress.step_index)
        .map_or(100, |s| s.percent)
}

/// Pause between advances. A zero pause falls back to the default.
pub fn effective_pause_ms(policy: &RolloutPolicy) -> u64 {
    if policy.pause_ms == 0 {
        DEFAULT_STEP_PAUSE_MS
    } else {
        policy.pause_ms
    }
}

/// Whether strictly more than the pause has passed since the last advance.
pub fn pause_elapsed(policy: &RolloutPolicy, progress: &RolloutProgress, now: Millis) -> bool {
    progress
        .last_step_at
        .is_none_or(|at| now.saturating_sub(at) > effective_pause_ms(policy))
}

/// Oldest `count` pods, ties broken by id.
pub fn surplus_victims<'a>(pods: impl IntoIterator<Item = &'a Pod>, count: usize) -> Vec<PodId> {
    let mut pods: Vec<&Pod> = pods.into_iter().collect();
    pods.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
    pods.into_iter().take(count).map(|p| p.id.clone()).collect()
}

/// `count` pods to kill during a staged rollout: old digests before the
/// current one, then oldest first, then by id.
pub fn staged_victims<'a>(
    pods: impl IntoIterator<Item = &'a Pod>,
    current_digest: &str,
    count: usize,
) -> Vec<PodId> {
    let mut pods: Vec<&Pod> = pods.into_iter().collect();
    pods.sort_by_key(|p| (p.digest == current_digest, p.created_at, p.id.clone()));
    pods.into_iter().take(count).map(|p| p.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_state::{RolloutStep, RolloutStrategy};

    fn staged(steps: &[u32], pause_ms: u64) -> RolloutPolicy {
        RolloutPolicy {
            strategy: RolloutStrategy::Staged,
            steps: steps.iter().map(|&percent| RolloutStep { percent }).collect(),
            pause_ms,
        }
    }

    #[test]
    fn desired_new_rounds_up() {
        assert_eq!(desired_new_count(50, 4), 2);
        assert_eq!(desired_new_count(50, 3), 2);
        assert_eq!(desired_new_count(10, 3), 1);
        assert_eq!(desired_new_count(100, 4), 4);
        assert_eq!(desired_new_count(0, 4), 0);
        assert_eq!(desired_new_count(50, 0), 0);
    }

    #[test]
    fn out_of_range_step_is_full_rollout() {
        let policy = staged(&[25, 50], 1_000);
        let progress = RolloutProgress { step_index: 1, last_step_at: None };
        assert_eq!(current_step_percent(&policy, &progress), 50);
        let progress = RolloutProgress { step_index: 5, last_step_at: None };
        assert_eq!(current_step_percent(&policy, &progress), 100);
    }

    #[test]
    fn pause_is_strict_and_defaults() {
        let policy = staged(&[50, 100], 5_000);
        let progress = RolloutProgress { step_index: 0, last_step_at: Some(10_000) };
        assert!(!pause_elapsed(&policy, &progress, 15_000));
        assert!(pause_elapsed(&policy, &progress, 15_001));

        let fresh = RolloutProgress::default();
        assert!(pause_elapsed(&policy, &fresh, 0));

        let zero = staged(&[50], 0);
        assert_eq!(effective_pause_ms(&zero), DEFAULT_STEP_PAUSE_MS);
        assert!(!pause_elapsed(&zero, &progress, 12_000));
    }

    #[test]
    fn immediate_victims_oldest_then_id() {
        let pods = [
            Pod::new("pod-c", "api", 1, "d1", 200),
            Pod::new("pod-b", "api", 2, "d1", 100),
            Pod::new("pod-a", "api", 3, "d1", 100),
        ];
        assert_eq!(surplus_victims(&pods, 2), vec!["pod-a", "pod-b"]);
        assert_eq!(surplus_victims(&pods, 0), Vec::<PodId>::new());
    }

    #[test]
    fn staged_victims_prefer_old_digest() {
        let pods = [
            Pod::new("pod-new-old", "api", 1, "d2", 10),
            Pod::new("pod-old-young", "api", 2, "d1", 500),
            Pod::new("pod-old-old", "api", 3, "d1", 50),
            Pod::new("pod-new-young", "api", 4, "d2", 600),
        ];
        assert_eq!(
            staged_victims(&pods, "d2", 3),
            vec!["pod-old-old", "pod-old-young", "pod-new-old"]
        );
    }
}
