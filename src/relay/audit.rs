use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::platform::{AuditAction, AuditEntry, AuditTrail, PlatformError};

/// How many of the newest audit entries are scanned per lookup.
pub const AUDIT_QUERY_LIMIT: u8 = 5;

/// First entry (newest first) naming `target_id` that is younger than `window`.
pub fn find_recent_action(
    entries: &[AuditEntry],
    target_id: u64,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<&AuditEntry> {
    entries
        .iter()
        .find(|entry| entry.target_id == Some(target_id) && now - entry.created_at < window)
}

/// Explains member removals and bans through the guild audit log.
#[derive(Clone)]
pub struct AuditCorrelator {
    trail: Arc<dyn AuditTrail>,
    window: Duration,
}

impl AuditCorrelator {
    pub fn new(trail: Arc<dyn AuditTrail>, window: Duration) -> Self {
        Self { trail, window }
    }

    pub async fn correlate(
        &self,
        guild_id: u64,
        action: AuditAction,
        target_id: u64,
    ) -> Option<AuditEntry> {
        let entries = match self
            .trail
            .recent_actions(guild_id, action, AUDIT_QUERY_LIMIT)
            .await
        {
            Ok(entries) => entries,
            Err(PlatformError::Forbidden(reason)) => {
                warn!(
                    "cannot read audit log of guild {} (VIEW_AUDIT_LOG missing?): {}",
                    guild_id, reason
                );
                return None;
            }
            Err(err) => {
                warn!("audit log query for guild {} failed: {}", guild_id, err);
                return None;
            }
        };

        let found = find_recent_action(&entries, target_id, Utc::now(), self.window).cloned();
        if found.is_none() {
            debug!(
                "no recent {:?} audit entry for user {} in guild {}",
                action, target_id, guild_id
            );
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::{fixed_time, MockPlatform};

    fn entry(target: Option<u64>, executor: u64, at: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            target_id: target,
            executor_id: executor,
            reason: None,
            created_at: at,
        }
    }

    #[test]
    fn matches_target_within_window() {
        let now = fixed_time();
        let entries = vec![
            entry(Some(7), 1, now - Duration::seconds(1)),
            entry(Some(9), 2, now - Duration::seconds(2)),
        ];

        let found = find_recent_action(&entries, 9, now, Duration::seconds(5));

        assert_eq!(found.map(|e| e.executor_id), Some(2));
    }

    #[test]
    fn stale_entries_do_not_match() {
        let now = fixed_time();
        let entries = vec![
            entry(Some(9), 1, now - Duration::seconds(5)),
            entry(Some(9), 2, now - Duration::minutes(3)),
        ];

        assert!(find_recent_action(&entries, 9, now, Duration::seconds(5)).is_none());
    }

    #[test]
    fn newest_matching_entry_wins() {
        let now = fixed_time();
        let entries = vec![
            entry(None, 1, now),
            entry(Some(9), 2, now - Duration::seconds(1)),
            entry(Some(9), 3, now - Duration::seconds(2)),
        ];

        let found = find_recent_action(&entries, 9, now, Duration::seconds(5));

        assert_eq!(found.map(|e| e.executor_id), Some(2));
    }

    #[tokio::test]
    async fn correlator_queries_five_entries_of_the_action() {
        let platform = MockPlatform::with_channels(&[]);
        platform.add_audit_entry(AuditAction::Kick, entry(Some(9), 77, Utc::now()));
        let correlator = AuditCorrelator::new(platform.clone(), Duration::seconds(5));

        let found = correlator.correlate(1, AuditAction::Kick, 9).await;

        assert_eq!(found.map(|e| e.executor_id), Some(77));
        assert_eq!(platform.audit_queries(), vec![(1, AuditAction::Kick, 5)]);
    }

    #[tokio::test]
    async fn other_action_kinds_are_not_considered() {
        let platform = MockPlatform::with_channels(&[]);
        platform.add_audit_entry(AuditAction::Ban, entry(Some(9), 77, Utc::now()));
        let correlator = AuditCorrelator::new(platform.clone(), Duration::seconds(5));

        assert!(correlator.correlate(1, AuditAction::Kick, 9).await.is_none());
    }

    #[tokio::test]
    async fn query_failure_means_no_match() {
        let platform = MockPlatform::with_channels(&[]);
        platform.add_audit_entry(AuditAction::Kick, entry(Some(9), 77, Utc::now()));
        platform.fail_audit_with(PlatformError::Forbidden("Missing Permissions".to_string()));
        let correlator = AuditCorrelator::new(platform.clone(), Duration::seconds(5));

        assert!(correlator.correlate(1, AuditAction::Kick, 9).await.is_none());
    }
}
