//! Pull-point subscriptions
//!
//! A subscription is live until its termination time passes or it is
//! unsubscribed. Expiry is discovered lazily: the first operation that
//! finds a subscription past its termination time fails with
//! [`ServerError::SubscriptionExpired`] and removes it from the table.
//!
//! The table lock is only held to look a subscription up. Renew, pull and
//! publish take the subscription's own lock, and a waiting pull sleeps on
//! the subscription's [`Notify`], never on a lock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use onvif_api::types::events::{NotificationMessage, TerminationTime};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::clock::{self, Clock};
use crate::error::{Result, ServerError};

/// Limits of the subscription manager
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionLimits {
    pub default_duration: Duration,
    pub max_duration: Duration,
    pub queue_capacity: usize,
    pub max_pull_messages: u32,
    /// Longest a pull is held open, whatever the request asks for
    pub max_pull_wait: Duration,
}

impl Default for SubscriptionLimits {
    fn default() -> Self {
        Self {
            default_duration: Duration::from_secs(60),
            max_duration: Duration::from_secs(3600),
            queue_capacity: 100,
            max_pull_messages: 100,
            max_pull_wait: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct SubscriptionState {
    termination_time: DateTime<Utc>,
    queue: VecDeque<NotificationMessage>,
    closed: bool,
}

#[derive(Debug)]
struct Subscription {
    id: String,
    created: DateTime<Utc>,
    /// Concrete-set topic expression; `None` receives everything
    filter: Option<String>,
    state: Mutex<SubscriptionState>,
    notify: Notify,
}

impl Subscription {
    fn accepts(&self, topic: &str) -> bool {
        match &self.filter {
            None => true,
            Some(filter) => filter.split('|').map(str::trim).any(|expression| {
                topic == expression
                    || topic
                        .strip_prefix(expression)
                        .is_some_and(|rest| rest.starts_with('/'))
            }),
        }
    }
}

/// Result of subscribe and renew
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionTimes {
    pub current_time: DateTime<Utc>,
    pub termination_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSubscription {
    pub id: String,
    pub created: DateTime<Utc>,
    pub times: SubscriptionTimes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    pub times: SubscriptionTimes,
    pub messages: Vec<NotificationMessage>,
}

#[derive(Debug)]
pub struct SubscriptionManager {
    clock: Arc<dyn Clock>,
    limits: SubscriptionLimits,
    subscriptions: Mutex<HashMap<String, Arc<Subscription>>>,
}

impl SubscriptionManager {
    pub fn new(clock: Arc<dyn Clock>, limits: SubscriptionLimits) -> Self {
        Self {
            clock,
            limits,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> &SubscriptionLimits {
        &self.limits
    }

    /// Requested lifetime capped at the maximum. A termination time that is
    /// already past is rejected.
    fn lifetime(&self, requested: Option<TerminationTime>, now: DateTime<Utc>) -> Result<Duration> {
        let duration = match requested {
            Some(requested) => requested.duration_from(now),
            None => self.limits.default_duration,
        };
        if duration.is_zero() {
            return Err(ServerError::InvalidArgument(
                "termination time must be in the future".to_string(),
            ));
        }
        Ok(duration.min(self.limits.max_duration))
    }

    pub fn subscribe(&self, requested: Option<TerminationTime>, filter: Option<String>) -> Result<CreatedSubscription> {
        let now = self.clock.now();
        let termination_time = clock::add(now, self.lifetime(requested, now)?);
        let id = uuid::Uuid::new_v4().simple().to_string();
        let subscription = Arc::new(Subscription {
            id: id.clone(),
            created: now,
            filter: filter.filter(|f| !f.trim().is_empty()),
            state: Mutex::new(SubscriptionState {
                termination_time,
                queue: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        });
        self.subscriptions.lock().insert(id.clone(), subscription);
        tracing::debug!("subscription {} created, terminates {}", id, termination_time);

        Ok(CreatedSubscription {
            id,
            created: now,
            times: SubscriptionTimes {
                current_time: now,
                termination_time,
            },
        })
    }

    fn lookup(&self, id: &str) -> Result<Arc<Subscription>> {
        self.subscriptions
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ServerError::SubscriptionNotFound(id.to_string()))
    }

    /// Close and drop an expired subscription.
    fn expire(&self, subscription: &Subscription, state: &mut SubscriptionState) -> ServerError {
        state.closed = true;
        state.queue.clear();
        self.subscriptions.lock().remove(&subscription.id);
        subscription.notify.notify_waiters();
        tracing::debug!("subscription {} expired", subscription.id);
        ServerError::SubscriptionExpired(subscription.id.clone())
    }

    /// Fails unless the subscription is open and not past its termination
    /// time.
    fn check_live(&self, subscription: &Subscription, state: &mut SubscriptionState, now: DateTime<Utc>) -> Result<()> {
        if state.closed {
            return Err(ServerError::SubscriptionNotFound(subscription.id.clone()));
        }
        if now >= state.termination_time {
            return Err(self.expire(subscription, state));
        }
        Ok(())
    }

    /// Reset the termination time to now plus the requested duration. The
    /// previous termination time plays no part.
    pub fn renew(&self, id: &str, requested: Option<TerminationTime>) -> Result<SubscriptionTimes> {
        let subscription = self.lookup(id)?;
        let mut state = subscription.state.lock();
        let now = self.clock.now();
        self.check_live(&subscription, &mut state, now)?;
        state.termination_time = clock::add(now, self.lifetime(requested, now)?);
        tracing::debug!("subscription {} renewed until {}", id, state.termination_time);
        Ok(SubscriptionTimes {
            current_time: now,
            termination_time: state.termination_time,
        })
    }

    /// Remove the subscription. Unknown or already removed ids succeed too.
    pub fn unsubscribe(&self, id: &str) {
        let removed = self.subscriptions.lock().remove(id);
        if let Some(subscription) = removed {
            let mut state = subscription.state.lock();
            state.closed = true;
            state.queue.clear();
            drop(state);
            subscription.notify.notify_waiters();
            tracing::debug!("subscription {} removed", id);
        }
    }

    /// Take up to `limit` queued messages in arrival order, waiting up to
    /// `wait` (capped at `max_pull_wait`) for the first one. An empty queue
    /// with a zero wait returns no messages.
    pub async fn pull(&self, id: &str, wait: Duration, limit: u32) -> Result<PullOutcome> {
        if limit == 0 {
            return Err(ServerError::InvalidArgument("message limit must be at least 1".to_string()));
        }
        let limit = limit.min(self.limits.max_pull_messages) as usize;
        let subscription = self.lookup(id)?;
        let wait = wait.min(self.limits.max_pull_wait);
        let start = Instant::now();
        let deadline = start
            .checked_add(wait)
            .unwrap_or_else(|| start + Duration::from_secs(86_400 * 365 * 30));

        loop {
            let notified = subscription.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = subscription.state.lock();
                let now = self.clock.now();
                self.check_live(&subscription, &mut state, now)?;
                if !state.queue.is_empty() || Instant::now() >= deadline {
                    let count = limit.min(state.queue.len());
                    let messages: Vec<_> = state.queue.drain(..count).collect();
                    return Ok(PullOutcome {
                        times: SubscriptionTimes {
                            current_time: now,
                            termination_time: state.termination_time,
                        },
                        messages,
                    });
                }
            }

            // Timing out here just means one more pass that returns empty
            let _ = tokio::time::timeout_at(deadline, notified).await;
        }
    }

    /// Queue `message` on every live subscription whose filter accepts it,
    /// dropping the oldest message of a full queue. Returns the number of
    /// subscriptions reached. Expired subscriptions are skipped but left in
    /// the table so their owner still learns of the expiry.
    pub fn publish(&self, message: &NotificationMessage) -> usize {
        let subscriptions: Vec<_> = self.subscriptions.lock().values().cloned().collect();
        let now = self.clock.now();
        let mut delivered = 0;

        for subscription in subscriptions {
            if !subscription.accepts(&message.topic) {
                continue;
            }
            let mut state = subscription.state.lock();
            if state.closed || now >= state.termination_time {
                continue;
            }
            if state.queue.len() >= self.limits.queue_capacity {
                state.queue.pop_front();
                tracing::trace!("subscription {} queue full, dropped oldest", subscription.id);
            }
            state.queue.push_back(message.clone());
            drop(state);
            subscription.notify.notify_waiters();
            delivered += 1;
        }
        delivered
    }

    /// Subscriptions in the table, including expired ones not yet
    /// discovered
    pub fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creation time of a subscription still in the table
    pub fn created(&self, id: &str) -> Option<DateTime<Utc>> {
        self.subscriptions.lock().get(id).map(|s| s.created)
    }

    /// Messages waiting on a subscription
    pub fn queued(&self, id: &str) -> Option<usize> {
        let subscription = self.subscriptions.lock().get(id).cloned()?;
        let len = subscription.state.lock().queue.len();
        Some(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    fn manager(limits: SubscriptionLimits) -> (Arc<ManualClock>, SubscriptionManager) {
        let clock = Arc::new(ManualClock::new(start()));
        (clock.clone(), SubscriptionManager::new(clock, limits))
    }

    fn motion(n: u32) -> NotificationMessage {
        NotificationMessage::new("tns1:VideoSource/MotionAlarm", start()).with_data("Sequence", n.to_string())
    }

    fn secs(n: u64) -> Option<TerminationTime> {
        Some(TerminationTime::Relative(Duration::from_secs(n)))
    }

    #[test]
    fn test_subscribe_caps_duration() {
        let (_, events) = manager(SubscriptionLimits::default());
        let created = events.subscribe(secs(7200), None).unwrap();
        assert_eq!(created.times.termination_time, start() + chrono::Duration::hours(1));
        assert_eq!(events.created(&created.id), Some(start()));

        let defaulted = events.subscribe(None, None).unwrap();
        assert_eq!(defaulted.times.termination_time, start() + chrono::Duration::seconds(60));

        let absolute = events
            .subscribe(Some(TerminationTime::Absolute(start() + chrono::Duration::seconds(30))), None)
            .unwrap();
        assert_eq!(absolute.times.termination_time, start() + chrono::Duration::seconds(30));

        let past = events.subscribe(Some(TerminationTime::Absolute(start() - chrono::Duration::seconds(1))), None);
        assert!(matches!(past, Err(ServerError::InvalidArgument(_))));
    }

    #[test]
    fn test_renew_resets_from_now() {
        let (clock, events) = manager(SubscriptionLimits::default());
        let created = events.subscribe(secs(600), None).unwrap();

        clock.advance(Duration::from_secs(100));
        let renewed = events.renew(&created.id, secs(30)).unwrap();
        assert_eq!(renewed.current_time, start() + chrono::Duration::seconds(100));
        assert_eq!(renewed.termination_time, start() + chrono::Duration::seconds(130));
    }

    #[tokio::test]
    async fn test_expired_subscription_fails_and_is_removed() {
        let (clock, events) = manager(SubscriptionLimits::default());
        let created = events.subscribe(secs(60), None).unwrap();
        clock.advance(Duration::from_secs(60));

        assert_eq!(events.len(), 1);
        let error = events.pull(&created.id, Duration::ZERO, 10).await.unwrap_err();
        assert!(matches!(error, ServerError::SubscriptionExpired(_)));
        assert!(events.is_empty());

        let error = events.renew(&created.id, secs(60)).unwrap_err();
        assert!(matches!(error, ServerError::SubscriptionNotFound(_)));
    }

    #[test]
    fn test_renew_after_expiry_fails() {
        let (clock, events) = manager(SubscriptionLimits::default());
        let created = events.subscribe(secs(10), None).unwrap();
        clock.advance(Duration::from_secs(11));
        assert!(matches!(
            events.renew(&created.id, secs(60)),
            Err(ServerError::SubscriptionExpired(_))
        ));
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let (_, events) = manager(SubscriptionLimits::default());
        let created = events.subscribe(None, None).unwrap();
        events.unsubscribe(&created.id);
        events.unsubscribe(&created.id);
        events.unsubscribe("never-existed");
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_queue_drops_oldest() {
        let (_, events) = manager(SubscriptionLimits {
            queue_capacity: 3,
            ..Default::default()
        });
        let created = events.subscribe(None, None).unwrap();
        for n in 1..=5 {
            assert_eq!(events.publish(&motion(n)), 1);
        }
        assert_eq!(events.queued(&created.id), Some(3));

        let outcome = events.pull(&created.id, Duration::ZERO, 10).await.unwrap();
        let sequence: Vec<_> = outcome
            .messages
            .iter()
            .map(|m| m.data_value("Sequence").unwrap().to_string())
            .collect();
        assert_eq!(sequence, ["3", "4", "5"]);
    }

    #[tokio::test]
    async fn test_pull_respects_limit_and_order() {
        let (_, events) = manager(SubscriptionLimits::default());
        let created = events.subscribe(None, None).unwrap();
        for n in 1..=4 {
            events.publish(&motion(n));
        }
        let first = events.pull(&created.id, Duration::ZERO, 3).await.unwrap();
        assert_eq!(first.messages.len(), 3);
        assert_eq!(first.messages[0].data_value("Sequence"), Some("1"));
        let rest = events.pull(&created.id, Duration::ZERO, 3).await.unwrap();
        assert_eq!(rest.messages.len(), 1);
        assert_eq!(rest.messages[0].data_value("Sequence"), Some("4"));

        assert!(matches!(
            events.pull(&created.id, Duration::ZERO, 0).await,
            Err(ServerError::InvalidArgument(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_waits_for_publish() {
        let (_, events) = manager(SubscriptionLimits::default());
        let events = Arc::new(events);
        let created = events.subscribe(None, None).unwrap();

        let puller = {
            let events = events.clone();
            let id = created.id.clone();
            tokio::spawn(async move { events.pull(&id, Duration::from_secs(30), 10).await })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        events.publish(&motion(1));

        let outcome = puller.await.unwrap().unwrap();
        assert_eq!(outcome.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_leaves_expiry_to_the_subscriber() {
        let (clock, events) = manager(SubscriptionLimits::default());
        let created = events.subscribe(secs(10), None).unwrap();
        clock.advance(Duration::from_secs(11));

        assert_eq!(events.publish(&motion(1)), 0);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events.pull(&created.id, Duration::ZERO, 1).await,
            Err(ServerError::SubscriptionExpired(_))
        ));
        assert!(matches!(
            events.renew(&created.id, secs(10)),
            Err(ServerError::SubscriptionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_pull_wait_is_capped() {
        let (_, events) = manager(SubscriptionLimits {
            max_pull_wait: Duration::from_secs(5),
            ..Default::default()
        });
        let created = events.subscribe(None, None).unwrap();
        let wait = onvif_soap::time::parse_duration("PT9999999999999999999S").unwrap();

        let started = Instant::now();
        let outcome = events.pull(&created.id, wait, 1).await.unwrap();
        assert!(outcome.messages.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));

        let outcome = events.pull(&created.id, Duration::MAX, 1).await.unwrap();
        assert!(outcome.messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_wait_elapses_empty() {
        let (_, events) = manager(SubscriptionLimits::default());
        let created = events.subscribe(None, None).unwrap();
        let started = Instant::now();
        let outcome = events.pull(&created.id, Duration::from_secs(5), 10).await.unwrap();
        assert!(outcome.messages.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_topic_filter() {
        let (_, events) = manager(SubscriptionLimits::default());
        let motion_only = events
            .subscribe(None, Some("tns1:VideoSource|tns1:RuleEngine/CellMotionDetector".to_string()))
            .unwrap();
        let everything = events.subscribe(None, None).unwrap();

        let input = NotificationMessage::new("tns1:Device/Trigger/DigitalInput", start());
        assert_eq!(events.publish(&input), 1);
        assert_eq!(events.publish(&motion(1)), 2);
        let prefix_only = NotificationMessage::new("tns1:VideoSourceX/Other", start());
        assert_eq!(events.publish(&prefix_only), 1);

        assert_eq!(events.queued(&motion_only.id), Some(1));
        assert_eq!(events.queued(&everything.id), Some(3));
    }
}
