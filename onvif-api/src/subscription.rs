//! Client-side handle for a pull-point subscription

use std::time::Duration;

use chrono::{DateTime, Utc};
use onvif_soap::CallOptions;
use parking_lot::Mutex;

use crate::client::OnvifClient;
use crate::error::Result;
use crate::operation::Empty;
use crate::types::events::{
    CreatePullPointSubscriptionResponse, NotificationMessage, PullMessages, PullMessagesRequest, Renew,
    RenewRequest, TerminationTime, Unsubscribe,
};

#[derive(Debug)]
struct SubscriptionState {
    termination_time: DateTime<Utc>,
    active: bool,
}

/// A pull-point subscription created by
/// [`OnvifClient::create_pull_point_subscription`].
///
/// Pulls, renewals and the unsubscribe go to the subscription manager
/// address the device returned. Nothing is renewed automatically; a
/// subscription that is not renewed before its termination time is gone and
/// further pulls fail with [`ApiError::NotFound`](crate::ApiError::NotFound)
/// or [`ApiError::Expired`](crate::ApiError::Expired).
///
/// # Example
/// ```rust,ignore
/// let subscription = client
///     .create_pull_point_subscription(&CreatePullPointSubscriptionRequest::with_duration(Duration::from_secs(60)))
///     .await?;
/// let messages = subscription.pull(Duration::from_secs(5), 10).await?;
/// subscription.renew(Duration::from_secs(60)).await?;
/// subscription.unsubscribe().await?;
/// ```
#[derive(Debug)]
pub struct PullPointSubscription {
    client: OnvifClient,
    address: String,
    state: Mutex<SubscriptionState>,
}

impl PullPointSubscription {
    pub(crate) fn new(client: OnvifClient, response: CreatePullPointSubscriptionResponse) -> Self {
        Self {
            client,
            address: response.address,
            state: Mutex::new(SubscriptionState {
                termination_time: response.termination_time,
                active: true,
            }),
        }
    }

    /// Subscription manager address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Last termination time reported by the device
    pub fn termination_time(&self) -> DateTime<Utc> {
        self.state.lock().termination_time
    }

    /// Not unsubscribed and, by the device's last report, not yet expired
    pub fn is_active(&self) -> bool {
        let state = self.state.lock();
        state.active && Utc::now() < state.termination_time
    }

    /// Pull up to `limit` messages, letting the device hold the request for
    /// up to `wait`. The call deadline is `wait` plus the client timeout.
    pub async fn pull(&self, wait: Duration, limit: u32) -> Result<Vec<NotificationMessage>> {
        let options = CallOptions::with_timeout(wait + self.client.timeout());
        self.pull_with(&PullMessagesRequest::new(wait, limit), &options)
            .await
    }

    pub async fn pull_with(
        &self,
        request: &PullMessagesRequest,
        options: &CallOptions,
    ) -> Result<Vec<NotificationMessage>> {
        let response = self
            .client
            .execute_at::<PullMessages>(&self.address, request, options)
            .await?;
        self.state.lock().termination_time = response.termination_time;
        Ok(response.messages)
    }

    /// Extend the subscription to `duration` from now. Returns the new
    /// termination time.
    pub async fn renew(&self, duration: Duration) -> Result<DateTime<Utc>> {
        let request = RenewRequest {
            termination_time: TerminationTime::Relative(duration),
        };
        let response = self
            .client
            .execute_at::<Renew>(&self.address, &request, &CallOptions::default())
            .await?;
        let mut state = self.state.lock();
        state.termination_time = response.termination_time;
        state.active = true;
        Ok(response.termination_time)
    }

    /// End the subscription. Sent even when the handle already thinks the
    /// subscription is gone; the device treats repeats as success.
    pub async fn unsubscribe(&self) -> Result<()> {
        self.client
            .execute_at::<Unsubscribe>(&self.address, &Empty, &CallOptions::default())
            .await?;
        self.state.lock().active = false;
        tracing::debug!("unsubscribed {}", self.address);
        Ok(())
    }
}
