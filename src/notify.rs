use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::limits::NOTIFY_CHANNEL_CAPACITY;
use crate::model::Booking;

/// Channel name that receives every room's notifications.
pub const ALL_ROOMS: &str = "*";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier closed")]
    Closed,
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Delivery of booking confirmations. Callers treat every failure as non-fatal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_booking_confirmation(&self, booking: &Booking) -> Result<(), NotifyError>;

    async fn send_cancellation_confirmation(&self, booking: &Booking) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "booking", rename_all = "snake_case")]
pub enum Notification {
    BookingConfirmed(Booking),
    BookingCancelled(Booking),
}

impl Notification {
    pub fn booking(&self) -> &Booking {
        match self {
            Notification::BookingConfirmed(b) | Notification::BookingCancelled(b) => b,
        }
    }
}

/// Broadcast hub: one channel per room id plus the `ALL_ROOMS` channel.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<Notification>>,
    closed: AtomicBool,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Subscribe to a room's notifications, or `ALL_ROOMS`. Creates the channel if needed.
    ///
    /// Channels whose subscribers have all gone are dropped on the way.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Notification> {
        self.prune();
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(NOTIFY_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop every channel nobody is subscribed to.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Publish to the booking's room channel and to `ALL_ROOMS`.
    /// No-op if nobody is listening.
    pub fn publish(&self, notification: Notification) -> Result<(), NotifyError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NotifyError::Closed);
        }
        for channel in [notification.booking().room_id(), ALL_ROOMS] {
            let abandoned = match self.channels.get(channel) {
                Some(sender) => sender.send(notification.clone()).is_err(),
                None => false,
            };
            if abandoned {
                self.channels
                    .remove_if(channel, |_, sender| sender.receiver_count() == 0);
            }
        }
        Ok(())
    }

    /// Drop every channel; subscribers see their stream end and later publishes fail.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.channels.clear();
    }
}

#[async_trait]
impl Notifier for NotifyHub {
    async fn send_booking_confirmation(&self, booking: &Booking) -> Result<(), NotifyError> {
        self.publish(Notification::BookingConfirmed(booking.clone()))
    }

    async fn send_cancellation_confirmation(&self, booking: &Booking) -> Result<(), NotifyError> {
        self.publish(Notification::BookingCancelled(booking.clone()))
    }
}
