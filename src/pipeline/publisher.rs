//! Demand-driven, back-pressured publication
//!
//! Reactive-streams shape without an event loop: the subscriber receives
//! a [`Subscription`] carrying an atomic demand counter and a cancel
//! flag; the pipeline's consumer loop emits only while demand remains,
//! parking at most one fragment when it runs out. `on_complete` and
//! `on_error` are mutually exclusive and delivered exactly once.
//!
//! The subscription holds no reference back to the pipeline, only the
//! counters and a weak wake handle, so subscriber and pipeline cannot
//! form a reference cycle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tracing::warn;

use crate::constants::MAX_CONSECUTIVE_SUBSCRIBER_ERRORS;
use crate::error::{Result, RippleError};

use super::signal::WakeSignal;

/// Demand for an effectively unbounded stream
pub const UNBOUNDED: u64 = u64::MAX;

/// Receiver of denoised fragments.
pub trait Subscriber: Send {
    /// Called once at attachment with the demand handle.
    fn on_subscribe(&mut self, subscription: Arc<Subscription>);

    /// Called per emitted fragment. Errors are counted and logged;
    /// three consecutive failures tear the pipeline down.
    fn on_next(&mut self, fragment: &[f64]) -> Result<()>;

    /// Called at most once, on fatal pipeline errors.
    fn on_error(&mut self, error: &RippleError);

    /// Called at most once, when the pipeline closes cleanly.
    fn on_complete(&mut self);
}

/// Demand and cancellation state owned by the subscriber side.
pub struct Subscription {
    requested: AtomicU64,
    cancelled: AtomicBool,
    wake: Weak<WakeSignal>,
}

impl Subscription {
    pub(crate) fn new(wake: &Arc<WakeSignal>) -> Self {
        Self {
            requested: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            wake: Arc::downgrade(wake),
        }
    }

    /// Grant `n` more emissions. `UNBOUNDED` switches the stream to
    /// unlimited demand. Waking from zero demand re-arms the consumer.
    pub fn request(&self, n: u64) {
        if n == 0 {
            return;
        }
        let previous = self
            .requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(n))
            })
            .expect("fetch_update closure always returns Some");

        if previous == 0 {
            if let Some(wake) = self.wake.upgrade() {
                wake.notify();
            }
        }
    }

    /// Stop publication. The pipeline keeps consuming and discards
    /// output until closed.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(wake) = self.wake.upgrade() {
            wake.notify();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Outstanding demand
    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    /// Consume one unit of demand; unbounded demand never decrements.
    fn try_take_one(&self) -> bool {
        self.requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match current {
                0 => None,
                UNBOUNDED => Some(UNBOUNDED),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

/// What happened to a fragment handed to the publisher
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PublishOutcome {
    /// Delivered to the subscriber
    Delivered,
    /// Delivered, but the subscriber's `on_next` failed
    DeliveredWithError,
    /// No demand; fragment parked (mailbox capacity 1)
    Parked,
    /// Subscription cancelled; fragment discarded
    Dropped,
}

/// Single-subscriber sink driven by the consumer loop.
pub(crate) struct Publisher {
    subscriber: Option<Box<dyn Subscriber>>,
    subscription: Option<Arc<Subscription>>,
    parked: Option<Vec<f64>>,
    consecutive_errors: u32,
    terminated: bool,
}

impl Publisher {
    pub(crate) fn new() -> Self {
        Self {
            subscriber: None,
            subscription: None,
            parked: None,
            consecutive_errors: 0,
            terminated: false,
        }
    }

    /// Attach the single subscriber. Re-subscription fails.
    pub(crate) fn subscribe(
        &mut self,
        mut subscriber: Box<dyn Subscriber>,
        wake: &Arc<WakeSignal>,
    ) -> Result<()> {
        if self.subscriber.is_some() {
            return Err(RippleError::state("pipeline already has a subscriber"));
        }
        if self.terminated {
            return Err(RippleError::state("pipeline already terminated"));
        }

        let subscription = Arc::new(Subscription::new(wake));
        subscriber.on_subscribe(Arc::clone(&subscription));
        self.subscriber = Some(subscriber);
        self.subscription = Some(subscription);
        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.subscription
            .as_ref()
            .map(|s| s.is_cancelled())
            .unwrap_or(false)
    }

    pub(crate) fn has_parked(&self) -> bool {
        self.parked.is_some()
    }

    /// Emit a fragment subject to demand. Errors after
    /// `MAX_CONSECUTIVE_SUBSCRIBER_ERRORS` straight `on_next` failures.
    pub(crate) fn publish(&mut self, fragment: Vec<f64>) -> Result<PublishOutcome> {
        if self.terminated || self.is_cancelled() {
            return Ok(PublishOutcome::Dropped);
        }

        let Some(subscription) = self.subscription.as_ref() else {
            // Nobody attached yet: hold the fragment for the first
            // subscriber's demand.
            debug_assert!(self.parked.is_none(), "mailbox capacity is 1");
            self.parked = Some(fragment);
            return Ok(PublishOutcome::Parked);
        };

        if !subscription.try_take_one() {
            debug_assert!(self.parked.is_none(), "mailbox capacity is 1");
            self.parked = Some(fragment);
            return Ok(PublishOutcome::Parked);
        }

        self.deliver(&fragment)
    }

    /// Retry the parked fragment. `Ok(None)` when nothing was parked;
    /// otherwise the outcome of the retry (`Parked` means the mailbox is
    /// still occupied).
    pub(crate) fn try_flush_parked(&mut self) -> Result<Option<PublishOutcome>> {
        let Some(fragment) = self.parked.take() else {
            return Ok(None);
        };
        self.publish(fragment).map(Some)
    }

    fn deliver(&mut self, fragment: &[f64]) -> Result<PublishOutcome> {
        let subscriber = self
            .subscriber
            .as_mut()
            .expect("subscription implies subscriber");

        match subscriber.on_next(fragment) {
            Ok(()) => {
                self.consecutive_errors = 0;
                Ok(PublishOutcome::Delivered)
            }
            Err(error) => {
                self.consecutive_errors += 1;
                warn!(
                    consecutive = self.consecutive_errors,
                    %error,
                    "subscriber on_next failed"
                );
                if self.consecutive_errors >= MAX_CONSECUTIVE_SUBSCRIBER_ERRORS {
                    return Err(RippleError::internal(format!(
                        "subscriber failed {} consecutive emissions",
                        self.consecutive_errors
                    )));
                }
                Ok(PublishOutcome::DeliveredWithError)
            }
        }
    }

    /// Deliver `on_complete` exactly once.
    pub(crate) fn complete(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        if let Some(subscriber) = self.subscriber.as_mut() {
            subscriber.on_complete();
        }
    }

    /// Deliver `on_error` exactly once.
    pub(crate) fn fail(&mut self, error: &RippleError) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        if let Some(subscriber) = self.subscriber.as_mut() {
            subscriber.on_error(error);
        }
    }
}
