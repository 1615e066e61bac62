//! Passive balance display reader.
//!
//! A mirror shows the balance without ever mutating it. It follows the
//! ledger's change notifications and, as a safety net, polls the store on a
//! fixed interval and whenever the host app returns to the foreground. A
//! polled value replaces the displayed one only when it is newer and
//! different, and every poll is forwarded to [`Ledger::reconcile`] so that a
//! value written by another process ends up in the ledger as well.

use super::{
    manager::Ledger,
    models::{BalanceChange, ReconcileDecision, reconcile_decision},
};
use crate::store::{StateKey, StateStore, with_timeout};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{Notify, broadcast, watch},
    time::{MissedTickBehavior, interval},
};

/// Controls a running [`BalanceMirror`]
#[derive(Clone)]
pub struct MirrorHandle {
    displayed: watch::Receiver<u64>,
    resume: Arc<Notify>,
    shutdown: Arc<Notify>,
}

impl MirrorHandle {
    /// Balance currently shown
    pub fn balance(&self) -> u64 {
        *self.displayed.borrow()
    }

    /// Wait for the displayed balance to change; `None` once the mirror stopped
    pub async fn changed(&mut self) -> Option<u64> {
        self.displayed.changed().await.ok()?;
        Some(*self.displayed.borrow_and_update())
    }

    /// The host came back to the foreground: poll the store right away
    pub fn resume(&self) {
        self.resume.notify_one();
    }

    /// Stop the mirror task
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Display reader that follows the ledger
pub struct BalanceMirror {
    ledger: Ledger,
    store: Arc<dyn StateStore>,
    events: broadcast::Receiver<BalanceChange>,
    poll_interval: Duration,
    read_timeout: Duration,
    resume: Arc<Notify>,
    shutdown: Arc<Notify>,
    displayed: watch::Sender<u64>,
    seen_at: DateTime<Utc>,
}

impl BalanceMirror {
    /// Create a mirror seeded with the ledger's current balance
    ///
    /// # Returns
    ///
    /// * `(BalanceMirror, MirrorHandle)` - Spawn `run` on the mirror; keep the handle
    pub async fn new(
        ledger: Ledger,
        store: Arc<dyn StateStore>,
        poll_interval: Duration,
        read_timeout: Duration,
    ) -> (Self, MirrorHandle) {
        // Subscribe before reading the snapshot so no change falls in between.
        let events = ledger.subscribe();
        let snapshot = ledger.snapshot().await;
        let (displayed, receiver) = watch::channel(snapshot.balance);
        let resume = Arc::new(Notify::new());
        let shutdown = Arc::new(Notify::new());

        let mirror = Self {
            ledger,
            store,
            events,
            poll_interval,
            read_timeout,
            resume: resume.clone(),
            shutdown: shutdown.clone(),
            displayed,
            seen_at: snapshot.written_at,
        };
        let handle = MirrorHandle {
            displayed: receiver,
            resume,
            shutdown,
        };

        (mirror, handle)
    }

    pub async fn run(mut self) {
        log::debug!("Balance mirror starting, polling every {:?}", self.poll_interval);

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let resume = self.resume.clone();
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Ok(change) => self.show(change.balance, change.at),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!("Balance mirror lagged by {} changes, polling", skipped);
                        self.poll().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                _ = ticker.tick() => self.poll().await,

                _ = resume.notified() => self.poll().await,

                _ = shutdown.notified() => break,
            }
        }

        log::debug!("Balance mirror stopped");
    }

    fn show(&mut self, balance: u64, at: DateTime<Utc>) {
        if at < self.seen_at {
            return;
        }
        self.seen_at = at;
        self.displayed.send_if_modified(|shown| {
            let changed = *shown != balance;
            *shown = balance;
            changed
        });
    }

    async fn poll(&mut self) {
        let stored = match with_timeout(self.read_timeout, self.store.load(StateKey::Balance)).await
        {
            Ok(Some(stored)) => stored,
            Ok(None) => return,
            Err(e) => {
                log::warn!("Balance mirror could not read the store: {}", e);
                return;
            }
        };

        let persisted = match stored.value.trim().parse::<u64>() {
            Ok(value) => value,
            Err(e) => {
                log::warn!(
                    "Balance mirror ignoring corrupted persisted balance {:?}: {}",
                    stored.value,
                    e
                );
                return;
            }
        };

        let shown = *self.displayed.borrow();
        if reconcile_decision(shown, self.seen_at, persisted, stored.written_at)
            == ReconcileDecision::Adopt
        {
            self.show(persisted, stored.written_at);
        }

        self.ledger.reconcile(persisted, stored.written_at).await;
    }
}
