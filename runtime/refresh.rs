/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Background metadata refresh.
//!
//! The render loop never reloads anything itself. It either lets the
//! periodic worker tick or queues a [`RefreshCommand`]; both end up running
//! the blocking reload on tokio's blocking pool. The shared
//! [`CancellationToken`] stops the workers and, when the fetcher was built
//! with the same token, any fetch still walking its pages.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::metadata::{MetadataKind, MetadataStore};

/// Queued refresh requests beyond this are dropped; a reload is already due.
const COMMAND_CHANNEL_CAPACITY: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshCommand {
    ReloadAll,
    Reload(MetadataKind),
}

pub struct RefreshSupervisor {
    store: Arc<MetadataStore>,
    command_tx: mpsc::Sender<RefreshCommand>,
    /// Taken by the command worker when it is spawned.
    command_rx: Option<mpsc::Receiver<RefreshCommand>>,
    cancel: CancellationToken,
    workers: JoinSet<()>,
}

impl RefreshSupervisor {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self::with_cancellation(store, CancellationToken::new())
    }

    /// Shares `cancel` with the caller, typically the token the fetcher was
    /// built with, so shutdown also interrupts in-flight pagination.
    pub fn with_cancellation(store: Arc<MetadataStore>, cancel: CancellationToken) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        Self {
            store,
            command_tx,
            command_rx: Some(command_rx),
            cancel,
            workers: JoinSet::new(),
        }
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn command_sender(&self) -> mpsc::Sender<RefreshCommand> {
        self.command_tx.clone()
    }

    /// Queues `command` without waiting. Returns false when the queue is
    /// full or the command worker is gone.
    pub fn request(&self, command: RefreshCommand) -> bool {
        match self.command_tx.try_send(command) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("refresh: {command:?} dropped ({e})");
                false
            }
        }
    }

    /// Reloads every kind now and then every `interval`.
    pub fn spawn_periodic_refresh(&mut self, interval: Duration) {
        let cancel = self.cancel.clone();
        let store = self.store.clone();
        self.workers.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::debug!("refresh: periodic worker cancelled");
                        break;
                    }
                    _ = ticker.tick() => {}
                }
                run_command(&store, RefreshCommand::ReloadAll).await;
            }
        });
        log::debug!("refresh: periodic worker spawned ({interval:?})");
    }

    /// Serves queued [`RefreshCommand`]s one at a time. Only one command
    /// worker can exist per supervisor.
    pub fn spawn_command_worker(&mut self) {
        let Some(mut command_rx) = self.command_rx.take() else {
            log::warn!("refresh: command worker already running");
            return;
        };
        let cancel = self.cancel.clone();
        let store = self.store.clone();
        self.workers.spawn(async move {
            loop {
                let command = tokio::select! {
                    _ = cancel.cancelled() => {
                        log::debug!("refresh: command worker cancelled");
                        break;
                    }
                    command = command_rx.recv() => match command {
                        Some(command) => command,
                        None => break,
                    },
                };
                run_command(&store, command).await;
            }
        });
        log::debug!("refresh: command worker spawned");
    }

    /// Cancels every worker and waits for all of them to finish.
    pub async fn shutdown(&mut self) {
        log::debug!("refresh: shutdown requested, cancelling {} workers", self.workers.len());
        self.cancel.cancel();
        while self.workers.join_next().await.is_some() {}
        log::debug!("refresh: all workers joined");
    }

    #[cfg(test)]
    pub(crate) fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

async fn run_command(store: &Arc<MetadataStore>, command: RefreshCommand) {
    let store = store.clone();
    let reloaded = tokio::task::spawn_blocking(move || match command {
        RefreshCommand::ReloadAll => store.reload_all(),
        RefreshCommand::Reload(kind) => vec![(kind, store.reload(kind))],
    })
    .await;
    match reloaded {
        Ok(outcomes) => {
            for (kind, outcome) in outcomes {
                log::debug!("refresh: {kind} -> {outcome:?}");
            }
        }
        Err(e) => log::warn!("refresh: reload task failed ({e})"),
    }
}
