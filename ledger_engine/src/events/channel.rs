//! Simple stateless pub-sub event handler
//!
//! This module provides a small hook system that lets other components subscribe to ledger events and react to them.
//! The event handler is stateless: handlers have no access to the internal state of the engine. All they receive is
//! the event itself. Handlers can be async.
//!
//! Publishing never blocks the publisher on delivery. Events are queued on a bounded channel, and each event is
//! handled on its own task. A handler that fails has to deal with it itself; nothing is reported back.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinSet,
};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped, then waits for in-flight handlers to finish.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Drop our own sender so that the loop ends once the last producer goes away
        drop(self.sender);
        let mut jobs = JoinSet::new();
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            jobs.spawn(async move { (handler)(ev).await });
            // Reap finished jobs so the set does not grow without bound
            while let Some(result) = jobs.try_join_next() {
                if let Err(e) = result {
                    warn!("📬️ An event handler panicked or was cancelled: {e}");
                }
            }
        }
        if !jobs.is_empty() {
            debug!("📬️ Waiting for {} event handler(s) to complete", jobs.len());
        }
        while let Some(result) = jobs.join_next().await {
            if let Err(e) = result {
                warn!("📬️ An event handler panicked or was cancelled: {e}");
            }
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync + 'static> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// The number of events the handler's queue holds before deliveries are deferred.
    pub fn queue_capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Queues the event for the handler. If the queue is full, the event is handed to a background task that waits
    /// for space, so the caller is never held up.
    pub fn publish_event(&self, event: E) {
        match self.sender.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(event)) => {
                debug!("📬️ Event queue is full. Deferring delivery");
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    if let Err(e) = sender.send(event).await {
                        error!("📬️ Failed to send event: {e}");
                    }
                });
            },
            Err(TrySendError::Closed(_)) => error!("📬️ Failed to send event: the handler has shut down"),
        }
    }
}
