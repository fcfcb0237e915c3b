//! Platform interruption feed.
//!
//! Whatever listens for the platform's audio-session notifications sends
//! `InterruptEvent`s through an `InterruptSender`; a feed thread applies them
//! to the session's root suspend node.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cantor_audio::SuspendNode;
use crossbeam_channel::{select, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptEvent {
    Began,
    Ended,
}

/// Cloneable handle for delivering interruption events.
#[derive(Debug, Clone)]
pub struct InterruptSender(Sender<InterruptEvent>);

impl InterruptSender {
    /// Queue an event. Returns false once the session is gone.
    pub fn send(&self, event: InterruptEvent) -> bool {
        self.0.send(event).is_ok()
    }

    pub fn began(&self) -> bool {
        self.send(InterruptEvent::Began)
    }

    pub fn ended(&self) -> bool {
        self.send(InterruptEvent::Ended)
    }
}

/// Applies interruption events to a root node, unless handling is off.
pub(crate) struct InterruptHandler {
    root: Arc<SuspendNode>,
    enabled: AtomicBool,
}

impl InterruptHandler {
    pub(crate) fn new(root: Arc<SuspendNode>, enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            root,
            enabled: AtomicBool::new(enabled),
        })
    }

    pub(crate) fn apply(&self, event: InterruptEvent) {
        if !self.is_enabled() {
            log::debug!(target: "interrupt", "ignoring {:?}, handling disabled", event);
            return;
        }
        log::info!(target: "interrupt", "interruption {:?}", event);
        self.root.set_interrupted(event == InterruptEvent::Began);
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Turning handling off lifts any interruption in force.
    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.root.set_interrupted(false);
        }
    }
}

/// The feed thread. Stops and joins on drop, even while senders live on.
pub(crate) struct InterruptFeed {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl InterruptFeed {
    pub(crate) fn spawn(handler: Arc<InterruptHandler>) -> io::Result<(InterruptSender, InterruptFeed)> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("cantor-interrupts".into())
            .spawn(move || feed_loop(handler, event_rx, shutdown_rx))?;
        Ok((
            InterruptSender(event_tx),
            InterruptFeed {
                shutdown: Some(shutdown_tx),
                handle: Some(handle),
            },
        ))
    }
}

fn feed_loop(handler: Arc<InterruptHandler>, events: Receiver<InterruptEvent>, shutdown: Receiver<()>) {
    loop {
        select! {
            recv(events) -> msg => match msg {
                Ok(event) => handler.apply(event),
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }
    log::debug!(target: "interrupt", "feed stopped");
}

impl Drop for InterruptFeed {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn test_feed_applies_events_to_root() {
        let root = SuspendNode::detached("root");
        let handler = InterruptHandler::new(Arc::clone(&root), true);
        let (sender, feed) = InterruptFeed::spawn(handler).unwrap();

        assert!(sender.began());
        assert!(wait_for(|| root.is_interrupted()));
        assert!(sender.ended());
        assert!(wait_for(|| !root.is_interrupted()));
        drop(feed);
        assert!(!sender.began());
    }

    #[test]
    fn test_disabled_handler_ignores_events() {
        let root = SuspendNode::detached("root");
        let handler = InterruptHandler::new(Arc::clone(&root), false);
        handler.apply(InterruptEvent::Began);
        assert!(!root.is_interrupted());
    }

    #[test]
    fn test_disabling_lifts_interruption() {
        let root = SuspendNode::detached("root");
        let handler = InterruptHandler::new(Arc::clone(&root), true);
        handler.apply(InterruptEvent::Began);
        assert!(root.is_suspended());
        handler.set_enabled(false);
        assert!(!root.is_suspended());
        assert!(!handler.is_enabled());
    }
}
