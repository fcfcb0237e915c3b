//! Two-latch suspend coordination with tree propagation.
//!
//! Every guarded object (voice, channel, session) owns a `SuspendNode`. A node
//! combines a system-driven *interrupt* latch and an application-driven
//! *manual* latch; its slave is told to suspend while either is set.
//!
//! Nodes form a tree: a node forwards latch changes to its registered
//! listeners. Manual suspension nests: when a node is manually suspended it
//! remembers which listeners were already manually suspended on their own,
//! and on resume only wakes the listeners it put to sleep itself.
//!
//! Listeners are held weakly, so a node never keeps a dependent alive.
//! A node must not be registered (directly or transitively) under itself.

use std::sync::{Arc, Mutex, Weak};

use crate::sync::lock;

/// Callback receiving the new effective state (`true` = suspended).
pub type SuspendSlave = Box<dyn Fn(bool) + Send + Sync>;

struct Listener {
    node: Weak<SuspendNode>,
    /// Listener's own manual latch, recorded when this node's manual latch
    /// was set. `None` while this node is not manually suspended.
    saved_manual: Option<bool>,
}

#[derive(Default)]
struct NodeState {
    interrupt_lock: bool,
    manual_lock: bool,
    listeners: Vec<Listener>,
}

impl NodeState {
    fn suspended(&self) -> bool {
        self.interrupt_lock || self.manual_lock
    }

    fn position(&self, child: &Arc<SuspendNode>) -> Option<usize> {
        self.listeners
            .iter()
            .position(|l| std::ptr::eq(l.node.as_ptr(), Arc::as_ptr(child)))
    }
}

/// Latches a listener inherited from the node it was registered under.
struct Inherited {
    interrupted: bool,
    manual: bool,
}

pub struct SuspendNode {
    label: String,
    slave: Option<SuspendSlave>,
    /// Serialises latch updates with their slave notification and the
    /// propagation to listeners, so both see transitions in the order they
    /// happened. Taken parent before child; the tree is acyclic.
    notify: Mutex<()>,
    state: Mutex<NodeState>,
}

impl SuspendNode {
    /// Create a node driving `slave`.
    pub fn new(label: impl Into<String>, slave: impl Fn(bool) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            slave: Some(Box::new(slave)),
            notify: Mutex::new(()),
            state: Mutex::new(NodeState::default()),
        })
    }

    /// Create a node with no slave, used purely to fan state out to listeners.
    pub fn detached(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            slave: None,
            notify: Mutex::new(()),
            state: Mutex::new(NodeState::default()),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_suspended(&self) -> bool {
        lock(&self.state).suspended()
    }

    pub fn is_interrupted(&self) -> bool {
        lock(&self.state).interrupt_lock
    }

    pub fn is_manually_suspended(&self) -> bool {
        lock(&self.state).manual_lock
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.state)
            .listeners
            .iter()
            .filter(|l| l.node.strong_count() > 0)
            .count()
    }

    pub fn has_listener(&self, child: &Arc<SuspendNode>) -> bool {
        lock(&self.state).position(child).is_some()
    }

    /// Whether `child`'s manual latch was already set on its own when this
    /// node was manually suspended. `None` if this node is not manually
    /// suspended or `child` is not a listener.
    pub(crate) fn saved_manual(&self, child: &Arc<SuspendNode>) -> Option<bool> {
        let state = lock(&self.state);
        state
            .position(child)
            .and_then(|pos| state.listeners[pos].saved_manual)
    }

    /// Set or clear the interrupt latch.
    ///
    /// Any change of the latch is forwarded to every listener after this
    /// node's own slave has been notified.
    pub fn set_interrupted(&self, value: bool) {
        // Held through propagation so concurrent changes reach the
        // listeners in the order they hit this node.
        let _notify = lock(&self.notify);
        let flipped = {
            let mut state = lock(&self.state);
            if state.interrupt_lock == value {
                return;
            }
            let was = state.suspended();
            state.interrupt_lock = value;
            was != state.suspended()
        };
        if flipped {
            self.notify_slave(value);
        }
        for child in self.live_listeners() {
            child.set_interrupted(value);
        }
    }

    /// Set or clear the manual suspend latch.
    ///
    /// Setting snapshots every listener's manual latch, then suspends them all.
    /// Clearing only resumes listeners whose snapshot was clear.
    pub fn set_manually_suspended(&self, value: bool) {
        let _notify = lock(&self.notify);
        let targets = {
            let (flipped, targets) = {
                let mut state = lock(&self.state);
                if state.manual_lock == value {
                    return;
                }
                let was = state.suspended();
                state.listeners.retain(|l| l.node.strong_count() > 0);
                let mut targets = Vec::with_capacity(state.listeners.len());
                if value {
                    for listener in state.listeners.iter_mut() {
                        if let Some(node) = listener.node.upgrade() {
                            listener.saved_manual = Some(node.is_manually_suspended());
                            targets.push(node);
                        }
                    }
                } else {
                    for listener in state.listeners.iter_mut() {
                        if listener.saved_manual.take() == Some(false) {
                            if let Some(node) = listener.node.upgrade() {
                                targets.push(node);
                            }
                        }
                    }
                }
                state.manual_lock = value;
                (was != state.suspended(), targets)
            };
            if flipped {
                self.notify_slave(value);
            }
            targets
        };
        for child in targets {
            child.set_manually_suspended(value);
        }
    }

    /// Register a listener. A listener joining a suspended node is suspended
    /// immediately.
    pub fn add_listener(&self, child: &Arc<SuspendNode>) {
        if std::ptr::eq(self, Arc::as_ptr(child)) {
            log::warn!(target: "suspend", "{}: refusing to listen to itself", self.label);
            return;
        }
        let (interrupted, manual) = {
            let mut state = lock(&self.state);
            if state.position(child).is_some() {
                return;
            }
            let saved_manual = state.manual_lock.then(|| child.is_manually_suspended());
            state.listeners.push(Listener {
                node: Arc::downgrade(child),
                saved_manual,
            });
            (state.interrupt_lock, state.manual_lock)
        };
        if interrupted {
            child.set_interrupted(true);
        }
        if manual {
            child.set_manually_suspended(true);
        }
    }

    /// Deregister a listener. The listener's own latches are left untouched.
    pub fn remove_listener(&self, child: &Arc<SuspendNode>) {
        self.take_listener(child);
    }

    /// Deregister a listener and clear whatever latches it only holds because
    /// of this node.
    pub fn release_listener(&self, child: &Arc<SuspendNode>) {
        if let Some(inherited) = self.take_listener(child) {
            if inherited.interrupted {
                child.set_interrupted(false);
            }
            if inherited.manual {
                child.set_manually_suspended(false);
            }
        }
    }

    /// Re-register a listener under `to`, carrying over the latches it
    /// inherited from this node so that it ends up in `to`'s state.
    pub fn move_listener(&self, child: &Arc<SuspendNode>, to: &Arc<SuspendNode>) {
        if std::ptr::eq(self, Arc::as_ptr(to)) {
            return;
        }
        let Some(inherited) = self.take_listener(child) else {
            to.add_listener(child);
            return;
        };
        let (to_interrupted, to_manual) = {
            let mut state = lock(&to.state);
            if state.position(child).is_none() {
                let saved_manual = state
                    .manual_lock
                    .then(|| !inherited.manual && child.is_manually_suspended());
                state.listeners.push(Listener {
                    node: Arc::downgrade(child),
                    saved_manual,
                });
            }
            (state.interrupt_lock, state.manual_lock)
        };
        if to_interrupted {
            child.set_interrupted(true);
        } else if inherited.interrupted {
            child.set_interrupted(false);
        }
        if to_manual {
            child.set_manually_suspended(true);
        } else if inherited.manual {
            child.set_manually_suspended(false);
        }
    }

    fn take_listener(&self, child: &Arc<SuspendNode>) -> Option<Inherited> {
        let mut state = lock(&self.state);
        let pos = state.position(child)?;
        let listener = state.listeners.remove(pos);
        Some(Inherited {
            interrupted: state.interrupt_lock,
            manual: state.manual_lock && listener.saved_manual == Some(false),
        })
    }

    fn live_listeners(&self) -> Vec<Arc<SuspendNode>> {
        let mut state = lock(&self.state);
        state.listeners.retain(|l| l.node.strong_count() > 0);
        state.listeners.iter().filter_map(|l| l.node.upgrade()).collect()
    }

    fn notify_slave(&self, suspended: bool) {
        log::debug!(
            target: "suspend",
            "{}: {}",
            self.label,
            if suspended { "suspended" } else { "resumed" }
        );
        if let Some(slave) = &self.slave {
            slave(suspended);
        }
    }
}

impl std::fmt::Debug for SuspendNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("SuspendNode")
            .field("label", &self.label)
            .field("interrupted", &state.interrupt_lock)
            .field("manually_suspended", &state.manual_lock)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}
