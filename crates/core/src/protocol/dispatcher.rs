use std::collections::HashMap;

/// Named-listener registry for socket events.
///
/// Both ends of the connection route by event name: the relay maps
/// submission channels to detector kinds, the client maps result channels
/// to its handlers. Once [`remove_all`](Self::remove_all) has run the
/// dispatcher is closed and accepts no new listeners, so nothing can be
/// dispatched for a torn-down session.
#[derive(Debug)]
pub struct EventDispatcher<H> {
    listeners: HashMap<String, Vec<H>>,
    closed: bool,
}

impl<H> Default for EventDispatcher<H> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
            closed: false,
        }
    }
}

impl<H> EventDispatcher<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`. Returns `false` once closed.
    pub fn on(&mut self, event: &str, handler: H) -> bool {
        if self.closed {
            return false;
        }
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push(handler);
        true
    }

    /// Removes every listener for `event`, returning how many were removed.
    pub fn off(&mut self, event: &str) -> usize {
        self.listeners.remove(event).map_or(0, |v| v.len())
    }

    /// Removes all listeners and closes the dispatcher.
    pub fn remove_all(&mut self) {
        self.listeners.clear();
        self.closed = true;
    }

    pub fn listeners(&self, event: &str) -> &[H] {
        self.listeners.get(event).map_or(&[], Vec::as_slice)
    }

    pub fn has_listener(&self, event: &str) -> bool {
        !self.listeners(event).is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }
}
