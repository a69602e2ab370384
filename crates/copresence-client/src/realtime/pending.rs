//! Deferred sends held while disconnected.

/// At most one pending frame per event name. A newer frame for the same
/// event replaces the older one and moves to the back, so flushing keeps
/// the order of the latest emissions.
#[derive(Debug, Default)]
pub(crate) struct PendingSends {
    slots: Vec<(String, String)>,
}

impl PendingSends {
    pub(crate) fn put(&mut self, event: &str, frame: String) {
        self.slots.retain(|(name, _)| name != event);
        self.slots.push((event.to_string(), frame));
    }

    pub(crate) fn discard(&mut self, event: &str) {
        self.slots.retain(|(name, _)| name != event);
    }

    pub(crate) fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.slots)
            .into_iter()
            .map(|(_, frame)| frame)
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
