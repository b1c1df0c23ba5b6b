use transport::EventKind;

use crate::backend::CallId;

/// Which calls and events halt the traced program
///
/// Sized once from the function count; ids outside that range never break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointTable {
    calls: Vec<bool>,
    events: [bool; EventKind::COUNT],
}

impl BreakpointTable {
    pub fn new(function_count: usize) -> Self {
        Self {
            calls: vec![false; function_count],
            events: [true; EventKind::COUNT],
        }
    }

    pub fn set_call(&mut self, id: CallId, enabled: bool) {
        if let Some(slot) = self.calls.get_mut(id) {
            *slot = enabled;
        } else {
            tracing::warn!(id, "breakpoint for call id outside the function table");
        }
    }

    pub fn breaks_on(&self, id: CallId) -> bool {
        self.calls.get(id).copied().unwrap_or(false)
    }

    pub fn set_event(&mut self, event: EventKind, enabled: bool) {
        self.events[event.index()] = enabled;
    }

    pub fn breaks_on_event(&self, event: EventKind) -> bool {
        self.events[event.index()]
    }

    pub fn enabled_events(&self) -> impl Iterator<Item = EventKind> + '_ {
        EventKind::ALL
            .into_iter()
            .filter(|event| self.breaks_on_event(*event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_events_only() {
        let table = BreakpointTable::new(4);
        assert!((0..4).all(|id| !table.breaks_on(id)));
        assert_eq!(table.enabled_events().count(), EventKind::COUNT);
    }

    #[test]
    fn set_is_idempotent() {
        let mut once = BreakpointTable::new(8);
        once.set_call(3, true);
        let mut twice = once.clone();
        twice.set_call(3, true);
        assert_eq!(once, twice);

        once.set_event(EventKind::LinkError, false);
        twice.set_event(EventKind::LinkError, false);
        twice.set_event(EventKind::LinkError, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn clear_and_out_of_range() {
        let mut table = BreakpointTable::new(2);
        table.set_call(1, true);
        table.set_call(1, false);
        assert!(!table.breaks_on(1));

        table.set_call(99, true);
        assert!(!table.breaks_on(99));
    }
}
