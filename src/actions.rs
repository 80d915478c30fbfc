//! Deferred side effects raised by the matcher, drained once per I/O round.
//!
//! A single-threaded stack: actions are pushed as they're raised during a
//! round of matching, then drained in the same (LIFO) order. A burst of
//! prompt-transition effects within one round collapses to whichever is
//! raised last rather than accumulating stale intermediate ones.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Exit,
    Disable,
    SendCmd,
    SendPwd,
    Toggle,
    Refocus,
    SendLost,
    SendUp,
    SendDown,
    SendPgUp,
    SendPgDown,
}

#[derive(Debug, Default)]
pub struct ActionQueue {
    stack: Vec<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        ActionQueue { stack: Vec::new() }
    }

    pub fn enqueue(&mut self, action: Action) {
        self.stack.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Pop the next action to process, most-recently-enqueued first.
    pub fn drain_next(&mut self) -> Option<Action> {
        self.stack.pop()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_most_recent_first() {
        let mut q = ActionQueue::new();
        q.enqueue(Action::SendCmd);
        q.enqueue(Action::SendPwd);
        assert_eq!(q.drain_next(), Some(Action::SendPwd));
        assert_eq!(q.drain_next(), Some(Action::SendCmd));
        assert_eq!(q.drain_next(), None);
    }

    #[test]
    fn prompt_entry_scenario_enqueues_exactly_one_send_cmd() {
        let mut q = ActionQueue::new();
        q.enqueue(Action::SendCmd);
        assert_eq!(q.len(), 1);
        assert_eq!(q.drain_next(), Some(Action::SendCmd));
        assert!(q.is_empty());
    }
}
