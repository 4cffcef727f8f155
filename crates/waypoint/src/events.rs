//! Lifecycle events and hook dispatch.
//!
//! Every event is delivered to the engine-wide listeners in registration order and then
//! to the per-call callback. Each hook answers with a [`Flow`]; a single `Cancel` makes
//! the aggregate `Cancel`, but the remaining hooks still run. Only `start` and
//! `history` act on cancellation.

use std::rc::Rc;

use crate::error::NavigationError;
use crate::history::{Direction, HistoryStateRecord};
use crate::navigator::NavigationRequest;
use crate::response::ResponseEnvelope;

/// Answer of a hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flow {
    #[default]
    Proceed,
    Cancel,
}

/// How a navigation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error(NavigationError),
    Timeout,
    /// Superseded by a newer navigation or cancelled by a `start` hook.
    Cancelled,
    /// History manipulation is unavailable and the browser performed a full load.
    FullPageLoad,
}

/// Hook signature shared by listeners and per-call callbacks.
pub type Hook = Rc<dyn Fn(&NavigationEvent<'_>) -> Flow>;

/// Box a closure as a [`Hook`].
#[inline]
pub fn hook(callback: impl Fn(&NavigationEvent<'_>) -> Flow + 'static) -> Hook {
    Rc::new(callback)
}

/// Discriminant used to subscribe to one kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Success,
    Error,
    Timeout,
    End,
    History,
}

#[derive(Debug)]
pub enum NavigationEvent<'event> {
    /// Fired before the request is sent.
    Start { request: &'event NavigationRequest },
    /// Fired after content, history and assets have been updated.
    Success {
        request: &'event NavigationRequest,
        response: &'event ResponseEnvelope,
    },
    Error {
        request: &'event NavigationRequest,
        error: &'event NavigationError,
    },
    Timeout { request: &'event NavigationRequest },
    /// Fired exactly once for every navigation that got past argument validation.
    End {
        request: &'event NavigationRequest,
        outcome: &'event Outcome,
    },
    /// Fired on the target container before a back/forward transition is served.
    History {
        direction: Direction,
        target: &'event str,
        record: &'event HistoryStateRecord,
    },
}

impl NavigationEvent<'_> {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Start { .. } => EventKind::Start,
            Self::Success { .. } => EventKind::Success,
            Self::Error { .. } => EventKind::Error,
            Self::Timeout { .. } => EventKind::Timeout,
            Self::End { .. } => EventKind::End,
            Self::History { .. } => EventKind::History,
        }
    }

    /// The navigation this event belongs to, if any.
    pub const fn request(&self) -> Option<&NavigationRequest> {
        match self {
            Self::Start { request }
            | Self::Success { request, .. }
            | Self::Error { request, .. }
            | Self::Timeout { request }
            | Self::End { request, .. } => Some(*request),
            Self::History { .. } => None,
        }
    }
}

/// Engine-wide listeners.
#[derive(Default)]
pub(crate) struct Listeners {
    hooks: Vec<(EventKind, Hook)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, kind: EventKind, hook: Hook) {
        self.hooks.push((kind, hook));
    }

    /// Hooks subscribed to `kind`, cloned out so the caller can release its borrow
    /// before invoking them.
    pub(crate) fn matching(&self, kind: EventKind) -> Vec<Hook> {
        self.hooks
            .iter()
            .filter(|(subscribed, _)| *subscribed == kind)
            .map(|(_, hook)| Rc::clone(hook))
            .collect()
    }
}

/// Invoke `hooks` then `callback`, aggregating their answers.
pub(crate) fn dispatch(
    hooks: Vec<Hook>,
    callback: Option<&Hook>,
    event: &NavigationEvent<'_>,
) -> Flow {
    let mut flow = Flow::Proceed;
    for listener in hooks.iter().chain(callback) {
        if listener(event) == Flow::Cancel {
            flow = Flow::Cancel;
        }
    }
    flow
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;

    #[test]
    fn cancel_is_sticky_but_all_hooks_run() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = Listeners::default();
        for (index, flow) in [Flow::Proceed, Flow::Cancel, Flow::Proceed].into_iter().enumerate() {
            let seen = Rc::clone(&seen);
            listeners.add(
                EventKind::Timeout,
                hook(move |_event| {
                    seen.borrow_mut().push(index);
                    flow
                }),
            );
        }
        listeners.add(EventKind::End, hook(|_event| Flow::Cancel));

        let request = NavigationRequest::for_test("/x");
        let flow = dispatch(
            listeners.matching(EventKind::Timeout),
            None,
            &NavigationEvent::Timeout { request: &request },
        );
        assert_eq!(flow, Flow::Cancel);
        assert_eq!(*seen.borrow(), [0, 1, 2]);
    }
}
