//! Events drained in phase 4, and the optional per-phase trace.

use std::collections::VecDeque;

use crate::domain::{Fill, Order, OrderId, OrderOrigin, Signal};

#[derive(Debug, Clone)]
pub enum Event {
    Signal(Signal),
    Order(Order),
    Fill(Fill),
}

/// FIFO queue that must be empty before the bar cursor advances.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
    processed: usize,
}

impl EventQueue {
    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        let event = self.events.pop_front();
        if event.is_some() {
            self.processed += 1;
        }
        event
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn processed(&self) -> usize {
        self.processed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    PendingResolution = 1,
    ProtectiveCheck = 2,
    StrategyEvaluation = 3,
    Drain = 4,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceKind {
    Filled { order: OrderId, origin: OrderOrigin, price: f64 },
    ProtectiveOrder { order: OrderId, origin: OrderOrigin },
    SignalEmitted,
    SignalIgnored,
    OrderDeferred { order: OrderId },
    OrderDropped { order: OrderId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub bar_index: usize,
    pub phase: Phase,
    pub kind: TraceKind,
}
