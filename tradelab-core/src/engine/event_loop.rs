use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::{Bar, Order, Portfolio};
use crate::strategy::ConfiguredStrategy;

use super::accounting::EquityTracker;
use super::event::{Event, EventQueue, Phase, TraceEntry, TraceKind};
use super::execution::ExecutionHandler;
use super::portfolio_update::{apply_fill, end_of_data_order, order_for_signal, protective_order, SignalOutcome};
use super::state::{BacktestResult, EngineConfig, IdGen, RunStats};

/// One engine run: a strategy, an execution handler and a fresh portfolio.
///
/// Owns all mutable state for the run; nothing here is shared with other runs.
pub struct BacktestEngine<'a> {
    config: &'a EngineConfig,
    strategy: &'a ConfiguredStrategy,
    execution: &'a dyn ExecutionHandler,
    portfolio: Portfolio,
    /// Orders waiting for the next bar.
    pending: Vec<Order>,
    queue: EventQueue,
    equity: EquityTracker,
    ids: IdGen,
    stats: RunStats,
    trace: Option<Vec<TraceEntry>>,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(
        config: &'a EngineConfig,
        strategy: &'a ConfiguredStrategy,
        execution: &'a dyn ExecutionHandler,
    ) -> Self {
        Self {
            config,
            strategy,
            execution,
            portfolio: Portfolio::new(config.initial_capital),
            pending: Vec::new(),
            queue: EventQueue::default(),
            equity: EquityTracker::new(config.initial_capital),
            ids: IdGen::default(),
            stats: RunStats::default(),
            trace: None,
        }
    }

    /// Record a per-phase trace in the result.
    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Vec::new());
        self
    }

    /// Run over `bars`, which must already carry the strategy's indicator columns.
    pub fn run(mut self, bars: &[Bar]) -> BacktestResult {
        self.equity = EquityTracker::with_capacity(self.config.initial_capital, bars.len());

        for t in 0..bars.len() {
            let bar = &bars[t];
            self.stats.bars += 1;

            // ─── Phase 1: Pending-order resolution ───
            // Orders deferred on the previous bar fill against this bar.
            for order in std::mem::take(&mut self.pending) {
                self.execute(order, bar, t, Phase::PendingResolution);
            }

            // ─── Phase 2: Protective-exit check ───
            // Breaches become orders on the queue, not fills.
            let mut exits = Vec::new();
            for position in self.portfolio.positions.values() {
                if self.portfolio.has_pending(&position.instrument) {
                    continue;
                }
                if let Some(order) = protective_order(position, bar, t, &mut self.ids) {
                    exits.push(order);
                }
            }
            for order in exits {
                self.portfolio.pending.insert(order.instrument.clone());
                self.record(t, Phase::ProtectiveCheck, TraceKind::ProtectiveOrder {
                    order: order.id,
                    origin: order.origin,
                });
                self.stats.orders += 1;
                self.queue.push(Event::Order(order));
            }

            // ─── Phase 3: Strategy evaluation ───
            if let Some(mut signal) = self.strategy.evaluate(&bars[..=t]) {
                signal.id = self.ids.next_signal();
                self.stats.signals += 1;
                self.record(t, Phase::StrategyEvaluation, TraceKind::SignalEmitted);
                self.queue.push(Event::Signal(signal));
            }

            // ─── Phase 4: Event-queue drain ───
            self.drain(bar, t);

            let mut prices = HashMap::with_capacity(1);
            prices.insert(bar.symbol.clone(), bar.close);
            self.equity.record(bar.timestamp, self.portfolio.equity(&prices));
            debug!(bar = t, close = bar.close, equity = self.equity.last(), "bar processed");
        }

        self.finish(bars)
    }

    fn drain(&mut self, bar: &Bar, t: usize) {
        while let Some(event) = self.queue.pop() {
            match event {
                Event::Signal(signal) => {
                    match order_for_signal(
                        &mut self.portfolio,
                        &signal,
                        bar,
                        t,
                        self.strategy.risk(),
                        self.config,
                        &mut self.ids,
                    ) {
                        SignalOutcome::Order(order) => {
                            self.stats.orders += 1;
                            self.queue.push(Event::Order(order));
                        }
                        SignalOutcome::Ignored(reason) => {
                            if reason.is_rejected_entry() {
                                self.stats.rejected_entries += 1;
                            } else {
                                self.stats.ignored_signals += 1;
                            }
                            debug!(
                                instrument = %signal.instrument,
                                direction = ?signal.direction,
                                ?reason,
                                "signal ignored"
                            );
                            self.record(t, Phase::Drain, TraceKind::SignalIgnored);
                        }
                    }
                }
                Event::Order(order) => {
                    if self.execution.defers(&order) {
                        self.record(t, Phase::Drain, TraceKind::OrderDeferred { order: order.id });
                        self.pending.push(order);
                    } else {
                        self.execute(order, bar, t, Phase::Drain);
                    }
                }
                Event::Fill(fill) => {
                    if fill.origin.is_protective() {
                        self.stats.protective_exits += 1;
                    }
                    apply_fill(&mut self.portfolio, &fill, t);
                }
            }
        }
    }

    /// Fill `order` against `bar`. Phase-1 fills apply immediately; drain
    /// fills go back on the queue.
    fn execute(&mut self, order: Order, bar: &Bar, t: usize, phase: Phase) {
        let fill_id = self.ids.next_fill();
        match self.execution.execute(&order, bar, fill_id) {
            Ok(fill) => {
                self.stats.fills += 1;
                self.record(t, phase, TraceKind::Filled {
                    order: order.id,
                    origin: order.origin,
                    price: fill.price,
                });
                if phase == Phase::Drain {
                    self.queue.push(Event::Fill(fill));
                } else {
                    if fill.origin.is_protective() {
                        self.stats.protective_exits += 1;
                    }
                    apply_fill(&mut self.portfolio, &fill, t);
                }
            }
            Err(err) => {
                warn!(
                    instrument = %order.instrument,
                    order = %order.id,
                    error = %err,
                    "order dropped"
                );
                self.stats.dropped_orders += 1;
                self.portfolio.pending.remove(&order.instrument);
                self.record(t, phase, TraceKind::OrderDropped { order: order.id });
            }
        }
    }

    fn finish(mut self, bars: &[Bar]) -> BacktestResult {
        for order in self.pending.drain(..) {
            debug!(order = %order.id, instrument = %order.instrument, "pending order cancelled at end of data");
            self.portfolio.pending.remove(&order.instrument);
            self.stats.cancelled_orders += 1;
        }

        if self.config.close_at_end {
            if let Some(last) = bars.last() {
                let t = bars.len() - 1;
                let closing: Vec<Order> = self
                    .portfolio
                    .positions
                    .values()
                    .map(|p| end_of_data_order(p, last, t, &mut self.ids))
                    .collect();
                for order in closing {
                    self.stats.orders += 1;
                    self.portfolio.pending.insert(order.instrument.clone());
                    self.execute(order, last, t, Phase::Drain);
                }
                self.drain(last, t);
            }
        }

        let mut prices = HashMap::new();
        if let Some(last) = bars.last() {
            prices.insert(last.symbol.clone(), last.close);
        }
        let ending_equity = self.portfolio.equity(&prices);

        BacktestResult {
            instrument: self.strategy.instrument().to_string(),
            strategy_id: self.strategy.config().strategy_id.clone(),
            trades: self.portfolio.trades.clone(),
            ending_capital: self.portfolio.cash,
            ending_equity,
            initial_capital: self.config.initial_capital,
            first_timestamp: bars.first().map(|b| b.timestamp),
            last_timestamp: bars.last().map(|b| b.timestamp),
            equity_curve: self.equity.into_points(),
            portfolio: self.portfolio,
            stats: self.stats,
            trace: self.trace.unwrap_or_default(),
        }
    }

    fn record(&mut self, bar_index: usize, phase: Phase, kind: TraceKind) {
        if let Some(trace) = self.trace.as_mut() {
            trace.push(TraceEntry { bar_index, phase, kind });
        }
    }
}
