//! TradeLab Live: the async signal service.
//!
//! - Config sources polled for the desired strategy set
//! - Live feeds with warm-up and bounded bar streams
//! - One cooperative task per strategy instance, with a rolling buffer,
//!   a no-bar watchdog and cancellation at the await point
//! - Isolated concurrent fan-out of signals to handlers
//! - The reconciliation loop that starts, cancels and restarts tasks

pub mod buffer;
pub mod cancel;
pub mod config;
pub mod config_source;
pub mod error;
pub mod feed;
pub mod handler;
pub mod orchestrator;
pub mod task;

pub use buffer::RollingBuffer;
pub use cancel::CancellationToken;
pub use config::{LiveConfig, OrchestratorSettings};
pub use config_source::{ConfigSource, StaticConfigSource, TomlConfigSource};
pub use error::{FeedError, HandlerError, LiveError, SourceError, TaskExit};
pub use feed::{BarStream, ChannelFeed, LiveFeed, ReplayFeed};
pub use handler::{dispatch, ConsoleHandler, DispatchReport, JsonlSignalSink, SignalHandler};
pub use orchestrator::{plan_reconciliation, Orchestrator, ReconcilePlan, ReconcileReport, ShutdownReport};
pub use task::{parse_interval, StrategyTask, TaskSettings, TaskState, TaskStats, TaskStatus};
