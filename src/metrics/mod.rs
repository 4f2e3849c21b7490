//! Metrics and observability infrastructure for sluice.
//!
//! This module groups all observability-related components:
//! - `events`: Internal event types and the `InternalEvent` trait
//! - `monitor`: Run-scoped logging facade and counters
//! - `server`: Prometheus HTTP server and initialization

pub mod events;
pub mod monitor;
pub mod server;

pub use monitor::{Monitor, MonitorSnapshot};
pub use server::init;

/// Emit an internal event.
///
/// This macro calls the `InternalEvent::emit()` method on the given event,
/// which records the corresponding Prometheus metric.
///
/// # Example
///
/// ```ignore
/// use sluice::metrics::events::RecordsDispatched;
///
/// emit!(RecordsDispatched { count: 1 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
