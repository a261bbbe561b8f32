//! [`OutputRegistry`] – ordered handler collection and snapshot fan-out.
//!
//! Each registered handler is an independent failure domain: a handler that
//! fails to connect, or refuses a snapshot, is reported in the returned
//! [`FanoutReport`] while every other handler is still initialised and still
//! receives the snapshot.

use retarget_types::{OutputError, PoseSnapshot};
use tracing::{debug, error};

use crate::handler::OutputHandler;

/// Result of one handler's part in a fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutcome {
    pub handler: String,
    pub result: Result<(), OutputError>,
}

/// Per-handler results of [`OutputRegistry::init_all`] or
/// [`OutputRegistry::dispatch`], in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanoutReport {
    pub outcomes: Vec<HandlerOutcome>,
}

impl FanoutReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// `(handler, error)` pairs for every failed handler.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &OutputError)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(()) => None,
            Err(e) => Some((o.handler.as_str(), e)),
        })
    }

    /// `true` when every handler succeeded (vacuously true when empty).
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Composition root for output handlers.
///
/// Construct with [`OutputRegistry::new`], [`register`][Self::register] the
/// handlers, call [`init_all`][Self::init_all] once, then
/// [`dispatch`][Self::dispatch] every control cycle.
#[derive(Default)]
pub struct OutputRegistry {
    handlers: Vec<Box<dyn OutputHandler>>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler.  Dispatch order follows registration order.
    pub fn register(&mut self, handler: Box<dyn OutputHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handlers(&self) -> impl Iterator<Item = &dyn OutputHandler> {
        self.handlers.iter().map(|h| &**h)
    }

    /// Initialise every handler.  Blocks for as long as the slowest
    /// handler's connect.
    pub fn init_all(&mut self) -> FanoutReport {
        let report = self.fan_out(|handler| handler.init());
        for (handler, e) in report.failures() {
            error!(handler = %handler, error = %e, "Output handler failed to initialise");
        }
        report
    }

    /// Forward `snapshot` to every handler.  Handlers that are not `Ready`
    /// report [`OutputError::NotInitialized`] and send nothing.
    pub fn dispatch(&mut self, snapshot: &PoseSnapshot) -> FanoutReport {
        let report = self.fan_out(|handler| handler.set_output(snapshot));
        // Handlers already log their own failures; this runs at control rate.
        for (handler, e) in report.failures() {
            debug!(handler = %handler, error = %e, "Snapshot not delivered");
        }
        report
    }

    fn fan_out<F>(&mut self, mut op: F) -> FanoutReport
    where
        F: FnMut(&mut dyn OutputHandler) -> Result<(), OutputError>,
    {
        let outcomes = self
            .handlers
            .iter_mut()
            .map(|handler| HandlerOutcome {
                handler: handler.name().to_string(),
                result: op(&mut **handler),
            })
            .collect();
        FanoutReport { outcomes }
    }
}
