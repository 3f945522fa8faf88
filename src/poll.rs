/// Poll loop: sensor read → predictions → remote sync, on a fixed interval.
///
/// Each iteration:
/// 1. Reads one frame from the serial link
/// 2. Builds a feature vector per configured site (date parts, flow, rainfall)
/// 3. Asks the oracle for each site's water level
/// 4. Mirrors frame + levels to the remote store
/// 5. Waits the poll interval
///
/// The loop runs until interrupted. The first failed iteration ends it; the
/// serial channel is released exactly once on the way out either way.

use chrono::Local;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::config::SiteConfig;
use crate::logging::{self, Component};
use crate::model::{FeatureVector, FloodError, Predictions};
use crate::oracle::Predictor;
use crate::serial::FrameSource;
use crate::sync::RecordSink;

// ---------------------------------------------------------------------------
// Interrupt handling
// ---------------------------------------------------------------------------

/// Process-wide stop request, shared between the Ctrl+C handler and the loop.
///
/// Waiting on the signal returns as soon as it is triggered, so an interrupt
/// during the inter-poll pause stops the loop without sitting out the interval.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        let mut stopped = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *stopped = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.inner;
        match lock.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Routes Ctrl+C to this signal. Can only be installed once per process.
    pub fn install_ctrlc_handler(&self) -> Result<(), FloodError> {
        let signal = self.clone();
        ctrlc::set_handler(move || signal.trigger())
            .map_err(|e| FloodError::Config(format!("failed to install Ctrl+C handler: {}", e)))
    }
}

/// Paces the loop between iterations.
pub trait Pacer {
    /// Blocks for up to `interval`. Returns `true` if the loop should stop.
    fn wait(&mut self, interval: Duration) -> bool;

    /// Whether a stop has been requested, without waiting.
    fn stop_requested(&self) -> bool;
}

impl Pacer for StopSignal {
    fn wait(&mut self, interval: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = match lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match cvar.wait_timeout_while(guard, interval, |stopped| !*stopped) {
            Ok((guard, _)) => *guard,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }

    fn stop_requested(&self) -> bool {
        self.is_triggered()
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Drives the read → predict → sync cycle.
pub struct PollLoop<S: FrameSource, K: RecordSink, P: Pacer> {
    source: S,
    oracle: Arc<dyn Predictor>,
    sink: K,
    pacer: P,
    sites: Vec<SiteConfig>,
    interval: Duration,
    state: LoopState,
}

impl<S: FrameSource, K: RecordSink, P: Pacer> PollLoop<S, K, P> {
    pub fn new(
        source: S,
        oracle: Arc<dyn Predictor>,
        sink: K,
        pacer: P,
        sites: Vec<SiteConfig>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            oracle,
            sink,
            pacer,
            sites,
            interval,
            state: LoopState::Stopped,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs one read → predict → sync iteration.
    pub fn poll_once(&mut self) -> Result<Predictions, FloodError> {
        let frame = self.source.read_frame()?;
        logging::info(Component::Poll, &format!("Sensor Data: {}", frame));

        let today = Local::now().date_naive();
        let mut levels = Vec::with_capacity(self.sites.len());
        for site in &self.sites {
            let features = FeatureVector::for_site(today, &frame, site);
            levels.push(self.oracle.predict(&features.to_array())?);
        }
        let predictions = Predictions::new(levels);

        let summary: Vec<String> = predictions
            .levels
            .iter()
            .enumerate()
            .map(|(i, level)| format!("Level{}={:.3}", i + 1, level))
            .collect();
        logging::info(Component::Poll, &format!("Predictions: {}", summary.join(", ")));

        self.sink.update(today, &frame, &predictions)?;
        Ok(predictions)
    }

    /// Runs until interrupted or an iteration fails. Returns the number of
    /// completed iterations. The frame source is closed before returning.
    pub fn run(&mut self) -> Result<u64, FloodError> {
        self.state = LoopState::Running;
        logging::info(
            Component::Poll,
            &format!(
                "Polling every {}s for {} site(s)",
                self.interval.as_secs_f64(),
                self.sites.len()
            ),
        );

        let outcome = self.run_iterations();

        self.state = LoopState::Stopped;
        self.source.close();
        outcome
    }

    fn run_iterations(&mut self) -> Result<u64, FloodError> {
        let mut completed = 0;
        loop {
            if self.pacer.stop_requested() {
                logging::info(Component::Poll, "Stopping system...");
                return Ok(completed);
            }

            match self.poll_once() {
                Ok(_) => completed += 1,
                Err(_) if self.pacer.stop_requested() => {
                    logging::info(Component::Poll, "Stopping system (interrupted mid-iteration)...");
                    return Ok(completed);
                }
                Err(e) => {
                    logging::log_failure(Component::Poll, "Poll iteration", &e);
                    return Err(e);
                }
            }

            if self.pacer.wait(self.interval) {
                logging::info(Component::Poll, "Stopping system...");
                return Ok(completed);
            }
        }
    }
}
