//! The polling loop: wait, report, reset, until interrupted

use log::debug;
use std::io::Write;
use std::time::Duration;

use super::interrupt::InterruptToken;
use super::render::render_report;
use crate::config::Config;
use crate::domain::Result;
use crate::instrumentation::CounterSource;
use crate::probe::MatchTable;

/// Where the loop is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Reporting every interval
    Polling,
    /// No interval: a single wait for the interrupt
    WaitingForInterrupt,
    /// Interrupted; one final report left
    Draining,
    Terminated,
}

/// Why a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Interrupted,
}

impl LoopState {
    #[must_use]
    pub fn initial(interval: Option<Duration>) -> Self {
        if interval.is_some() {
            LoopState::Polling
        } else {
            LoopState::WaitingForInterrupt
        }
    }

    #[must_use]
    pub fn after_wake(self, wake: Wake) -> Self {
        match (self, wake) {
            (LoopState::Polling | LoopState::WaitingForInterrupt, Wake::Interrupted) => {
                LoopState::Draining
            }
            (state, _) => state,
        }
    }

    #[must_use]
    pub fn after_report(self) -> Self {
        match self {
            LoopState::Draining => LoopState::Terminated,
            state => state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportOptions {
    /// `None` reports once, on interrupt
    pub interval: Option<Duration>,
    pub timestamp: bool,
}

impl From<&Config> for ReportOptions {
    fn from(config: &Config) -> Self {
        Self { interval: config.interval, timestamp: config.timestamp }
    }
}

/// Periodic reporter over a match table and a counter source
pub struct Reporter<'a, S, W> {
    table: &'a MatchTable,
    source: S,
    out: W,
    options: ReportOptions,
    reports: usize,
}

impl<'a, S: CounterSource, W: Write> Reporter<'a, S, W> {
    pub fn new(table: &'a MatchTable, source: S, out: W, options: ReportOptions) -> Self {
        Self { table, source, out, options, reports: 0 }
    }

    /// Run until interrupted, then emit the final report and `Detaching...`
    ///
    /// # Errors
    /// Returns an error if the counters cannot be read or reset, or output fails
    pub async fn run(&mut self, interrupt: &InterruptToken) -> Result<()> {
        let mut state = LoopState::initial(self.options.interval);
        loop {
            state = match state {
                LoopState::Polling => {
                    let wake = self.wait(interrupt).await;
                    if wake == Wake::Elapsed {
                        self.report()?;
                    }
                    state.after_wake(wake)
                }
                LoopState::WaitingForInterrupt => {
                    interrupt.interrupted().await;
                    state.after_wake(Wake::Interrupted)
                }
                LoopState::Draining => {
                    interrupt.disarm();
                    self.report()?;
                    writeln!(self.out, "Detaching...")?;
                    self.out.flush()?;
                    state.after_report()
                }
                LoopState::Terminated => return Ok(()),
            };
        }
    }

    async fn wait(&self, interrupt: &InterruptToken) -> Wake {
        let Some(interval) = self.options.interval else {
            interrupt.interrupted().await;
            return Wake::Interrupted;
        };
        tokio::select! {
            biased;
            () = interrupt.interrupted() => Wake::Interrupted,
            () = tokio::time::sleep(interval) => Wake::Elapsed,
        }
    }

    fn report(&mut self) -> Result<()> {
        let snapshot = self.source.snapshot()?;
        let timestamp =
            self.options.timestamp.then(|| chrono::Local::now().format("%H:%M:%S").to_string());
        render_report(&mut self.out, self.table, &snapshot, timestamp.as_deref())?;
        self.source.reset()?;
        self.reports += 1;
        debug!("Report {} emitted ({} calls)", self.reports, snapshot.total());
        Ok(())
    }

    /// Reports written so far, including the final one
    #[must_use]
    pub fn reports_emitted(&self) -> usize {
        self.reports
    }

    /// Give the counter source back (to detach it)
    pub fn into_source(self) -> S {
        self.source
    }
}
