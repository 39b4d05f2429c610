//! Recording collaborators for scheduler tests.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::kernel::traits::{BaseCollector, BaseSignalService};

/// Collector spy that records every call and can be scripted to fail the
/// first N attempts, or panic, for a given method/target pair.
#[derive(Default)]
pub struct RecordingCollector {
    calls: Mutex<Vec<(String, String)>>,
    fail_counts: Mutex<HashMap<(String, String), u32>>,
    panics: Mutex<Vec<(String, String)>>,
}

impl RecordingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls for this method/target pair.
    pub fn fail_first(&self, method: &str, target: &str, n: u32) {
        self.fail_counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((method.to_string(), target.to_string()), n);
    }

    /// Panic whenever this method/target pair is called.
    pub fn panic_on(&self, method: &str, target: &str) {
        self.panics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((method.to_string(), target.to_string()));
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self, method: &str, target: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(m, t)| m == method && t == target)
            .count()
    }

    fn record(&self, method: &str, target: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((method.to_string(), target.to_string()));

        let should_panic = self
            .panics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&(method.to_string(), target.to_string()));
        if should_panic {
            panic!("scripted panic in {method} for {target}");
        }

        let mut fails = self.fail_counts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(remaining) = fails.get_mut(&(method.to_string(), target.to_string())) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("scripted failure in {method} for {target}"));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl BaseCollector for RecordingCollector {
    async fn collect_eod(&self, ticker: &str, _force: bool) -> Result<()> {
        self.record("collect_eod", ticker)
    }

    async fn collect_eod_bulk(&self, exchange: &str) -> Result<()> {
        self.record("collect_eod_bulk", exchange)
    }

    async fn collect_fundamentals(&self, ticker: &str, _force: bool) -> Result<()> {
        self.record("collect_fundamentals", ticker)
    }

    async fn collect_filings(&self, ticker: &str, _force: bool) -> Result<()> {
        self.record("collect_filings", ticker)
    }

    async fn collect_filing_pdfs(&self, ticker: &str, _force: bool) -> Result<()> {
        self.record("collect_filing_pdfs", ticker)
    }

    async fn collect_news(&self, ticker: &str, _force: bool) -> Result<()> {
        self.record("collect_news", ticker)
    }

    async fn collect_filing_summaries(&self, ticker: &str, _force: bool) -> Result<()> {
        self.record("collect_filing_summaries", ticker)
    }

    async fn collect_timeline(&self, ticker: &str, _force: bool) -> Result<()> {
        self.record("collect_timeline", ticker)
    }

    async fn collect_news_intel(&self, ticker: &str, _force: bool) -> Result<()> {
        self.record("collect_news_intel", ticker)
    }
}

/// Signal service spy with the same failure scripting.
#[derive(Default)]
pub struct RecordingSignalService {
    calls: Mutex<Vec<String>>,
    fail_counts: Mutex<HashMap<String, u32>>,
}

impl RecordingSignalService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_first(&self, ticker: &str, n: u32) {
        self.fail_counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ticker.to_string(), n);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl BaseSignalService for RecordingSignalService {
    async fn compute_signals(&self, ticker: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ticker.to_string());

        let mut fails = self.fail_counts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(remaining) = fails.get_mut(ticker) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("scripted signal failure for {ticker}"));
            }
        }

        Ok(())
    }
}
