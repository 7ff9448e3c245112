//! Per-section wall-clock timing of the stepping loop.
//!
//! Always keeps cumulative statistics (count, mean, min, max). With
//! `keep_history` every sample is stored too and can be dumped to CSV.

use crate::error::Result;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Default CSV file written by the full profiler
pub const PROFILER_CSV: &str = "vahana_profiler.csv";

/// Statistics for one named section
#[derive(Debug, Clone, Default)]
pub struct SectionStats {
    pub count: u64,
    total: f64,
    min: f64,
    max: f64,
    history: Vec<f64>,
}

impl SectionStats {
    /// Mean duration (seconds)
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Individual samples (seconds); empty unless history is kept
    pub fn history(&self) -> &[f64] {
        &self.history
    }
}

/// Cumulative timer keyed by section name
#[derive(Debug, Clone, Default)]
pub struct TimeLogger {
    keep_history: bool,
    sections: BTreeMap<String, SectionStats>,
}

impl TimeLogger {
    pub fn new(keep_history: bool) -> Self {
        Self {
            keep_history,
            sections: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn keeps_history(&self) -> bool {
        self.keep_history
    }

    /// Add one sample to `section`
    pub fn record(&mut self, section: &str, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let stats = self.sections.entry(section.to_string()).or_default();
        if stats.count == 0 {
            stats.min = secs;
            stats.max = secs;
        } else {
            stats.min = stats.min.min(secs);
            stats.max = stats.max.max(secs);
        }
        stats.count += 1;
        stats.total += secs;
        if self.keep_history {
            stats.history.push(secs);
        }
    }

    pub fn stats(&self, section: &str) -> Option<&SectionStats> {
        self.sections.get(section)
    }

    /// Human-readable table of all sections
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<16} {:>10} {:>12} {:>12} {:>12}",
            "section", "count", "mean [ms]", "min [ms]", "max [ms]"
        );
        for (name, s) in &self.sections {
            let _ = writeln!(
                out,
                "{:<16} {:>10} {:>12.4} {:>12.4} {:>12.4}",
                name,
                s.count,
                s.mean() * 1e3,
                s.min * 1e3,
                s.max * 1e3
            );
        }
        out
    }

    /// Dump every stored sample as `section,index,seconds`
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "section,index,seconds")?;
        for (name, s) in &self.sections {
            for (i, secs) in s.history.iter().enumerate() {
                writeln!(w, "{},{},{:.9}", name, i, secs)?;
            }
        }
        w.flush()?;
        Ok(())
    }
}
