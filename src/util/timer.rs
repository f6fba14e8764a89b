//! Wall-clock timing of pipeline stages.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::util::fs::write_string;

/// Records how long each named stage took.
#[derive(Debug, Default, Clone)]
pub struct StageTimer {
    times: Vec<(String, Duration)>,
}

impl StageTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a duration. A repeated name replaces the earlier measurement.
    pub fn record(&mut self, name: &str, elapsed: Duration) {
        match self.times.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = elapsed,
            None => self.times.push((name.to_string(), elapsed)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Duration> {
        self.times
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| *d)
    }

    /// One `H:MM:SS name` line per stage, longest first.
    pub fn report(&self) -> String {
        let mut sorted: Vec<_> = self.times.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted
            .iter()
            .map(|(name, d)| format!("{} {}", format_duration(*d), name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn write_report(&self, path: &Path) -> Result<()> {
        write_string(path, &self.report())
    }
}

/// Format whole seconds as `H:MM:SS`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(format_duration(Duration::from_millis(59_999)), "0:00:59");
    }

    #[test]
    fn test_report_is_sorted_longest_first() {
        let mut timer = StageTimer::new();
        timer.record("stage1", Duration::from_secs(600));
        timer.record("builtins", Duration::from_secs(30));
        timer.record("stage2", Duration::from_secs(3600));

        assert_eq!(
            timer.report(),
            "1:00:00 stage2\n0:10:00 stage1\n0:00:30 builtins"
        );
    }

    #[test]
    fn test_record_replaces_earlier_measurement() {
        let mut timer = StageTimer::new();
        timer.record("stage1", Duration::from_secs(5));
        timer.record("stage1", Duration::from_secs(7));
        assert_eq!(timer.get("stage1"), Some(Duration::from_secs(7)));
        assert_eq!(timer.report(), "0:00:07 stage1");
    }

    #[test]
    fn test_write_report() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dist").join("build_times.txt");
        let mut timer = StageTimer::new();
        timer.record("stage1", Duration::from_secs(5));
        timer.write_report(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0:00:05 stage1");
    }
}
