//! Statistics aggregator (C3): per-client offset samples and periodic summarization.

use chrono::Local;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::ClockError;

/// Default output path, matching the reference implementation's `./clock_server.out`.
pub const DEFAULT_STATS_PATH: &str = "./clock_server.out";

/// Accumulates per-client offset samples and flushes descriptive statistics to
/// an append-only CSV log.
///
/// `add_point` and `record_statistics` both take a short lock around the
/// sample map only; `record_statistics` snapshots and releases the lock before
/// doing any file I/O, so the lock is never held across a blocking call.
pub struct StatsAggregator {
    path: PathBuf,
    samples: Mutex<HashMap<u32, Vec<i64>>>,
}

impl StatsAggregator {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), samples: Mutex::new(HashMap::new()) }
    }

    /// Appends `offset_us` to the sample list for `clock_id`, creating the list
    /// on first use.
    pub fn add_point(&self, clock_id: u32, offset_us: i64) {
        let mut samples = self.samples.lock().expect("stats mutex poisoned");
        samples.entry(clock_id).or_default().push(offset_us);
    }

    /// Discards all collected samples without writing anything.
    pub fn clear(&self) {
        self.samples.lock().expect("stats mutex poisoned").clear();
    }

    /// If any samples have been collected, computes one summary line per
    /// client and appends them to the output file, then clears the store.
    ///
    /// A failure to open/write the file is returned to the caller (who should
    /// log it and retry next window); samples are retained in that case.
    pub fn record_statistics(&self) -> Result<(), ClockError> {
        let snapshot: HashMap<u32, Vec<i64>> = {
            let mut samples = self.samples.lock().expect("stats mutex poisoned");
            if samples.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *samples)
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(ClockError::StatsIo)?;

        let ts = format_timestamp_micros();
        let mut ids: Vec<&u32> = snapshot.keys().collect();
        ids.sort_unstable();
        for clock_id in ids {
            let values = &snapshot[clock_id];
            if let Some(line) = summarize(&ts, *clock_id, values) {
                writeln!(file, "{}", line).map_err(ClockError::StatsIo)?;
            }
        }
        file.flush().map_err(ClockError::StatsIo)?;
        Ok(())
    }
}

/// Computes one `<n>,<min>,<mean>,<median>,<max>` CSV body for a single client's
/// sample vector, prefixed with `<timestamp_us>,<clock_id>`.
fn summarize(ts: &str, clock_id: u32, values: &[i64]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let n = values.len();
    let min = *values.iter().min().unwrap();
    let max = *values.iter().max().unwrap();
    let sum: i64 = values.iter().sum();
    let mean = sum / n as i64;

    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let median = sorted[n / 2];

    Some(format!("{},{},{},{},{},{},{}", ts, clock_id, n, min, mean, median, max))
}

/// `YYYY-MM-DD HH:MM:SS.<micros>` in local time, micros with no fixed width.
fn format_timestamp_micros() -> String {
    let now = Local::now();
    let micros = now.timestamp_subsec_micros();
    format!("{}.{}", now.format("%Y-%m-%d %H:%M:%S"), micros)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("clock_sync_test_{}_{}.out", name, std::process::id()))
    }

    #[test]
    fn empty_flush_writes_nothing() {
        let path = temp_path("empty_flush");
        let _ = std::fs::remove_file(&path);
        let agg = StatsAggregator::new(&path);
        agg.record_statistics().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn flush_computes_expected_summary_and_clears() {
        let path = temp_path("summary");
        let _ = std::fs::remove_file(&path);
        let agg = StatsAggregator::new(&path);

        let values = [10i64, -5, 20, 0, 15];
        for v in values {
            agg.add_point(7, v);
        }
        agg.record_statistics().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let line = content.lines().next().unwrap();
        let fields: Vec<&str> = line.split(',').collect();
        // timestamp, clock_id, n, min, mean, median, max
        assert_eq!(fields[1], "7");
        assert_eq!(fields[2], "5");
        assert_eq!(fields[3], "-5");
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        let expected_median = sorted[values.len() / 2];
        assert_eq!(fields[5].parse::<i64>().unwrap(), expected_median);
        assert_eq!(fields[6], "20");

        // A second flush with no intervening add_point writes nothing new.
        let before = std::fs::read_to_string(&path).unwrap();
        agg.record_statistics().unwrap();
        let after = std::fs::read_to_string(&path).unwrap();
        assert_eq!(before, after);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn fresh_window_after_flush() {
        let path = temp_path("fresh_window");
        let _ = std::fs::remove_file(&path);
        let agg = StatsAggregator::new(&path);

        agg.add_point(1, 100);
        agg.record_statistics().unwrap();
        agg.add_point(1, 5);
        agg.record_statistics().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(",1,1,5,5,5,5"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn concurrent_add_point_loses_nothing() {
        let path = temp_path("concurrent");
        let _ = std::fs::remove_file(&path);
        let agg = Arc::new(StatsAggregator::new(&path));

        let workers = 8;
        let per_worker = 200;
        let mut handles = Vec::new();
        for w in 0..workers {
            let agg = agg.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..per_worker {
                    agg.add_point((w % 3) as u32, i as i64);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        agg.record_statistics().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let total: usize = content
            .lines()
            .map(|l| l.split(',').nth(2).unwrap().parse::<usize>().unwrap())
            .sum();
        assert_eq!(total, workers * per_worker);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn offset_sign_is_preserved() {
        let path = temp_path("offset_sign");
        let _ = std::fs::remove_file(&path);
        let agg = StatsAggregator::new(&path);
        for _ in 0..5 {
            agg.add_point(3, -1_000_000);
        }
        agg.record_statistics().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let fields: Vec<&str> = content.lines().next().unwrap().split(',').collect();
        assert_eq!(fields[3], "-1000000");
        assert_eq!(fields[4], "-1000000");
        assert_eq!(fields[5], "-1000000");
        assert_eq!(fields[6], "-1000000");

        let _ = std::fs::remove_file(&path);
    }
}
