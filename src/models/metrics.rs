//! Resource usage captured from a `time -v` wrapper.

use serde::{Deserialize, Serialize};

/// Usage figures for one command, as reported by GNU `time -v`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeMetrics {
    pub user_time: f64,
    pub system_time: f64,
    /// Elapsed wall clock seconds.
    pub wall_clock: f64,
    pub percent_of_cpu: f64,
    /// Peak resident set size in kilobytes.
    pub maximum_resident_set_size: f64,
}

impl TimeMetrics {
    /// Parse the verbose report out of captured stderr. Returns `None` if
    /// no report is present.
    pub fn parse(stderr: &str) -> Option<Self> {
        let mut metrics = Self::default();
        let mut found = false;

        for line in stderr.lines() {
            let Some((label, value)) = line.trim().rsplit_once(": ") else {
                continue;
            };
            let value = value.trim();

            let parsed = match label {
                "User time (seconds)" => value.parse().ok().map(|v| metrics.user_time = v),
                "System time (seconds)" => value.parse().ok().map(|v| metrics.system_time = v),
                "Percent of CPU this job got" => value
                    .trim_end_matches('%')
                    .parse()
                    .ok()
                    .map(|v| metrics.percent_of_cpu = v),
                "Maximum resident set size (kbytes)" => value
                    .parse()
                    .ok()
                    .map(|v| metrics.maximum_resident_set_size = v),
                l if l.starts_with("Elapsed (wall clock) time") => {
                    parse_clock(value).map(|v| metrics.wall_clock = v)
                }
                _ => None,
            };
            found |= parsed.is_some();
        }

        found.then_some(metrics)
    }

    /// Field-wise mean.
    pub fn average(samples: &[TimeMetrics]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let sum = samples.iter().fold(Self::default(), |acc, m| Self {
            user_time: acc.user_time + m.user_time,
            system_time: acc.system_time + m.system_time,
            wall_clock: acc.wall_clock + m.wall_clock,
            percent_of_cpu: acc.percent_of_cpu + m.percent_of_cpu,
            maximum_resident_set_size: acc.maximum_resident_set_size
                + m.maximum_resident_set_size,
        });

        Some(Self {
            user_time: sum.user_time / n,
            system_time: sum.system_time / n,
            wall_clock: sum.wall_clock / n,
            percent_of_cpu: sum.percent_of_cpu / n,
            maximum_resident_set_size: sum.maximum_resident_set_size / n,
        })
    }
}

/// `h:mm:ss` or `m:ss.ss` to seconds.
fn parse_clock(value: &str) -> Option<f64> {
    value
        .split(':')
        .try_fold(0.0, |acc, part| part.parse::<f64>().ok().map(|v| acc * 60.0 + v))
}

/// Per-job usage summary row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetrics {
    pub job_id: String,
    pub case_id: Option<String>,
    pub status: String,
    pub thread_count: i32,
    pub block_count: i32,
    pub download_seconds: f64,
    pub upload_seconds: f64,
    pub total_seconds: f64,
    /// Mean over every block that produced a report.
    pub average: Option<TimeMetrics>,
}
