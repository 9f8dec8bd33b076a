//! Reprojection statistics, their two-line text log and the reliability
//! classification built on top of them.

use crate::LogParseError;
use serde::{Deserialize, Serialize};

/// One log line: `match rms bad threshold`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    /// Percentage of eligible pixels that produced a value.
    pub match_percent: f64,
    pub rms: f64,
    /// Percentage of produced values whose error exceeds `threshold`.
    pub bad_percent: f64,
    pub threshold: f64,
}

impl StatLine {
    pub fn to_log_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.match_percent, self.rms, self.bad_percent, self.threshold
        )
    }
}

/// Statistics of one reprojection: the direct fit (line 0) and the
/// reprojected disparities (line 1).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionStats {
    pub direct: StatLine,
    pub reprojected: StatLine,
}

impl ReprojectionStats {
    pub fn to_log_string(&self) -> String {
        format!(
            "{}\n{}\n",
            self.direct.to_log_line(),
            self.reprojected.to_log_line()
        )
    }

    /// Parse the two-line log; tokens that are not numbers are skipped.
    pub fn parse_log(text: &str) -> Result<Self, LogParseError> {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.len() < 2 {
            return Err(LogParseError::TooFewLines { found: lines.len() });
        }
        let parse_line = |line: usize| -> Result<StatLine, LogParseError> {
            let nums: Vec<f64> = lines[line]
                .split_whitespace()
                .filter_map(|t| t.parse::<f64>().ok())
                .collect();
            if nums.len() < 4 {
                return Err(LogParseError::TooFewNumbers {
                    line,
                    found: nums.len(),
                });
            }
            Ok(StatLine {
                match_percent: nums[0],
                rms: nums[1],
                bad_percent: nums[2],
                threshold: nums[3],
            })
        };
        Ok(Self {
            direct: parse_line(0)?,
            reprojected: parse_line(1)?,
        })
    }
}

/// The statistics the classification looks at.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityRecord {
    pub frac0: f64,
    pub frac1: f64,
    pub rms0: f64,
    pub rms1: f64,
    pub bad0: f64,
    pub bad1: f64,
}

impl ReliabilityRecord {
    pub fn from_stats(stats: &ReprojectionStats) -> Self {
        Self {
            frac0: stats.direct.match_percent,
            frac1: stats.reprojected.match_percent,
            rms0: stats.direct.rms,
            rms1: stats.reprojected.rms,
            bad0: stats.direct.bad_percent,
            bad1: stats.reprojected.bad_percent,
        }
    }

    /// All comparisons are inclusive; NaN statistics are never reliable.
    pub fn is_reliable(&self, t: &ReliabilityThresholds) -> bool {
        let ratio = self.frac1 / self.frac0;
        ratio >= t.min_match_ratio
            && self.frac1 >= t.min_match_percent
            && self.bad0 <= t.max_direct_bad_percent
            && self.bad1 <= t.max_reprojected_bad_percent
            && self.rms1 <= t.max_reprojected_rms
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityThresholds {
    /// Minimum `frac1 / frac0`.
    pub min_match_ratio: f64,
    /// Minimum `frac1` (percent).
    pub min_match_percent: f64,
    pub max_direct_bad_percent: f64,
    pub max_reprojected_bad_percent: f64,
    pub max_reprojected_rms: f64,
}

impl Default for ReliabilityThresholds {
    fn default() -> Self {
        Self {
            min_match_ratio: 0.3,
            min_match_percent: 5.0,
            max_direct_bad_percent: 50.0,
            max_reprojected_bad_percent: 10.0,
            max_reprojected_rms: 0.75,
        }
    }
}
