//! Click projections for the dashboards.

use chrono::{Days, NaiveDate};

use crate::db::models::analytics::DailyCount;

/// Days projected past the end of a series
pub const PROJECTION_DAYS: u64 = 7;

/// Least-squares fit `count = intercept + slope * day_index`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearTrend {
    /// `None` for an empty series. A single point gives a flat line.
    pub fn fit(series: &[DailyCount]) -> Option<Self> {
        let n = series.len();
        if n == 0 {
            return None;
        }
        let n_f = n as f64;
        let mean_x = (n_f - 1.0) / 2.0;
        let mean_y = series.iter().map(|d| d.count as f64).sum::<f64>() / n_f;

        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (i, point) in series.iter().enumerate() {
            let dx = i as f64 - mean_x;
            sxy += dx * (point.count as f64 - mean_y);
            sxx += dx * dx;
        }
        let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };

        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn at(&self, index: usize) -> f64 {
        self.intercept + self.slope * index as f64
    }
}

/// One projected day
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedCount {
    pub day: NaiveDate,
    pub count: f64,
}

/// Project the next [`PROJECTION_DAYS`] days. Negative values clamp to zero.
pub fn project(series: &[DailyCount]) -> Vec<ProjectedCount> {
    let (Some(trend), Some(last)) = (LinearTrend::fit(series), series.last()) else {
        return Vec::new();
    };

    (1..=PROJECTION_DAYS)
        .filter_map(|offset| {
            let day = last.day.checked_add_days(Days::new(offset))?;
            let index = series.len() - 1 + offset as usize;
            Some(ProjectedCount {
                day,
                count: trend.at(index).max(0.0),
            })
        })
        .collect()
}
