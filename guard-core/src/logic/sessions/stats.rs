//! Session statistics over a bounded visit history

use std::collections::HashSet;

use super::types::{RecentVisit, Session, SessionStats};

/// Mean and population standard deviation of consecutive gaps.
///
/// `timestamps` must be sorted ascending; fewer than two give `None`.
pub fn interval_stats(timestamps: &[i64]) -> Option<(f64, f64)> {
    if timestamps.len() < 2 {
        return None;
    }
    let gaps: Vec<f64> = timestamps.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let n = gaps.len() as f64;
    let mean = gaps.iter().sum::<f64>() / n;
    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Split sorted timestamps into sessions; a gap larger than `window_secs`
/// closes the current session.
pub fn group_into_sessions(timestamps: &[i64], window_secs: i64) -> Vec<Session> {
    let mut sessions = Vec::new();
    let mut iter = timestamps.iter().copied();
    let Some(first) = iter.next() else {
        return sessions;
    };

    let mut current = Session { start: first, end: first, page_count: 1 };
    for ts in iter {
        if ts - current.end <= window_secs {
            current.end = ts;
            current.page_count += 1;
        } else {
            sessions.push(current);
            current = Session { start: ts, end: ts, page_count: 1 };
        }
    }
    sessions.push(current);
    sessions
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Recompute all fingerprint statistics.
///
/// `timestamps` may arrive in any order (stores return newest first).
pub fn compute(timestamps: &[i64], window_secs: i64, distinct_paths: u64, total_visits: u64) -> SessionStats {
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();

    let intervals = interval_stats(&sorted);
    let sessions = group_into_sessions(&sorted, window_secs);

    let (pages_avg, duration_avg) = if sessions.is_empty() {
        (None, None)
    } else {
        let n = sessions.len() as f64;
        let pages = sessions.iter().map(|s| f64::from(s.page_count)).sum::<f64>() / n;
        let duration = sessions.iter().map(|s| s.duration() as f64).sum::<f64>() / n;
        (Some(pages), Some(duration))
    };

    let unique_paths_ratio = (total_visits > 0).then(|| round2(distinct_paths as f64 / total_visits as f64));

    SessionStats {
        request_interval_avg: intervals.map(|(mean, _)| mean),
        request_interval_stddev: intervals.map(|(_, stddev)| stddev),
        pages_per_session_avg: pages_avg,
        session_duration_avg: duration_avg,
        unique_paths_ratio,
    }
}

/// Statistics over a bounded slice of history; the unique-path ratio is
/// taken over the same slice
pub fn from_recent(recent: &[RecentVisit], window_secs: i64) -> SessionStats {
    let timestamps: Vec<i64> = recent.iter().map(|v| v.timestamp).collect();
    let distinct: HashSet<&str> = recent.iter().filter_map(|v| v.path.as_deref()).collect();
    compute(&timestamps, window_secs, distinct.len() as u64, recent.len() as u64)
}
