//! The `stats` report.
//!
//! Four byte counters followed by the five intervals between consecutive
//! milestones of the current attempt. An interval whose endpoints have not
//! both happened prints as `n/a`.

use std::time::Duration;

use securelink_core::{ByteCounters, Milestone, Timings};

/// Interval labels with their starting and ending milestones.
const INTERVALS: [(&str, Milestone, Milestone); 5] = [
    ("Address lookup", Milestone::AttemptStarted, Milestone::AddressResolved),
    ("TCP connect", Milestone::AddressResolved, Milestone::ConnectionOpened),
    ("TLS negotiation", Milestone::ConnectionOpened, Milestone::NegotiationComplete),
    ("First packet", Milestone::NegotiationComplete, Milestone::FirstDataReceived),
    ("Last packet", Milestone::FirstDataReceived, Milestone::LastDataReceived),
];

/// Render the report, one line per entry.
pub fn render(counters: &ByteCounters, timings: &Timings) -> Vec<String> {
    let mut lines = vec![
        format!("Raw bytes sent: {}", counters.raw_sent()),
        format!("Raw bytes received: {}", counters.raw_received()),
        format!("Clear bytes sent: {}", counters.clear_sent()),
        format!("Clear bytes received: {}", counters.clear_received()),
    ];

    lines.extend(
        INTERVALS
            .iter()
            .map(|(label, from, to)| format!("{label}: {}", millis(timings.elapsed(*from, *to)))),
    );

    lines
}

fn millis(interval: Option<Duration>) -> String {
    interval.map_or_else(|| "n/a".to_string(), |d| format!("{} ms", d.as_millis()))
}
