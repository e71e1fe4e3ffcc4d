//! Text rendering of live state and final results.
//!
//! Handles formatting and color coding for terminal output.

use colored::{Color, Colorize};

use crate::engine::{MeasurementState, Phase};
use crate::results::{BandwidthResults, SpeedTestResults};

/// Width of the progress bar in characters.
const BAR_WIDTH: usize = 30;

/// Get color for speed value based on thresholds.
///
/// - Green: >= 100 Mbps (fast)
/// - Yellow: 25-100 Mbps (moderate)
/// - Red: < 25 Mbps (slow)
pub fn speed_color(speed_mbps: f64) -> Color {
    if speed_mbps >= 100.0 {
        Color::Green
    } else if speed_mbps >= 25.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// Format speed value with 2 decimal places.
pub fn format_speed(speed_mbps: f64) -> String {
    format!("{:.2} Mbps", speed_mbps)
}

/// Format latency value with 2 decimal places.
pub fn format_latency(latency_ms: f64) -> String {
    format!("{:.2} ms", latency_ms)
}

/// A fixed-width bar for a percentage in [0, 100].
pub fn progress_bar(progress: f64, width: usize) -> String {
    let ratio = if progress.is_finite() {
        (progress / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (ratio * width as f64).round() as usize;

    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

fn format_live_value(phase: Phase, value: f64) -> String {
    match phase {
        Phase::Ping => format_latency(value),
        Phase::Download | Phase::Upload => format_speed(value),
        Phase::Idle | Phase::Complete => String::new(),
    }
}

/// One status line for the current state, without trailing newline.
///
/// Empty for states that are not measuring.
pub fn render_live_line(state: &MeasurementState) -> String {
    if !state.phase.is_measuring() {
        return String::new();
    }

    format!(
        "{} {} {:>3.0}%  {}",
        format!("{:<9}", state.phase).bold(),
        progress_bar(state.progress, BAR_WIDTH),
        state.progress,
        format_live_value(state.phase, state.current_speed_or_latency).bright_blue(),
    )
}

fn render_bandwidth(label: &str, bandwidth: &BandwidthResults) -> String {
    let speed = format_speed(bandwidth.speed_mbps).color(speed_color(bandwidth.speed_mbps));

    let mut line = format!(
        "{} {} ({} chunks",
        label.bold().white(),
        speed,
        bandwidth.samples
    );
    if bandwidth.failed_chunks > 0 {
        line.push_str(&format!(", {} failed", bandwidth.failed_chunks));
    }
    line.push(')');

    if bandwidth.is_placeholder() {
        line.push_str(&format!(" {}", "no successful transfers".red()));
    }

    line
}

/// Multi-line colored report of a completed run.
pub fn render_results(results: &SpeedTestResults) -> String {
    let lines = [
        format!("{} {}", "Server:".bold().white(), results.server.bright_blue()),
        format!(
            "{} {}",
            "Latency:".bold().white(),
            format_latency(results.latency.ping_ms).bright_cyan()
        ),
        format!(
            "{} {}",
            "Jitter:".bold().white(),
            format_latency(results.latency.jitter_ms).bright_cyan()
        ),
        render_bandwidth("Download speed:", &results.download),
        render_bandwidth("Upload speed:", &results.upload),
    ];

    lines.join("\n")
}
