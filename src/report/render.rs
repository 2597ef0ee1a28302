/// Text and JSON rendering of statistics snapshots.
use crate::error::AppError;
use crate::stats::{Percentiles, StatsSnapshot};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

const RULE_WIDTH: usize = 70;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Run-wide rates derived from the final snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Throughput {
    pub messages_per_second: f64,
    pub tokens_per_second: f64,
}

impl Throughput {
    pub fn from_snapshot(snapshot: &StatsSnapshot, duration: Duration) -> Self {
        let secs = duration.as_secs_f64();
        if secs > 0.0 {
            Self {
                messages_per_second: snapshot.messages_completed as f64 / secs,
                tokens_per_second: snapshot.total_tokens as f64 / secs,
            }
        } else {
            Self {
                messages_per_second: 0.0,
                tokens_per_second: 0.0,
            }
        }
    }
}

/// End-of-run report: the last snapshot plus run metadata.
#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub node_id: u32,
    pub users: usize,
    /// Sessions actually spawned; lower than `users` when some could not start.
    pub sessions_started: usize,
    pub target: String,
    pub duration_s: f64,
    pub log_dir: PathBuf,
    /// Set when the run ended early on an interrupt.
    pub interrupted: bool,
    pub stats: StatsSnapshot,
    pub throughput: Throughput,
}

impl FinalReport {
    pub fn new(
        node_id: u32,
        users: usize,
        target: &str,
        duration: Duration,
        log_dir: PathBuf,
        interrupted: bool,
        stats: StatsSnapshot,
    ) -> Self {
        let throughput = Throughput::from_snapshot(&stats, duration);
        Self {
            node_id,
            users,
            sessions_started: users,
            target: target.to_string(),
            duration_s: duration.as_secs_f64(),
            log_dir,
            interrupted,
            stats,
            throughput,
        }
    }

    pub fn with_sessions_started(mut self, sessions_started: usize) -> Self {
        self.sessions_started = sessions_started;
        self
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_text(&self) -> String {
        let s = &self.stats;
        let mut out = String::new();

        let _ = writeln!(out, "\n{}", rule());
        if self.node_id > 0 {
            let _ = writeln!(out, "FINAL RESULTS - NODE {}", self.node_id);
        } else {
            let _ = writeln!(out, "FINAL RESULTS");
        }
        let _ = writeln!(out, "{}", rule());
        if self.interrupted {
            let _ = writeln!(out, "Run interrupted before all sessions finished");
        }
        let _ = writeln!(out, "Target Server:      {}", self.target);
        let _ = writeln!(out, "Total Duration:     {:.1}s", self.duration_s);
        let _ = writeln!(out, "Total Users:        {}", self.users);
        if self.sessions_started != self.users {
            let _ = writeln!(out, "Sessions Started:   {}", self.sessions_started);
        }
        let _ = writeln!(out, "Messages Sent:      {}", s.messages_sent);
        let _ = writeln!(out, "Messages Completed: {}", s.messages_completed);
        let _ = writeln!(out, "Messages Failed:    {}", s.messages_failed);
        let _ = writeln!(out, "Success Rate:       {:.1}%", s.success_rate);
        let _ = writeln!(out);
        let _ = writeln!(out, "Avg Response Time:  {:.2}s", s.avg_response_time);
        let _ = writeln!(out, "Avg First Token:    {:.2}s", s.avg_time_to_first_token);
        let _ = writeln!(out, "Avg Tokens/Message: {:.0}", s.avg_tokens);
        let _ = writeln!(out, "Total Tokens:       {}", s.total_tokens);
        let _ = writeln!(out);
        let _ = writeln!(out, "Connection Errors:  {}", s.connection_errors);
        let _ = writeln!(out, "Streaming Errors:   {}", s.streaming_errors);
        if let Some(p) = &s.percentiles {
            write_percentiles(&mut out, p);
        }
        if s.messages_completed > 0 {
            let _ = writeln!(
                out,
                "\nThroughput:         {:.2} messages/second",
                self.throughput.messages_per_second
            );
            let _ = writeln!(
                out,
                "Tokens/second:      {:.0}",
                self.throughput.tokens_per_second
            );
        }
        let _ = writeln!(out, "{}", rule());
        let _ = writeln!(out, "\nLogs saved to: {}", self.log_dir.display());
        let _ = writeln!(out, "{}", rule());
        out
    }
}

/// Render one periodic report.
pub fn render_periodic(snapshot: &StatsSnapshot, elapsed: Duration, node_id: u32) -> String {
    let s = snapshot;
    let mut out = String::new();
    let clock = chrono::Local::now().format("%H:%M:%S");

    let _ = writeln!(out, "\n{}", rule());
    if node_id > 0 {
        let _ = writeln!(
            out,
            "NODE {} @ {} (Elapsed: {:.0}s)",
            node_id,
            clock,
            elapsed.as_secs_f64()
        );
    } else {
        let _ = writeln!(
            out,
            "STATISTICS @ {} (Elapsed: {:.0}s)",
            clock,
            elapsed.as_secs_f64()
        );
    }
    let _ = writeln!(out, "{}", rule());
    let _ = writeln!(out, "Active Users:       {}", s.active_users);
    let _ = writeln!(out, "Messages Sent:      {}", s.messages_sent);
    let _ = writeln!(out, "Messages Completed: {}", s.messages_completed);
    let _ = writeln!(out, "Messages Failed:    {}", s.messages_failed);
    let _ = writeln!(out, "Success Rate:       {:.1}%", s.success_rate);
    let _ = writeln!(out, "Avg Response Time:  {:.2}s", s.avg_response_time);
    let _ = writeln!(out, "Avg Tokens/Msg:     {:.0}", s.avg_tokens);
    let _ = writeln!(out, "Total Tokens:       {}", s.total_tokens);
    let _ = writeln!(out, "Connection Errors:  {}", s.connection_errors);
    let _ = writeln!(out, "Streaming Errors:   {}", s.streaming_errors);
    if let Some(p) = &s.percentiles {
        write_percentiles(&mut out, p);
    }
    let _ = writeln!(out, "{}", rule());
    out
}

fn write_percentiles(out: &mut String, p: &Percentiles) {
    let _ = writeln!(out, "\nResponse Time Percentiles:");
    let _ = writeln!(out, "  P50 (median): {:.2}s", p.p50);
    let _ = writeln!(out, "  P90:          {:.2}s", p.p90);
    let _ = writeln!(out, "  P95:          {:.2}s", p.p95);
    let _ = writeln!(out, "  P99:          {:.2}s", p.p99);
}
