/// Per-user transcript of every exchange.
use crate::error::AppError;
use crate::session::Outcome;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const HEAVY_RULE: &str = "================================================================================";
const LIGHT_RULE: &str = "--------------------------------------------------------------------------------";

/// Transcript file for a (node, user) pair inside `log_dir`.
pub fn transcript_path(log_dir: &Path, node_id: u32, user_id: u64) -> PathBuf {
    log_dir.join(format!("node{}_user{}.txt", node_id, user_id))
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Aggregates written as the closing record of a transcript.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    pub total_messages: u64,
    pub session_duration: Duration,
    /// Mean response time over the session's completed messages.
    pub avg_response_time: Duration,
    pub total_tokens: u64,
}

impl SessionSummary {
    pub fn avg_tokens_per_message(&self) -> f64 {
        if self.total_messages > 0 {
            self.total_tokens as f64 / self.total_messages as f64
        } else {
            0.0
        }
    }
}

/// Append-only transcript owned by exactly one session.
///
/// Every record is flushed as soon as it is written so a killed run still
/// leaves readable transcripts behind.
pub struct Transcript<W: Write> {
    writer: W,
}

impl Transcript<BufWriter<File>> {
    /// Create (or truncate) the transcript file and write its header.
    pub fn create(
        log_dir: &Path,
        node_id: u32,
        user_id: u64,
        target: &str,
    ) -> Result<Self, AppError> {
        let path = transcript_path(log_dir, node_id, user_id);
        let file = File::create(&path).map_err(|e| {
            AppError::Io(std::io::Error::other(format!(
                "Failed to create transcript {}: {}",
                path.display(),
                e
            )))
        })?;
        let mut transcript = Self::new(BufWriter::new(file));
        transcript.write_header(node_id, user_id, target)?;
        Ok(transcript)
    }
}

impl<W: Write> Transcript<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_header(&mut self, node_id: u32, user_id: u64, target: &str) -> Result<(), AppError> {
        let w = &mut self.writer;
        writeln!(w, "Load Test Log - Node {} - User {}", node_id, user_id)?;
        writeln!(w, "Started: {}", timestamp())?;
        writeln!(w, "Target Server: {}", target)?;
        writeln!(w, "{}", HEAVY_RULE)?;
        writeln!(w)?;
        w.flush()?;
        Ok(())
    }

    /// Append the record of one attempt.
    pub fn write_attempt(&mut self, message_index: u64, outcome: &Outcome) -> Result<(), AppError> {
        let w = &mut self.writer;
        writeln!(w, "{}", HEAVY_RULE)?;
        writeln!(w, "Message #{} | {}", message_index, timestamp())?;
        writeln!(w, "{}", HEAVY_RULE)?;
        writeln!(w, "Status:           {}", outcome.status.label())?;
        writeln!(w, "Response Time:    {:.3}s", outcome.elapsed.as_secs_f64())?;
        writeln!(w, "Tokens Generated: {}", outcome.token_count)?;
        writeln!(w, "Tokens/Second:    {:.2}", outcome.tokens_per_second())?;
        if let Some(ttft) = outcome.time_to_first_token {
            writeln!(w, "First Token:      {:.3}s", ttft.as_secs_f64())?;
        }
        writeln!(w, "{}", LIGHT_RULE)?;
        writeln!(w, "QUERY:\n{}", outcome.prompt)?;
        writeln!(w, "{}", LIGHT_RULE)?;
        writeln!(w, "RESPONSE:\n{}", outcome.text)?;
        writeln!(w, "{}", HEAVY_RULE)?;
        writeln!(w)?;
        w.flush()?;
        Ok(())
    }

    /// Append the closing summary record.
    pub fn write_summary(&mut self, summary: &SessionSummary) -> Result<(), AppError> {
        let w = &mut self.writer;
        writeln!(w)?;
        writeln!(w, "{}", HEAVY_RULE)?;
        writeln!(w, "USER SESSION SUMMARY")?;
        writeln!(w, "{}", HEAVY_RULE)?;
        writeln!(w, "Total Messages:        {}", summary.total_messages)?;
        writeln!(
            w,
            "Session Duration:      {:.1}s",
            summary.session_duration.as_secs_f64()
        )?;
        writeln!(
            w,
            "Avg Response Time:     {:.2}s",
            summary.avg_response_time.as_secs_f64()
        )?;
        writeln!(w, "Total Tokens:          {}", summary.total_tokens)?;
        writeln!(
            w,
            "Avg Tokens/Message:    {:.1}",
            summary.avg_tokens_per_message()
        )?;
        writeln!(w, "{}", HEAVY_RULE)?;
        w.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
