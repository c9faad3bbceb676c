use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{Answer, Health, IndexStatus, OutputFormat, ScoreKind, SearchResults};
use crate::services::MetricsSummary;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_answer(&self, question: &str, answer: &Answer) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_index_status(&self, status: &IndexStatus) -> String;
    fn format_ingest_stats(&self, stats: &IngestStats) -> String;
    fn format_health(&self, health: &Health) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub daemon_running: bool,
    pub socket_path: String,
    pub pid: Option<u32>,
    pub idle_secs: Option<u64>,
    pub requests_served: Option<u64>,
    pub index: IndexStatus,
    pub metrics: Option<MetricsSummary>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub job_id: String,
    pub files_scanned: u64,
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub chunks_created: u64,
    pub summary_chunks: u64,
    pub skipped_cells: u64,
    pub skipped_rows: u64,
    pub skipped_bytes: u64,
    pub duration_ms: u64,
}

/// Run `f` against an empty buffer. Writing to a `String` cannot fail.
fn render(f: impl FnOnce(&mut String) -> std::fmt::Result) -> String {
    let mut output = String::new();
    let _ = f(&mut output);
    output
}

fn score_label(kind: ScoreKind) -> &'static str {
    match kind {
        ScoreKind::Similarity => "Score",
        ScoreKind::Distance => "Distance",
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        render(|output| {
            writeln!(output, "Search results for: \"{}\"", results.query)?;
            writeln!(
                output,
                "Found {} results in {}ms\n",
                results.len(),
                results.duration_ms
            )?;

            let label = score_label(results.score_kind);
            for (i, hit) in results.hits.iter().enumerate() {
                writeln!(output, "{}. [{}: {:.3}]", i + 1, label, hit.score)?;
                writeln!(output, "   File: {} (job {})", hit.file_name, hit.job_id)?;
                writeln!(output, "   Chunk: {}", hit.chunk_id)?;
                writeln!(output, "   ---")?;
                for line in hit.snippet.lines() {
                    writeln!(output, "   {}", line)?;
                }
                writeln!(output)?;
            }
            Ok(())
        })
    }

    fn format_answer(&self, question: &str, answer: &Answer) -> String {
        render(|output| {
            writeln!(output, "Q: {}\n", question)?;
            writeln!(output, "{}\n", answer.answer)?;
            if !answer.sources.is_empty() {
                writeln!(output, "Sources:")?;
                for (i, source) in answer.sources.iter().enumerate() {
                    writeln!(
                        output,
                        "  {}. {} (job {}, {:.3})",
                        i + 1,
                        source.file_name,
                        source.job_id,
                        source.score
                    )?;
                }
            }
            Ok(())
        })
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        render(|output| {
            writeln!(output, "Status")?;
            writeln!(output, "------")?;

            let daemon_status = if status.daemon_running {
                "[RUNNING]"
            } else {
                "[STOPPED]"
            };
            writeln!(output, "Daemon:        {}", daemon_status)?;
            writeln!(output, "  Socket:      {}", status.socket_path)?;
            if let Some(pid) = status.pid {
                writeln!(output, "  PID:         {}", pid)?;
            }
            if let Some(idle) = status.idle_secs {
                writeln!(output, "  Idle:        {}s", idle)?;
            }
            if let Some(served) = status.requests_served {
                writeln!(output, "  Served:      {}", served)?;
            }
            if let Some(ref m) = status.metrics {
                writeln!(output, "  Requests:    {}", m.total_requests)?;
                writeln!(output, "  Avg Latency: {}ms", m.avg_latency_ms)?;
                if m.error_rate > 0.0 {
                    writeln!(output, "  Error Rate:  {:.1}%", m.error_rate)?;
                }
                for op in &m.operations {
                    writeln!(
                        output,
                        "    {:<10} {} req, {}ms avg",
                        op.operation, op.requests, op.avg_latency_ms
                    )?;
                }
            }
            writeln!(output)?;
            output.push_str(&self.format_index_status(&status.index));
            Ok(())
        })
    }

    fn format_index_status(&self, status: &IndexStatus) -> String {
        render(|output| {
            writeln!(output, "Index:         {}", status.index_dir)?;
            writeln!(output, "  Scheme:      {}", status.scheme)?;
            if let Some(ref stale) = status.stale_scheme {
                writeln!(output, "  Stored:      {} (run `ragdex index rebuild`)", stale)?;
            }
            writeln!(output, "  Generation:  {}", status.generation)?;
            writeln!(output, "  Chunks:      {}", status.entries)?;
            writeln!(output, "  Jobs:        {}", status.jobs)?;
            if let Some(vocabulary) = status.vocabulary {
                writeln!(output, "  Vocabulary:  {}", vocabulary)?;
            }
            Ok(())
        })
    }

    fn format_ingest_stats(&self, stats: &IngestStats) -> String {
        render(|output| {
            writeln!(output, "Ingest Complete")?;
            writeln!(output, "---------------")?;
            writeln!(output, "Job: {}", stats.job_id)?;
            writeln!(output, "Files scanned: {}", stats.files_scanned)?;
            writeln!(output, "Files indexed: {}", stats.files_indexed)?;
            writeln!(output, "Files skipped: {}", stats.files_skipped)?;
            writeln!(output, "Chunks created: {}", stats.chunks_created)?;
            if stats.summary_chunks > 0 {
                writeln!(output, "Summary chunks: {}", stats.summary_chunks)?;
            }
            if stats.skipped_cells + stats.skipped_rows + stats.skipped_bytes > 0 {
                writeln!(
                    output,
                    "Skipped: {} cells, {} rows, {} bytes",
                    stats.skipped_cells, stats.skipped_rows, stats.skipped_bytes
                )?;
            }
            writeln!(output, "Duration: {}ms", stats.duration_ms)?;
            Ok(())
        })
    }

    fn format_health(&self, health: &Health) -> String {
        format!("{} ({})\n", health.status, health.now.to_rfc3339())
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn to_json(&self, value: &impl Serialize) -> String {
        let result = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        result.unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        self.to_json(results)
    }

    fn format_answer(&self, _question: &str, answer: &Answer) -> String {
        self.to_json(answer)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.to_json(status)
    }

    fn format_index_status(&self, status: &IndexStatus) -> String {
        self.to_json(status)
    }

    fn format_ingest_stats(&self, stats: &IngestStats) -> String {
        self.to_json(stats)
    }

    fn format_health(&self, health: &Health) -> String {
        self.to_json(health)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        render(|output| {
            writeln!(output, "## Search Results\n")?;
            writeln!(output, "**Query:** `{}`\n", results.query)?;
            writeln!(
                output,
                "Found {} results in {}ms\n",
                results.len(),
                results.duration_ms
            )?;

            let label = score_label(results.score_kind);
            for (i, hit) in results.hits.iter().enumerate() {
                writeln!(output, "### {}. {}: {:.3}\n", i + 1, label, hit.score)?;
                writeln!(output, "**File:** `{}` (job `{}`)\n", hit.file_name, hit.job_id)?;
                writeln!(output, "```")?;
                writeln!(output, "{}", hit.snippet)?;
                writeln!(output, "```\n")?;
            }
            Ok(())
        })
    }

    fn format_answer(&self, question: &str, answer: &Answer) -> String {
        render(|output| {
            writeln!(output, "## {}\n", question)?;
            writeln!(output, "{}\n", answer.answer)?;
            if !answer.sources.is_empty() {
                writeln!(output, "### Sources\n")?;
                writeln!(output, "| # | File | Job | Score |")?;
                writeln!(output, "|---|------|-----|-------|")?;
                for (i, source) in answer.sources.iter().enumerate() {
                    writeln!(
                        output,
                        "| {} | `{}` | `{}` | {:.3} |",
                        i + 1,
                        source.file_name,
                        source.job_id,
                        source.score
                    )?;
                }
            }
            Ok(())
        })
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        render(|output| {
            writeln!(output, "## Status\n")?;

            let daemon_status = if status.daemon_running { "✅" } else { "❌" };
            writeln!(output, "### Daemon {}\n", daemon_status)?;
            writeln!(output, "- **Socket:** `{}`", status.socket_path)?;
            if let Some(pid) = status.pid {
                writeln!(output, "- **PID:** {}", pid)?;
            }
            if let Some(ref m) = status.metrics {
                writeln!(output, "- **Requests:** {}", m.total_requests)?;
                writeln!(output, "- **Avg Latency:** {}ms", m.avg_latency_ms)?;
                if m.error_rate > 0.0 {
                    writeln!(output, "- **Error Rate:** {:.1}%", m.error_rate)?;
                }
            }
            writeln!(output)?;
            output.push_str(&self.format_index_status(&status.index));
            Ok(())
        })
    }

    fn format_index_status(&self, status: &IndexStatus) -> String {
        render(|output| {
            writeln!(output, "### Index\n")?;
            writeln!(output, "| Field | Value |")?;
            writeln!(output, "|-------|-------|")?;
            writeln!(output, "| Directory | `{}` |", status.index_dir)?;
            writeln!(output, "| Scheme | `{}` |", status.scheme)?;
            if let Some(ref stale) = status.stale_scheme {
                writeln!(output, "| Stored scheme | `{}` (rebuild pending) |", stale)?;
            }
            writeln!(output, "| Generation | {} |", status.generation)?;
            writeln!(output, "| Chunks | {} |", status.entries)?;
            writeln!(output, "| Jobs | {} |", status.jobs)?;
            if let Some(vocabulary) = status.vocabulary {
                writeln!(output, "| Vocabulary | {} |", vocabulary)?;
            }
            Ok(())
        })
    }

    fn format_ingest_stats(&self, stats: &IngestStats) -> String {
        render(|output| {
            writeln!(output, "## Ingest Complete\n")?;
            writeln!(output, "| Metric | Value |")?;
            writeln!(output, "|--------|-------|")?;
            writeln!(output, "| Job | `{}` |", stats.job_id)?;
            writeln!(output, "| Files scanned | {} |", stats.files_scanned)?;
            writeln!(output, "| Files indexed | {} |", stats.files_indexed)?;
            writeln!(output, "| Files skipped | {} |", stats.files_skipped)?;
            writeln!(output, "| Chunks created | {} |", stats.chunks_created)?;
            writeln!(output, "| Summary chunks | {} |", stats.summary_chunks)?;
            writeln!(output, "| Skipped cells | {} |", stats.skipped_cells)?;
            writeln!(output, "| Skipped rows | {} |", stats.skipped_rows)?;
            writeln!(output, "| Skipped bytes | {} |", stats.skipped_bytes)?;
            writeln!(output, "| Duration | {}ms |", stats.duration_ms)?;
            Ok(())
        })
    }

    fn format_health(&self, health: &Health) -> String {
        format!("**{}** at `{}`\n", health.status, health.now.to_rfc3339())
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchHit;

    fn results() -> SearchResults {
        SearchResults::new(
            "kestrel".to_string(),
            ScoreKind::Distance,
            vec![SearchHit {
                chunk_id: "c1".to_string(),
                job_id: "j1".to_string(),
                file_name: "birds.txt".to_string(),
                score: 0.25,
                snippet: "the kestrel hovered".to_string(),
            }],
            3,
        )
    }

    #[test]
    fn test_text_search_results_label_distance() {
        let text = TextFormatter.format_search_results(&results());
        assert!(text.contains("1. [Distance: 0.250]"));
        assert!(text.contains("File: birds.txt (job j1)"));
        assert!(text.contains("   the kestrel hovered"));
    }

    #[test]
    fn test_json_answer_is_machine_readable() {
        let answer = Answer {
            answer: "the kestrel hovered".to_string(),
            sources: results().hits,
        };
        let json = JsonFormatter::new(false).format_answer("kestrel", &answer);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["answer"], "the kestrel hovered");
        assert_eq!(value["sources"][0]["chunk_id"], "c1");
    }

    #[test]
    fn test_empty_results_message() {
        let empty = SearchResults::new("q".to_string(), ScoreKind::Similarity, vec![], 0);
        assert_eq!(TextFormatter.format_search_results(&empty), "No results found for: q\n");
        assert!(MarkdownFormatter.format_search_results(&empty).starts_with("## No results"));
    }
}
