// crates/core/src/nlsql/prompt.rs
//! Prompt construction for translation and answer composition.

use crate::nlsql::timerange::TimeRange;
use crate::types::ChatTurn;

/// System prompt for the translation call.
pub const SQL_SYSTEM_PROMPT: &str =
    "You are a SQL expert that converts natural language questions about LLM gateway usage into read-only SQLite queries.";

/// System prompt for the answer-composition call.
pub const ANSWER_SYSTEM_PROMPT: &str =
    "You are an analytics assistant. Answer the user's question using only the query result provided.";

/// Default number of trailing conversation turns included in prompts.
pub const DEFAULT_HISTORY_TURNS: usize = 8;

/// Render the trailing `limit` turns of history for inclusion in a prompt.
pub fn format_history(history: &[ChatTurn], limit: usize) -> String {
    if history.is_empty() {
        return "No prior conversation.".to_string();
    }
    let start = history.len().saturating_sub(limit);
    history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_clock(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Build the translation prompt: fixed instructions, schema grounding,
/// bounded conversation history, and the current question.
pub fn build_sql_prompt(
    question: &str,
    history: &[ChatTurn],
    history_limit: usize,
    schema_text: &str,
    range: TimeRange,
    now: i64,
) -> String {
    format!(
        "Convert the user's question into a single SQLite query against the usage analytics database.\n\
         Only output the SQL query. Do not include any explanations or markdown formatting.\n\
         \n\
         Database schema:\n\
         {schema_text}\n\
         \n\
         Rules:\n\
         1. Emit exactly one read-only statement (SELECT, optionally with CTEs). Never write or alter data.\n\
         2. Only the tables described above exist. Do not reference any other table.\n\
         3. All timestamps are integer seconds since epoch, UTC.\n\
         4. For relative time ranges write `BETWEEN {{start_ts}} AND {{end_ts}}` against the relevant time column; the placeholders are replaced with the resolved window before execution.\n\
         5. Model names are case-sensitive.\n\
         6. rpm and tpm are precomputed per bucket; average them over a range with AVG().\n\
         7. A vendor is a prefix of the channel name; match vendors with LIKE 'vendor%' on channel_name.\n\
         8. The current time is {now} ({clock}). The active time window is {start}..{end}.\n\
         \n\
         Conversation history:\n\
         {history}\n\
         \n\
         Current user question: {question}\n\
         \n\
         SQL query:",
        schema_text = schema_text,
        now = now,
        clock = format_clock(now),
        start = range.start,
        end = range.end,
        history = format_history(history, history_limit),
        question = question,
    )
}

/// Build the answer-composition prompt wrapping a formatted query result.
pub fn build_answer_prompt(question: &str, result_text: &str) -> String {
    format!(
        "The user asked: {question}\n\
         \n\
         The query returned:\n\
         {result_text}\n\
         \n\
         Write a concise answer to the question using only these results. \
         If the result is tabular, give a one-sentence summary followed by the table verbatim. \
         Do not mention SQL or the database."
    )
}
