//! Web intelligence digest: an analyst write-up of aggregated source material,
//! mailed as HTML.

use chrono::NaiveDate;

pub const ANALYST_PROMPT: &str = "You are a senior research analyst. Write a crisp HTML email with:\n\
- Title with today's date\n\
- Executive summary in 5 to 8 bullets\n\
- Sections grouped by domain or topic\n\
- A short 'What to watch next' list\n\
Avoid hallucinations. If a claim is uncertain, mark it as unconfirmed.\n\
Use semantic <h2>, <h3>, <ul>, <li>, <p>, <table> when useful.";

pub const DEFAULT_SUBJECT: &str = "Daily Web Intel";
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

const EMPTY_REPLY: &str = "<p>No response text produced.</p>";

/// Turns the model reply into a complete HTML document.
///
/// A reply that already contains an `<html` tag is sent as is; anything else
/// is wrapped under a dated heading. The reply is trusted markup and is not
/// escaped.
pub fn digest_document(reply: &str, today: NaiveDate) -> String {
    let text = if reply.trim().is_empty() {
        EMPTY_REPLY
    } else {
        reply
    };
    if text.to_lowercase().contains("<html") {
        return text.to_string();
    }
    format!(
        "<html><body>\n<h1>{DEFAULT_SUBJECT} - {}</h1>\n{text}\n</body></html>",
        today.format("%Y-%m-%d")
    )
}
