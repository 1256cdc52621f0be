//! Owner error sink.
//!
//! Any error that escapes an update handler is forwarded to the owner's
//! private chat as an escaped, preformatted report. Best-effort only;
//! a failure to deliver the report is itself just logged.

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::debug;

use crate::format::html_escape;

/// Build the HTML report body for one error.
#[must_use]
pub fn format_report(error: &str) -> String {
    format!(
        "Error occurred while handling an update:\n\n<pre>{}</pre>",
        html_escape(error)
    )
}

/// Send an error report to the owner's private chat.
pub async fn report_error(bot: &Bot, owner_id: i64, error: &anyhow::Error) {
    let report = format_report(&format!("{error:#}"));
    if let Err(e) = bot
        .send_message(ChatId(owner_id), report)
        .parse_mode(ParseMode::Html)
        .await
    {
        debug!(error = %e, "failed to deliver error report to owner");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_is_preformatted() {
        let report = format_report("boom");
        assert!(report.starts_with("Error occurred"));
        assert!(report.contains("<pre>boom</pre>"));
    }

    #[test]
    fn report_escapes_html() {
        let report = format_report("tag <b> & entity");
        assert!(report.contains("&lt;b&gt; &amp; entity"));
        assert!(!report.contains("<pre><b>"));
    }
}
