//! Turning outcome values into user-facing text.
//!
//! Every helper checks cancellation before failure: a cancelled operation
//! also carries a non-zero code, and must still read as "canceled".

use crate::backend::outcome::{EncryptionResult, OpError, SigningResult};
use crate::util::escape_html;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Canceled,
    Failed,
    Succeeded,
}

pub fn classify(err: &OpError) -> Classification {
    if err.is_canceled() {
        Classification::Canceled
    } else if err.is_err() {
        Classification::Failed
    } else {
        Classification::Succeeded
    }
}

pub fn signing_overview(err: &OpError) -> &'static str {
    match classify(err) {
        Classification::Canceled => "Signing canceled.",
        Classification::Failed => "Signing failed.",
        Classification::Succeeded => "Signing succeeded.",
    }
}

pub fn encryption_overview(err: &OpError) -> &'static str {
    match classify(err) {
        Classification::Canceled => "Encryption canceled.",
        Classification::Failed => "Encryption failed.",
        Classification::Succeeded => "Encryption succeeded.",
    }
}

/// Escaped error text, or empty on success.
pub fn signing_details(result: &SigningResult) -> String {
    if result.error().is_err() {
        escape_html(&result.error().to_string())
    } else {
        String::new()
    }
}

/// Escaped error text, or a success sentence.
pub fn encryption_details(result: &EncryptionResult) -> String {
    if result.error().is_err() {
        escape_html(&result.error().to_string())
    } else {
        "Encryption succeeded.".to_string()
    }
}

/// `input &rarr; output`, striking through files that no longer exist.
pub fn format_io_label(input: &str, output: &str, input_deleted: bool, output_deleted: bool) -> String {
    let strike = |text: &str, deleted: bool| {
        if deleted {
            format!("<s>{}</s>", escape_html(text))
        } else {
            escape_html(text)
        }
    };
    format!(
        "{} &rarr; {}",
        strike(input, input_deleted),
        strike(output, output_deleted)
    )
}

/// Emphasize an overview sentence.
pub fn make_overview(text: &str) -> String {
    format!("<b>{}</b>", text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::outcome::codes;

    #[test]
    fn cancellation_wins_over_failure() {
        assert_eq!(classify(&OpError::canceled()), Classification::Canceled);
        assert_eq!(
            classify(&OpError::new(codes::GENERAL, "boom")),
            Classification::Failed
        );
        assert_eq!(classify(&OpError::none()), Classification::Succeeded);
    }

    #[test]
    fn overviews_follow_classification() {
        assert_eq!(signing_overview(&OpError::canceled()), "Signing canceled.");
        assert_eq!(
            encryption_overview(&OpError::new(codes::NO_PUBKEY, "")),
            "Encryption failed."
        );
        assert_eq!(signing_overview(&OpError::none()), "Signing succeeded.");
    }

    #[test]
    fn details_escape_error_text() {
        let failed = SigningResult::failed(OpError::new(codes::GENERAL, "bad <key>"));
        assert_eq!(signing_details(&failed), "bad &lt;key&gt;");
        assert_eq!(signing_details(&SigningResult::default()), "");
        assert_eq!(
            encryption_details(&EncryptionResult::default()),
            "Encryption succeeded."
        );
    }

    #[test]
    fn io_label_strikes_through_missing_files() {
        assert_eq!(
            format_io_label("a.txt", "a.txt.asc", false, false),
            "a.txt &rarr; a.txt.asc"
        );
        assert_eq!(
            format_io_label("a&b", "out", true, true),
            "<s>a&amp;b</s> &rarr; <s>out</s>"
        );
    }
}
