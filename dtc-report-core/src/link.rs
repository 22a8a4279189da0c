//! Finding the vendor report behind a notification email.

use regex::Regex;
use std::sync::LazyLock;

static REPORT_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>]*topdon[^\s"'<>]*"#).expect("static regex must compile")
});

const VENDOR_SENDER: &str = "report-noreply@topdondiagnostics.com";
const VENDOR_SUBJECTS: [&str; 2] = ["raport de diagnosticare", "diagnostic report"];

/// First TOPDON report URL in an HTML or plain-text email body.
///
/// HTML-escaped ampersands (`&amp;`) inside the link are decoded.
pub fn extract_report_link(body: &str) -> Option<String> {
    REPORT_LINK_RE
        .find(body)
        .map(|m| m.as_str().replace("&amp;", "&"))
}

/// Whether a message looks like a TOPDON report notification.
pub fn is_vendor_report_mail(from: &str, subject: &str) -> bool {
    let from = from.to_lowercase();
    let subject = subject.to_lowercase();
    from.contains(VENDOR_SENDER)
        || from.contains("topdon")
        || VENDOR_SUBJECTS.iter().any(|s| subject.contains(s))
}
