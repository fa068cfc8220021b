pub mod debounce;

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::MessageKind;

pub use debounce::Debouncer;

lazy_static! {
    static ref POLL_RE: Regex = Regex::new(r"^\s*/poll(\s|$)").unwrap();
    static ref FENCE_RE: Regex = Regex::new(r"```").unwrap();
    static ref INLINE_CODE_RE: Regex = Regex::new(r"`[^`\n]+`").unwrap();
    static ref SOURCE_LINE_RE: Regex = Regex::new(
        r"(?m)^\s*(fn|let|const|def|class|import|pub|use|impl|function|return)\s+\S+.*(?:[=({]|::).*[;:{)]\s*$"
    )
    .unwrap();
    static ref LINK_RE: Regex = Regex::new(r"(?i)\bhttps?://[^\s/$.?#][^\s]*").unwrap();
}

/// Detects what kind of content a chat line carries.
/// Precedence is poll, then code, then link, then plain text.
pub fn classify(text: &str) -> MessageKind {
    if POLL_RE.is_match(text) {
        MessageKind::Poll
    } else if FENCE_RE.is_match(text) || INLINE_CODE_RE.is_match(text) || SOURCE_LINE_RE.is_match(text) {
        MessageKind::Code
    } else if LINK_RE.is_match(text) {
        MessageKind::Link
    } else {
        MessageKind::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text() {
        assert_eq!(classify("hello there"), MessageKind::Text);
        assert_eq!(classify(""), MessageKind::Text);
        assert_eq!(classify("   "), MessageKind::Text);
        assert_eq!(classify("let's meet at noon"), MessageKind::Text);
        // Keyword-led prose without code punctuation
        assert_eq!(classify("pub quiz tonight :)"), MessageKind::Text);
        assert_eq!(classify("class starts at 9:"), MessageKind::Text);
        assert_eq!(classify("return the books by friday;"), MessageKind::Text);
    }

    #[test]
    fn links() {
        assert_eq!(classify("see https://example.com/docs"), MessageKind::Link);
        assert_eq!(classify("HTTP://EXAMPLE.ORG"), MessageKind::Link);
        assert_eq!(classify("ftp://nope.example"), MessageKind::Text);
    }

    #[test]
    fn code() {
        assert_eq!(classify("```\nfn main() {}\n```"), MessageKind::Code);
        assert_eq!(classify("run `cargo fmt` first"), MessageKind::Code);
        assert_eq!(classify("let x = 5;"), MessageKind::Code);
        assert_eq!(classify("def handler(event):"), MessageKind::Code);
        assert_eq!(classify("use std::io;"), MessageKind::Code);
    }

    #[test]
    fn polls() {
        assert_eq!(classify("/poll Lunch? | pizza | sushi"), MessageKind::Poll);
        assert_eq!(classify("/poll"), MessageKind::Poll);
        assert_eq!(classify("/polling is not a command"), MessageKind::Text);
    }

    #[test]
    fn precedence() {
        assert_eq!(classify("/poll which `crate` | https://a.io | b"), MessageKind::Poll);
        assert_eq!(classify("`curl https://example.com`"), MessageKind::Code);
    }
}
