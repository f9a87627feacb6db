//! Terminal control sequence stripping.
//!
//! The doorbell firmware echoes its serial console onto `doorbell/debug`, so
//! JSON payloads regularly arrive wrapped in colour codes.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// ESC followed by either a single byte in `@-Z` / `\-_`, or a CSI sequence:
/// `[`, parameter bytes `0-?`, intermediate bytes ` -/`, final byte `@-~`.
const ANSI_ESCAPE: &str = r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])";

fn ansi_escape() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(ANSI_ESCAPE).expect("ANSI escape pattern is valid"))
}

/// Remove ANSI/VT100 escape sequences from `text`.
///
/// Returns the input unchanged (borrowed) when it contains no sequences.
/// Stripping repeats until nothing matches: removing `ESC[1m` from
/// `"\x1b\x1b[1m[0m"` leaves a fresh `ESC[0m` behind, and a second call
/// must not find anything left to strip.
pub fn strip_control_sequences(text: &str) -> Cow<'_, str> {
    let pattern = ansi_escape();
    let mut current = Cow::Borrowed(text);

    loop {
        let stripped = match pattern.replace_all(&current, "") {
            Cow::Borrowed(_) => None,
            Cow::Owned(stripped) => Some(stripped),
        };
        match stripped {
            Some(next) => current = Cow::Owned(next),
            None => return current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_colour_codes() {
        let colored = "\x1b[31mError:\x1b[0m Something happened";
        assert_eq!(strip_control_sequences(colored), "Error: Something happened");
    }

    #[test]
    fn test_clean_text_is_borrowed() {
        let clean = r#"{"adc1_v":1.2,"adc2_v":0.4,"delta":15}"#;
        let stripped = strip_control_sequences(clean);
        assert!(matches!(stripped, Cow::Borrowed(_)));
        assert_eq!(stripped, clean);
    }

    #[test]
    fn test_clean_inputs_unchanged() {
        for text in [
            "",
            "plain debug line",
            "brackets [31m without escape",
            "unicode 🔔 bell",
            "tab\tand\nnewline",
        ] {
            assert_eq!(strip_control_sequences(text), text);
        }
    }

    #[test]
    fn test_two_byte_escapes() {
        // ESC 7 / ESC 8 are not in the grammar; ESC M (reverse index) and ESC \ are
        assert_eq!(strip_control_sequences("a\x1bMb"), "ab");
        assert_eq!(strip_control_sequences("a\x1b\\b"), "ab");
        assert_eq!(strip_control_sequences("a\x1b_b"), "ab");
    }

    #[test]
    fn test_csi_with_parameters_and_intermediates() {
        assert_eq!(strip_control_sequences("\x1b[1;32;40mok\x1b[0m"), "ok");
        assert_eq!(strip_control_sequences("\x1b[2Jcleared"), "cleared");
        assert_eq!(strip_control_sequences("\x1b[?25lhidden"), "hidden");
        assert_eq!(strip_control_sequences("x\x1b[1 qy"), "xy");
    }

    #[test]
    fn test_wrapped_json() {
        let payload = "\x1b[0;32m{\"status\":\"started\"}\x1b[0m\r";
        assert_eq!(strip_control_sequences(payload), "{\"status\":\"started\"}\r");
    }

    #[test]
    fn test_unterminated_sequence_left_alone() {
        // No final byte, so nothing matches
        assert_eq!(strip_control_sequences("tail\x1b[12"), "tail\x1b[12");
    }

    #[test]
    fn test_idempotent_when_removal_splices_new_sequence() {
        let tricky = "\x1b\x1b[1m[0mtext";
        let once = strip_control_sequences(tricky).into_owned();
        let twice = strip_control_sequences(&once).into_owned();
        assert_eq!(once, "text");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_idempotent_on_mixed_inputs() {
        for text in [
            "\x1b[31mred\x1b[0m",
            "\x1b\x1b\x1b[1m[2m[3mdeep",
            "\x1b",
            "\x1b[",
            "ok \x1b[38;5;208morange\x1b[39m done",
        ] {
            let once = strip_control_sequences(text).into_owned();
            assert_eq!(strip_control_sequences(&once), once, "input {text:?}");
        }
    }
}
