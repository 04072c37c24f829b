//! Final result classification.

use std::fmt;

/// Outcome carried by the line that terminates a modem reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FinalResult {
    /// `OK`
    Ok,
    /// `ERROR`
    Error,
    /// `BUSY`
    Busy,
    /// `NO ANSWER`
    NoAnswer,
    /// `NO CARRIER`
    NoCarrier,
    /// `NO DIALTONE`
    NoDialtone,
    /// `RING`, the unsolicited incoming call notification.
    Ring,
    /// `+CME ERROR: <err>`
    CmeError,
    /// `+CMS ERROR: <err>`
    CmsError,
    /// Not a final line, more data is expected.
    Continue,
}

impl FinalResult {
    /// Returns `true` for every variant except [`FinalResult::Continue`].
    #[must_use]
    pub fn is_final(self) -> bool {
        self != Self::Continue
    }

    /// Returns `true` only for [`FinalResult::Ok`].
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Ok
    }

    /// Marker text as sent by the modem.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Busy => "BUSY",
            Self::NoAnswer => "NO ANSWER",
            Self::NoCarrier => "NO CARRIER",
            Self::NoDialtone => "NO DIALTONE",
            Self::Ring => "RING",
            Self::CmeError => "+CME ERROR",
            Self::CmsError => "+CMS ERROR",
            Self::Continue => "CONTINUE",
        }
    }
}

impl fmt::Display for FinalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a single modem line.
///
/// One trailing `\n`, and a `\r` right before it, are ignored. Everything else
/// must match exactly: no trimming, no case folding. Lines that are not a
/// final result marker are [`FinalResult::Continue`].
#[must_use]
pub fn classify(line: &str) -> FinalResult {
    let body = match line.strip_suffix('\n') {
        Some(body) => body.strip_suffix('\r').unwrap_or(body),
        None => line,
    };
    if let Some(info) = body.strip_prefix('+') {
        return if info.starts_with("CME ERROR:") {
            FinalResult::CmeError
        } else if info.starts_with("CMS ERROR:") {
            FinalResult::CmsError
        } else {
            FinalResult::Continue
        };
    }
    match body {
        "OK" => FinalResult::Ok,
        "ERROR" => FinalResult::Error,
        "BUSY" => FinalResult::Busy,
        "NO ANSWER" => FinalResult::NoAnswer,
        "NO CARRIER" => FinalResult::NoCarrier,
        "NO DIALTONE" => FinalResult::NoDialtone,
        "RING" => FinalResult::Ring,
        _ => FinalResult::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_markers() {
        let cases = [
            ("OK\r\n", FinalResult::Ok),
            ("ERROR\r\n", FinalResult::Error),
            ("BUSY\r\n", FinalResult::Busy),
            ("NO ANSWER\r\n", FinalResult::NoAnswer),
            ("NO CARRIER\r\n", FinalResult::NoCarrier),
            ("NO DIALTONE\r\n", FinalResult::NoDialtone),
            ("RING\r\n", FinalResult::Ring),
            ("+CME ERROR: 10\r\n", FinalResult::CmeError),
            ("+CMS ERROR: 500\r\n", FinalResult::CmsError),
        ];
        for (line, expected) in cases {
            assert_eq!(classify(line), expected, "{line:?}");
        }
    }

    #[test]
    fn cr_stripped_and_bare_lines_classify_the_same() {
        assert_eq!(classify("OK\n"), FinalResult::Ok);
        assert_eq!(classify("OK"), FinalResult::Ok);
        assert_eq!(classify("NO CARRIER\n"), FinalResult::NoCarrier);
        assert_eq!(classify("+CME ERROR: SIM not inserted"), FinalResult::CmeError);
    }

    #[test]
    fn case_sensitive() {
        assert_eq!(classify("ok\r\n"), FinalResult::Continue);
        assert_eq!(classify("Ok\r\n"), FinalResult::Continue);
        assert_eq!(classify("ring\r\n"), FinalResult::Continue);
        assert_eq!(classify("+cme error: 10\r\n"), FinalResult::Continue);
    }

    #[test]
    fn near_misses_continue() {
        for line in [
            "OK \r\n",
            " OK\r\n",
            "OKAY\r\n",
            "OK\r\n\n",
            "OK\r",
            "ERRORS\r\n",
            "NO ANSWERS\r\n",
            "NO\r\n",
            "BUSY!\r\n",
            "+CME ERROR 10\r\n",
            "+CSQ: 15,99\r\n",
            "+\r\n",
            "+CMS\r\n",
            "ATZ\r\n",
        ] {
            assert_eq!(classify(line), FinalResult::Continue, "{line:?}");
        }
    }

    #[test]
    fn total_on_odd_input() {
        for line in ["", "\n", "\r\n", "\r", "+", "\u{0}", "é", "\u{7f}OK\r\n"] {
            assert_eq!(classify(line), FinalResult::Continue, "{line:?}");
        }
    }

    #[test]
    fn only_continue_is_not_final() {
        assert!(!FinalResult::Continue.is_final());
        assert!(FinalResult::Ring.is_final());
        assert!(FinalResult::CmsError.is_final());
        assert!(FinalResult::Ok.is_success());
        assert!(!FinalResult::Busy.is_success());
    }
}
