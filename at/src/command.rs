//! Commands the dialer sends and the replies it interprets.

use crate::{Error, Response};
use std::{fmt, str::FromStr};

/// Longest dialable number.
pub const MAX_PHONE_LEN: usize = 512;

/// Validated dial string: digits, `*`, `#` and `+`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Validates `number`, at most [`MAX_PHONE_LEN`] dial pad characters.
    pub fn new(number: &str) -> Result<Self, Error> {
        let valid = !number.is_empty()
            && number.len() <= MAX_PHONE_LEN
            && number
                .bytes()
                .all(|b| b.is_ascii_digit() || matches!(b, b'*' | b'#' | b'+'));
        if valid {
            Ok(Self(number.to_owned()))
        } else {
            Err(Error::InvalidNumber(number.to_owned()))
        }
    }

    /// The dial string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PhoneNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// AT command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `ATZ`, reset to the stored profile.
    Reset,
    /// `ATD<number>;`, voice call.
    Dial(PhoneNumber),
    /// `ATA`
    Answer,
    /// `ATH`
    Hangup,
    /// `AT+CPAS`, phone activity status.
    Status,
    /// Operator supplied command line, sent as is.
    Raw(String),
}

impl Command {
    /// Bytes to put on the line: the command and a single CR.
    #[must_use]
    pub fn to_wire(&self) -> String {
        let mut wire = self.to_string();
        wire.truncate(wire.trim_end_matches(['\r', '\n']).len());
        wire.push('\r');
        wire
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => f.write_str("ATZ"),
            Self::Dial(number) => write!(f, "ATD{number};"),
            Self::Answer => f.write_str("ATA"),
            Self::Hangup => f.write_str("ATH"),
            Self::Status => f.write_str("AT+CPAS"),
            Self::Raw(line) => f.write_str(line),
        }
    }
}

/// Phone activity reported by `+CPAS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhoneActivity {
    /// `0`, ready for commands.
    Ready,
    /// `1`
    Unavailable,
    /// `2`, the modem cannot tell.
    Unknown,
    /// `3`, an incoming call is ringing.
    Ringing,
    /// `4`
    CallInProgress,
    /// `5`
    Asleep,
}

impl PhoneActivity {
    /// Parses the `+CPAS: <pas>` line of a status reply.
    #[must_use]
    pub fn from_response(response: &Response) -> Option<Self> {
        let code = response
            .information()
            .find_map(|line| line.strip_prefix("+CPAS:"))?
            .trim()
            .parse::<u8>()
            .ok()?;
        match code {
            0 => Some(Self::Ready),
            1 => Some(Self::Unavailable),
            2 => Some(Self::Unknown),
            3 => Some(Self::Ringing),
            4 => Some(Self::CallInProgress),
            5 => Some(Self::Asleep),
            _ => None,
        }
    }
}

impl fmt::Display for PhoneActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "ready",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
            Self::Ringing => "ringing",
            Self::CallInProgress => "call in progress",
            Self::Asleep => "asleep",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FinalResult;

    #[test]
    fn wire_format_ends_with_single_cr() {
        let dial = Command::Dial(PhoneNumber::new("99991234").unwrap());
        assert_eq!(dial.to_wire(), "ATD99991234;\r");
        assert_eq!(Command::Reset.to_wire(), "ATZ\r");
        assert_eq!(Command::Answer.to_wire(), "ATA\r");
        assert_eq!(Command::Hangup.to_wire(), "ATH\r");
        assert_eq!(Command::Status.to_wire(), "AT+CPAS\r");
        assert_eq!(Command::Raw("AT+CSQ\r\n".into()).to_wire(), "AT+CSQ\r");
    }

    #[test]
    fn dial_pad_alphabet() {
        assert!(PhoneNumber::new("+5511*31#").is_ok());
        for bad in ["", "123 456", "12a", "1;ATH", "１２３"] {
            assert!(
                matches!(PhoneNumber::new(bad), Err(Error::InvalidNumber(_))),
                "{bad:?}"
            );
        }
        assert!(PhoneNumber::new(&"1".repeat(MAX_PHONE_LEN)).is_ok());
        assert!(PhoneNumber::new(&"1".repeat(MAX_PHONE_LEN + 1)).is_err());
    }

    #[test]
    fn parses_phone_activity() {
        let response = Response::new("+CPAS: 3\nOK\n", FinalResult::Ok);
        assert_eq!(
            PhoneActivity::from_response(&response),
            Some(PhoneActivity::Ringing)
        );
        let response = Response::new("AT+CPAS\n+CPAS:0\nOK\n", FinalResult::Ok);
        assert_eq!(
            PhoneActivity::from_response(&response),
            Some(PhoneActivity::Ready)
        );
        let response = Response::new("+CPAS: 9\nOK\n", FinalResult::Ok);
        assert_eq!(PhoneActivity::from_response(&response), None);
        let response = Response::new("ERROR\n", FinalResult::Error);
        assert_eq!(PhoneActivity::from_response(&response), None);
    }
}
