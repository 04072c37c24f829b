//! Baud rate names understood by [`Device::configure`](crate::Device::configure).

use crate::Error;
use libc::speed_t;

/// How a baud rate is programmed into the line discipline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineSpeed {
    /// One of the discrete `B*` rates of the termios interface.
    Standard(speed_t),
    /// An arbitrary integer rate, set through the `BOTHER` path.
    Custom(u32),
}

/// Serial interface baud rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BaudRateEntry {
    /// Name used on the command line. `None` only for the table terminator.
    pub name: Option<&'static str>,
    /// Line discipline setting for this rate.
    pub speed: LineSpeed,
}

impl BaudRateEntry {
    const SENTINEL: Self = Self {
        name: None,
        speed: LineSpeed::Standard(libc::B0),
    };

    const fn standard(name: &'static str, speed: speed_t) -> Self {
        Self {
            name: Some(name),
            speed: LineSpeed::Standard(speed),
        }
    }

    const fn custom(name: &'static str, rate: u32) -> Self {
        Self {
            name: Some(name),
            speed: LineSpeed::Custom(rate),
        }
    }

    /// Returns the entry name, empty for the terminator.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name.unwrap_or_default()
    }

    /// Returns `true` if the rate needs the non-standard configuration path.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self.speed, LineSpeed::Custom(_))
    }
}

// Terminated by exactly one unnamed entry.
static TABLE: [BaudRateEntry; 8] = [
    BaudRateEntry::standard("115200", libc::B115200),
    BaudRateEntry::standard("57600", libc::B57600),
    BaudRateEntry::standard("38400", libc::B38400),
    BaudRateEntry::standard("19200", libc::B19200),
    BaudRateEntry::custom("812500", 812_500),
    BaudRateEntry::custom("406250", 406_250),
    BaudRateEntry::custom("203125", 203_125),
    BaudRateEntry::SENTINEL,
];

/// Iterates over the named entries, stopping at the terminator.
pub fn entries() -> impl Iterator<Item = &'static BaudRateEntry> {
    TABLE.iter().take_while(|entry| entry.name.is_some())
}

/// Looks up a baud rate by its exact, case-sensitive name.
pub fn find(name: &str) -> Result<&'static BaudRateEntry, Error> {
    entries()
        .find(|entry| entry.name == Some(name))
        .ok_or_else(|| Error::UnknownBaudRate(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_returns_first_entry() {
        let entry = find("115200").unwrap();
        assert!(std::ptr::eq(entry, &TABLE[0]));
        assert_eq!(entry.speed, LineSpeed::Standard(libc::B115200));
    }

    #[test]
    fn unknown_rate_is_rejected() {
        let err = find("999999").unwrap_err();
        assert!(matches!(err, Error::UnknownBaudRate(ref name) if name == "999999"));
        assert!(err.to_string().contains("not known"));
    }

    #[test]
    fn lookup_is_case_and_whitespace_sensitive() {
        assert!(find(" 115200").is_err());
        assert!(find("115200\n").is_err());
        assert!(find("").is_err());
    }

    #[test]
    fn exactly_one_terminator_at_the_end() {
        let unnamed = TABLE.iter().filter(|entry| entry.name.is_none()).count();
        assert_eq!(unnamed, 1);
        assert!(TABLE[TABLE.len() - 1].name.is_none());
        assert_eq!(entries().count(), TABLE.len() - 1);
    }

    #[test]
    fn high_speed_rates_use_custom_path() {
        for name in ["812500", "406250", "203125"] {
            let entry = find(name).unwrap();
            assert!(entry.is_custom(), "{name}");
            assert_eq!(entry.speed, LineSpeed::Custom(name.parse().unwrap()));
        }
        for name in ["115200", "57600", "38400", "19200"] {
            assert!(!find(name).unwrap().is_custom(), "{name}");
        }
    }
}
