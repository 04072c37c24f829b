//! Display-safe rendering of raw modem bytes.

const BACKSPACE: u8 = 0x08;
const DEL: u8 = 0x7f;

/// Renders modem bytes as printable text.
///
/// The top bit of every byte is masked. CR, LF, TAB and backspace pass
/// through; other control bytes become `^` followed by the byte plus `0x40`
/// (`^@`, `^A`, ...), and DEL becomes `^?`.
#[must_use]
pub fn sanitize(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        let byte = byte & 0x7f;
        match byte {
            b'\r' | b'\n' | b'\t' | BACKSPACE => out.push(char::from(byte)),
            DEL => out.push_str("^?"),
            0x00..=0x1f => {
                out.push('^');
                out.push(char::from(byte + 0x40));
            }
            _ => out.push(char::from(byte)),
        }
    }
    out
}
