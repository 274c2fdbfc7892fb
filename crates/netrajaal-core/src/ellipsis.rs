//! Trace-log formatting helper: elides an overlong payload to its first and
//! last 100 bytes, matching the original firmware's `ellepsis()`.

use core::fmt;
use core::fmt::Write as _;

pub struct Ellipsized<'a>(&'a [u8]);

impl fmt::Display for Ellipsized<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() <= 200 {
            write_ascii(f, self.0)
        } else {
            write_ascii(f, &self.0[..100])?;
            f.write_str(".......")?;
            write_ascii(f, &self.0[self.0.len() - 100..])
        }
    }
}

fn write_ascii(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            f.write_char(b as char)?;
        } else {
            f.write_char('.')?;
        }
    }
    Ok(())
}

pub fn ellipsize(payload: &[u8]) -> Ellipsized<'_> {
    Ellipsized(payload)
}
