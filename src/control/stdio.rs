//! Line output for the control plane.
//!
//! - **stdout**: notifications, one JSON document per line
//! - **stderr**: logs
//!
//! Lines end in a bare `\n` on every platform and are flushed at once.

use std::io::Write;

/// Write `line` plus `\n` to `out` and flush.
pub fn write_line<W: Write>(out: &mut W, line: &str) -> std::io::Result<()> {
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Write a line to locked stdout.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_line(&mut handle, line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_line_appends_newline() {
        let mut out = Vec::new();
        write_line(&mut out, r#"{"method":"$ready"}"#).unwrap();
        write_line(&mut out, "second").unwrap();
        assert_eq!(out, b"{\"method\":\"$ready\"}\nsecond\n");
    }
}
