//! Parser for ftp client transcripts
//!
//! The interactive client exits 0 even when individual commands fail, so success is decided
//! from the server replies it echoes in verbose mode.

/// Client messages that mean the session never got going
const CLIENT_FAILURES: &[&str] = &[
    "login incorrect",
    "not connected",
    "unknown host",
    "connection refused",
    "connection timed out",
    "no such file or directory",
];

/// Check a transcript for failed commands
///
/// Returns the first offending line: a 4xx/5xx server reply or a client-side failure.
/// A non-zero exit status without such a line is reported with the last stderr line.
pub fn check_transcript(stdout: &[u8], stderr: &[u8], success: bool) -> Result<(), String> {
    // Listings and banners may carry EBCDIC leftovers
    let output = String::from_utf8_lossy(stdout);
    let error_output = String::from_utf8_lossy(stderr);

    for line in output.lines().chain(error_output.lines()) {
        let line = line.trim();
        if is_error_reply(line) {
            return Err(line.to_string());
        }
        let lower = line.to_ascii_lowercase();
        if CLIENT_FAILURES.iter().any(|failure| lower.contains(failure)) {
            return Err(line.to_string());
        }
    }

    if success {
        Ok(())
    } else {
        Err(error_output
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(|line| line.trim().to_string())
            .unwrap_or_else(|| "ftp exited with a failure status".to_string()))
    }
}

/// Whether a line is a transient or permanent negative reply (`4xx`/`5xx`)
fn is_error_reply(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() >= 3
        && matches!(bytes[0], b'4' | b'5')
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit()
        && bytes.get(3).is_none_or(|b| *b == b' ' || *b == b'-')
}
