//! GPS ingest (spec §6): reads NMEA sentences off a 4800 8N1 serial
//! line, validates the XOR checksum, and forwards `<timestamp>
//! <sentence>` lines to a TCP endpoint in 256-byte blocks.
//!
//! Serial access is via `tokio-serial`, the async serial crate used
//! for GPS/u-blox work elsewhere in the pack (the donor has no serial
//! dependency of its own).

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, warn};

pub const BAUD_RATE: u32 = 4800;
pub const FORWARD_BLOCK_SIZE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum GpsError {
    #[error("serial io error: {0}")]
    Serial(#[from] std::io::Error),
}

/// Extracts the body and checksum from a `$...*HH` sentence. Returns
/// `None` if the sentence isn't well formed (no `$`, no `*HH` tail) —
/// the caller should drop malformed input and continue (spec §7,
/// Protocol violation: "drop the packet, log at WARN, continue").
pub fn split_sentence(line: &str) -> Option<(&str, u8)> {
    let dollar = line.find('$')?;
    let rest = &line[dollar + 1..];
    let star = rest.find('*')?;
    let body = &rest[..star];
    let checksum_hex = rest.get(star + 1..star + 3)?;
    let checksum = u8::from_str_radix(checksum_hex, 16).ok()?;
    Some((body, checksum))
}

pub fn xor_checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

pub fn validate_sentence(line: &str) -> Option<&str> {
    let (body, checksum) = split_sentence(line)?;
    if xor_checksum(body) == checksum {
        Some(body)
    } else {
        None
    }
}

fn timestamped_line(sentence: &str) -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
    format!("{:.4} {}\n", now, sentence)
}

/// Reads NMEA sentences from `device`, validates them, and forwards
/// timestamped, valid sentences to `forward_to` in 256-byte blocks.
/// Transient I/O (serial gap, forward socket reset) retries with
/// exponential backoff rather than exiting (spec §7, Transient I/O).
pub async fn run(device: &str, forward_to: &str) -> Result<(), GpsError> {
    let mut backoff = std::time::Duration::from_millis(250);
    loop {
        match run_once(device, forward_to).await {
            Ok(()) => backoff = std::time::Duration::from_millis(250),
            Err(e) => {
                warn!(%device, error = %e, ?backoff, "gps ingest: transient failure, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(std::time::Duration::from_secs(30));
            }
        }
    }
}

async fn run_once(device: &str, forward_to: &str) -> Result<(), GpsError> {
    let mut port = tokio_serial::new(device, BAUD_RATE).open_native_async()?;
    let mut forward = TcpStream::connect(forward_to).await?;
    info!(%device, %forward_to, "gps ingest connected");

    let mut line_buf = Vec::new();
    let mut byte = [0u8; 1];
    let mut pending = Vec::new();

    loop {
        port.read_exact(&mut byte).await?;
        if byte[0] == b'\n' {
            let line = String::from_utf8_lossy(&line_buf).trim().to_string();
            line_buf.clear();
            match validate_sentence(&line) {
                Some(_body) => {
                    pending.extend_from_slice(timestamped_line(&line).as_bytes());
                    while pending.len() >= FORWARD_BLOCK_SIZE {
                        let block: Vec<u8> = pending.drain(..FORWARD_BLOCK_SIZE).collect();
                        forward.write_all(&block).await?;
                    }
                }
                None => warn!(%line, "gps ingest: checksum failure, dropping sentence"),
            }
        } else if byte[0] != b'\r' {
            line_buf.push(byte[0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_well_formed_sentence() {
        let (body, checksum) = split_sentence("$GPGGA,123519*47").unwrap();
        assert_eq!(body, "GPGGA,123519");
        assert_eq!(checksum, 0x47);
    }

    #[test]
    fn validates_correct_checksum() {
        let body = "GPGGA,123519";
        let checksum = xor_checksum(body);
        let line = format!("${body}*{checksum:02X}");
        assert_eq!(validate_sentence(&line), Some(body));
    }

    #[test]
    fn rejects_incorrect_checksum() {
        let line = "$GPGGA,123519*00";
        assert_eq!(validate_sentence(line), None);
    }

    #[test]
    fn rejects_sentence_with_no_star() {
        assert!(split_sentence("$GPGGA,123519").is_none());
    }
}
