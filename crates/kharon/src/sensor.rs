//! Sensor packet ingest (spec §6): a TCP listener that accepts headered
//! modality payloads (IMU, optical, GPS) and forwards decoded samples
//! to the route-controller loop.
//!
//! Grounded on `core/include/external/postmaster.h`'s sibling sensor
//! header layout and wire-compatible with
//! [`kharon_core::wire::SensorPacketHeader`].

use deku::prelude::*;
use kharon_core::streams::Vector3;
use kharon_core::wire::{sensor_type, SensorPacketHeader};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One decoded sensor sample, tagged by modality, ready to feed into
/// the owning stream (`ResampledVectorStream` for IMU, a latest-value
/// store for the rest).
#[derive(Debug, Clone)]
pub enum SensorSample {
    Imu { timestamp_sec: f64, sample: Vector3 },
    OpticalFrame { timestamp_sec: f64, width: u32, height: u32, bytes: Vec<u8> },
    Gps { timestamp_sec: f64, sentence: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed sensor header: {0}")]
    Decode(String),
    #[error("unrecognized sensor type {0:#x}")]
    UnknownSensorType(u32),
}

fn parse_ascii_timestamp(bytes: &[u8]) -> f64 {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(0.0)
}

fn decode_imu_payload(payload: &[u8]) -> Option<Vector3> {
    if payload.len() < 24 {
        return None;
    }
    let mut v = [0.0f64; 3];
    for (i, chunk) in payload[..24].chunks_exact(8).enumerate() {
        v[i] = f64::from_be_bytes(chunk.try_into().ok()?);
    }
    Some(v)
}

async fn read_sample(socket: &mut TcpStream) -> Result<SensorSample, SensorError> {
    let mut header_buf = [0u8; 4 + 8 + 20 + 20 + 64];
    socket.read_exact(&mut header_buf).await?;
    let (_, header) = SensorPacketHeader::from_bytes((&header_buf, 0))
        .map_err(|e| SensorError::Decode(e.to_string()))?;
    let timestamp_sec = parse_ascii_timestamp(&header.timestamp_ascii);

    match header.sensor_type {
        sensor_type::IMU => {
            let mut payload = [0u8; 24];
            socket.read_exact(&mut payload).await?;
            let sample = decode_imu_payload(&payload)
                .ok_or_else(|| SensorError::Decode("short IMU payload".into()))?;
            Ok(SensorSample::Imu { timestamp_sec, sample })
        }
        sensor_type::VY_IMAGE => {
            let mut dims = [0u8; 8];
            socket.read_exact(&mut dims).await?;
            let width = u32::from_be_bytes(dims[0..4].try_into().unwrap());
            let height = u32::from_be_bytes(dims[4..8].try_into().unwrap());
            let mut bytes = vec![0u8; (width as usize) * (height as usize)];
            socket.read_exact(&mut bytes).await?;
            Ok(SensorSample::OpticalFrame { timestamp_sec, width, height, bytes })
        }
        sensor_type::GPS => {
            let mut len_buf = [0u8; 4];
            socket.read_exact(&mut len_buf).await?;
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut sentence_bytes = vec![0u8; len];
            socket.read_exact(&mut sentence_bytes).await?;
            let sentence = String::from_utf8_lossy(&sentence_bytes).into_owned();
            Ok(SensorSample::Gps { timestamp_sec, sentence })
        }
        other => Err(SensorError::UnknownSensorType(other)),
    }
}

pub async fn run(port: u16, samples: mpsc::Sender<SensorSample>) -> Result<(), SensorError> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "sensor ingest listening");
    loop {
        let (socket, peer) = listener.accept().await?;
        let samples = samples.clone();
        tokio::spawn(async move {
            let mut socket = socket;
            loop {
                match read_sample(&mut socket).await {
                    Ok(sample) => {
                        if samples.send(sample).await.is_err() {
                            break;
                        }
                    }
                    Err(SensorError::UnknownSensorType(t)) => {
                        warn!(sensor_type = format!("{t:#x}"), "sensor ingest: unrecognized type, dropping connection");
                        break;
                    }
                    Err(e) => {
                        warn!(%peer, error = %e, "sensor ingest: connection closed");
                        break;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_imu_payload_as_three_f64s() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1.0f64.to_be_bytes());
        payload.extend_from_slice(&2.0f64.to_be_bytes());
        payload.extend_from_slice(&3.0f64.to_be_bytes());
        let v = decode_imu_payload(&payload).unwrap();
        assert_eq!(v, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn short_imu_payload_is_rejected() {
        assert!(decode_imu_payload(&[0u8; 4]).is_none());
    }

    #[test]
    fn parses_nul_terminated_ascii_timestamp() {
        let mut bytes = [0u8; 20];
        bytes[..5].copy_from_slice(b"12.50");
        assert_eq!(parse_ascii_timestamp(&bytes), 12.5);
    }
}
