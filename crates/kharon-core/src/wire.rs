//! Wire formats (§6) shared by the external control plane: postmaster
//! command/response framing, the kill-monitor heartbeat packet, sensor
//! packet headers, and the UDP sync packet. All multi-byte integers are
//! network byte order; the fixed-layout structs are decoded with
//! `deku`, matching the map/beacon storage formats.
//!
//! Grounded on `core/include/external/postmaster.h` and
//! `core/include/external/kill_monitor.h` for field layout.

use deku::prelude::*;

pub mod request_type {
    pub const NULL: u32 = 0;
    pub const ANNOTATION: u32 = 1;
    pub const SHUTDOWN: u32 = 2;
    pub const AUTOPILOT_ON: u32 = 3;
    pub const AUTOPILOT_OFF: u32 = 4;
    pub const SET_HEADING: u32 = 5;
    pub const SET_DESTINATION: u32 = 6;
    pub const MODULE_PAUSE: u32 = 7;
    pub const MODULE_RESUME: u32 = 8;
}

/// Fixed postmaster command header; `header_bytes` of payload follow
/// immediately on the wire and are not part of this struct.
#[derive(Debug, Clone, Copy, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct PostmasterRequest {
    pub request_type: u32,
    pub header_bytes: u32,
    pub custom: [i32; 3],
}

impl PostmasterRequest {
    pub fn set_heading(degrees: i32) -> Self {
        PostmasterRequest { request_type: request_type::SET_HEADING, header_bytes: 0, custom: [degrees, 0, 0] }
    }

    pub fn set_destination(lon_bam32: u32, lat_bam32: u32, radius_m: i32) -> Self {
        PostmasterRequest {
            request_type: request_type::SET_DESTINATION,
            header_bytes: 0,
            custom: [lon_bam32 as i32, lat_bam32 as i32, radius_m],
        }
    }
}

/// `timestamp_ascii` holds a printf `%.4f`-seconds timestamp, NUL-padded
/// to 32 bytes; `response_bytes` of payload follow on the wire.
#[derive(Debug, Clone, Copy, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct PostmasterResponse {
    pub request_type: u32,
    pub response_bytes: u32,
    pub timestamp_ascii: [u8; 32],
    pub custom: [i32; 3],
}

impl PostmasterResponse {
    pub fn with_timestamp(request_type: u32, response_bytes: u32, timestamp_secs: f64, custom: [i32; 3]) -> Self {
        let mut timestamp_ascii = [0u8; 32];
        let text = format!("{:.4}", timestamp_secs);
        let bytes = text.as_bytes();
        let n = bytes.len().min(timestamp_ascii.len());
        timestamp_ascii[..n].copy_from_slice(&bytes[..n]);
        PostmasterResponse { request_type, response_bytes, timestamp_ascii, custom }
    }
}

pub const KILL_MONITOR_PORT: u16 = 9110;
pub const KILL_MONITOR_PACKET_SIZE: usize = 260;
pub const KILL_MONITOR_VERSION: &[u8; 4] = b"001\0";

/// 260-byte kill-monitor packet: a 4-byte ASCII version tag followed by
/// a 256-byte ASCII payload ("alive?", "halt", "reboot").
#[derive(Debug, Clone, Copy, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct KillMonitorPacket {
    pub version: [u8; 4],
    pub payload: [u8; 256],
}

impl KillMonitorPacket {
    pub fn new(version: [u8; 4], text: &str) -> Self {
        let mut payload = [0u8; 256];
        let bytes = text.as_bytes();
        let n = bytes.len().min(payload.len());
        payload[..n].copy_from_slice(&bytes[..n]);
        KillMonitorPacket { version, payload }
    }

    pub fn payload_str(&self) -> &str {
        let end = self.payload.iter().position(|&b| b == 0).unwrap_or(self.payload.len());
        std::str::from_utf8(&self.payload[..end]).unwrap_or("")
    }

    pub fn is_current_version(&self) -> bool {
        &self.version == KILL_MONITOR_VERSION
    }
}

pub mod sensor_type {
    pub const IMU: u32 = 0x1123_5001;
    pub const VY_IMAGE: u32 = 0x1123_5004;
    pub const GPS: u32 = 0x1123_5005;
}

/// Sensor packet header; the modality payload follows on the wire and
/// is not part of this struct.
#[derive(Debug, Clone, Copy, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct SensorPacketHeader {
    pub sensor_type: u32,
    pub custom: [u8; 8],
    pub timestamp_ascii: [u8; 20],
    pub timestamp2_ascii: [u8; 20],
    pub log_data: [u8; 64],
}

pub mod sync_packet_type {
    pub const TIME: u16 = 0x01;
    pub const FRAME_CAPTURE: u16 = 0x02;
    pub const PAUSE: u16 = 0x04;
    pub const CONTINUE: u16 = 0x08;
    pub const START_ACQ: u16 = 0x10;
    pub const STOP_ACQ: u16 = 0x20;
    pub const EXIT: u16 = 0x40;
}

/// Broadcast UDP sync packet.
#[derive(Debug, Clone, Copy, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct UdpSyncPacket {
    pub packet_type: u16,
    pub timestamp_ascii: [u8; 20],
}

pub const BEACON_BIN_RECORD_SIZE_BYTES: usize = 80;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postmaster_request_round_trips() {
        let req = PostmasterRequest::set_heading(-1);
        let bytes = req.to_bytes().unwrap();
        assert_eq!(bytes.len(), 16);
        let (_, decoded) = PostmasterRequest::from_bytes((&bytes, 0)).unwrap();
        assert_eq!(decoded.request_type, request_type::SET_HEADING);
        assert_eq!(decoded.custom[0], -1);
    }

    #[test]
    fn postmaster_response_timestamp_is_printf_style() {
        let resp = PostmasterResponse::with_timestamp(request_type::NULL, 0, 12.5, [0, 0, 0]);
        assert_eq!(resp.timestamp_ascii.len(), 32);
        let text = std::str::from_utf8(&resp.timestamp_ascii[..7]).unwrap();
        assert_eq!(text, "12.5000");
    }

    #[test]
    fn kill_monitor_packet_is_260_bytes_on_wire() {
        let pkt = KillMonitorPacket::new(*KILL_MONITOR_VERSION, "alive?");
        let bytes = pkt.to_bytes().unwrap();
        assert_eq!(bytes.len(), KILL_MONITOR_PACKET_SIZE);
        assert_eq!(pkt.payload_str(), "alive?");
        assert!(pkt.is_current_version());
    }

    #[test]
    fn sensor_header_size_matches_spec() {
        let header = SensorPacketHeader {
            sensor_type: sensor_type::IMU,
            custom: [0; 8],
            timestamp_ascii: [0; 20],
            timestamp2_ascii: [0; 20],
            log_data: [0; 64],
        };
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), 4 + 8 + 20 + 20 + 64);
    }

    #[test]
    fn udp_sync_packet_round_trips() {
        let pkt = UdpSyncPacket { packet_type: sync_packet_type::START_ACQ, timestamp_ascii: [0; 20] };
        let bytes = pkt.to_bytes().unwrap();
        let (_, decoded) = UdpSyncPacket::from_bytes((&bytes, 0)).unwrap();
        assert_eq!(decoded.packet_type, sync_packet_type::START_ACQ);
    }
}
