//! `kharon-client`: a small interactive postmaster client. Builds one
//! [`PostmasterRequest`], sends it over TCP, and prints the decoded
//! [`PostmasterResponse`]. Unlike the single-purpose `kharon-tools`
//! binaries (`aim`, `go`, ...), this exposes the full request
//! vocabulary behind one subcommand tree, for ad hoc probing for spec
//! §6's postmaster command plane.
//!
//! Grounded on the donor's `rs1090_client` crate: one binary, one
//! `clap::Parser` options struct, connect-then-stream-then-print.

use clap::{Parser, Subcommand};
use deku::prelude::*;
use kharon_core::angles::Bam32;
use kharon_core::wire::{request_type, PostmasterRequest, PostmasterResponse};
use std::io::{Read, Write};
use std::net::TcpStream;

#[derive(Debug, Parser)]
#[command(name = "kharon-client", about = "Send one postmaster request and print the response")]
struct Options {
    /// Postmaster host:port
    #[arg(long, default_value = "127.0.0.1:9100")]
    postmaster: String,

    #[command(subcommand)]
    command: CommandArg,
}

#[derive(Debug, Subcommand)]
enum CommandArg {
    /// Send a NULL request (connectivity probe, no effect)
    Null,
    /// Attach a free-text annotation to the voyage log
    Annotation { text: String },
    /// Request an orderly shutdown
    Shutdown,
    /// Enable autopilot
    AutopilotOn,
    /// Disable autopilot
    AutopilotOff,
    /// Set (or, if negative, clear) the suggested heading override
    SetHeading { degrees: i32 },
    /// Set a new destination by longitude/latitude degrees and radius in meters
    SetDestination { lon_deg: f64, lat_deg: f64, radius_m: i32 },
    /// Pause a named module
    ModulePause { name: String },
    /// Resume a named module
    ModuleResume { name: String },
}

fn build_request(command: &CommandArg) -> (PostmasterRequest, Vec<u8>) {
    match command {
        CommandArg::Null => {
            (PostmasterRequest { request_type: request_type::NULL, header_bytes: 0, custom: [0, 0, 0] }, Vec::new())
        }
        CommandArg::Annotation { text } => {
            let payload = text.as_bytes().to_vec();
            (
                PostmasterRequest {
                    request_type: request_type::ANNOTATION,
                    header_bytes: payload.len() as u32,
                    custom: [0, 0, 0],
                },
                payload,
            )
        }
        CommandArg::Shutdown => {
            (PostmasterRequest { request_type: request_type::SHUTDOWN, header_bytes: 0, custom: [0, 0, 0] }, Vec::new())
        }
        CommandArg::AutopilotOn => {
            (PostmasterRequest { request_type: request_type::AUTOPILOT_ON, header_bytes: 0, custom: [0, 0, 0] }, Vec::new())
        }
        CommandArg::AutopilotOff => {
            (PostmasterRequest { request_type: request_type::AUTOPILOT_OFF, header_bytes: 0, custom: [0, 0, 0] }, Vec::new())
        }
        CommandArg::SetHeading { degrees } => (PostmasterRequest::set_heading(*degrees), Vec::new()),
        CommandArg::SetDestination { lon_deg, lat_deg, radius_m } => (
            PostmasterRequest::set_destination(
                Bam32::from_degrees(*lon_deg).0,
                Bam32::from_degrees(*lat_deg).0,
                *radius_m,
            ),
            Vec::new(),
        ),
        CommandArg::ModulePause { name } => {
            let payload = name.as_bytes().to_vec();
            (
                PostmasterRequest {
                    request_type: request_type::MODULE_PAUSE,
                    header_bytes: payload.len() as u32,
                    custom: [0, 0, 0],
                },
                payload,
            )
        }
        CommandArg::ModuleResume { name } => {
            let payload = name.as_bytes().to_vec();
            (
                PostmasterRequest {
                    request_type: request_type::MODULE_RESUME,
                    header_bytes: payload.len() as u32,
                    custom: [0, 0, 0],
                },
                payload,
            )
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse();
    let (request, payload) = build_request(&options.command);

    let mut socket = TcpStream::connect(&options.postmaster)?;
    socket.write_all(&request.to_bytes()?)?;
    if !payload.is_empty() {
        socket.write_all(&payload)?;
    }

    let mut response_header = [0u8; 48];
    socket.read_exact(&mut response_header)?;
    let (_, resp) = PostmasterResponse::from_bytes((&response_header, 0))?;

    let mut response_payload = vec![0u8; resp.response_bytes as usize];
    if !response_payload.is_empty() {
        socket.read_exact(&mut response_payload)?;
    }

    let timestamp = std::str::from_utf8(&resp.timestamp_ascii)
        .unwrap_or("")
        .trim_end_matches('\0');
    println!("request_type={} ack at t={timestamp}", resp.request_type);
    if !response_payload.is_empty() {
        println!("payload: {}", String::from_utf8_lossy(&response_payload));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_request_has_no_payload() {
        let (req, payload) = build_request(&CommandArg::Null);
        assert_eq!(req.request_type, request_type::NULL);
        assert!(payload.is_empty());
    }

    #[test]
    fn set_heading_negative_disables_override() {
        let (req, _) = build_request(&CommandArg::SetHeading { degrees: -1 });
        assert_eq!(req.request_type, request_type::SET_HEADING);
        assert_eq!(req.custom[0], -1);
    }

    #[test]
    fn annotation_carries_text_as_payload() {
        let (req, payload) = build_request(&CommandArg::Annotation { text: "fog ahead".into() });
        assert_eq!(req.header_bytes as usize, payload.len());
        assert_eq!(payload, b"fog ahead");
    }

    #[test]
    fn set_destination_encodes_degrees_as_bam32() {
        let (req, _) = build_request(&CommandArg::SetDestination { lon_deg: -122.5, lat_deg: 49.1, radius_m: 500 });
        assert_eq!(req.request_type, request_type::SET_DESTINATION);
        assert_eq!(req.custom[2], 500);
    }
}
