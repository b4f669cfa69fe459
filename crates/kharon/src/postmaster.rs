//! Postmaster TCP command plane (spec §6): the single entry point other
//! processes (CLI tools, the interactive client) use to steer the
//! running agent — set heading, set destination, pause/resume a module,
//! or request shutdown.
//!
//! Grounded on `core/include/external/postmaster.h` for the request
//! vocabulary and on `jet1090`'s `tokio::spawn`-per-connection server
//! loop style.

use deku::prelude::*;
use kharon_core::wire::{request_type, PostmasterRequest, PostmasterResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A decoded command ready for the route-controller loop to apply.
#[derive(Debug, Clone)]
pub enum Command {
    Annotation(String),
    Shutdown,
    AutopilotOn,
    AutopilotOff,
    SetHeading { degrees: Option<f64> },
    SetDestination { lon_bam32: u32, lat_bam32: u32, radius_m: f64 },
    ModulePause(String),
    ModuleResume(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PostmasterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed request header: {0}")]
    Decode(String),
    #[error("unrecognized request type {0}")]
    UnknownRequestType(u32),
}

fn decode_command(req: &PostmasterRequest, payload: &[u8]) -> Result<Command, PostmasterError> {
    Ok(match req.request_type {
        request_type::NULL => Command::Annotation(String::new()),
        request_type::ANNOTATION => {
            Command::Annotation(String::from_utf8_lossy(payload).into_owned())
        }
        request_type::SHUTDOWN => Command::Shutdown,
        request_type::AUTOPILOT_ON => Command::AutopilotOn,
        request_type::AUTOPILOT_OFF => Command::AutopilotOff,
        request_type::SET_HEADING => Command::SetHeading {
            degrees: if req.custom[0] < 0 { None } else { Some(req.custom[0] as f64) },
        },
        request_type::SET_DESTINATION => Command::SetDestination {
            lon_bam32: req.custom[0] as u32,
            lat_bam32: req.custom[1] as u32,
            radius_m: req.custom[2] as f64,
        },
        request_type::MODULE_PAUSE => {
            Command::ModulePause(String::from_utf8_lossy(payload).trim_end_matches('\0').to_string())
        }
        request_type::MODULE_RESUME => {
            Command::ModuleResume(String::from_utf8_lossy(payload).trim_end_matches('\0').to_string())
        }
        other => return Err(PostmasterError::UnknownRequestType(other)),
    })
}

/// Runs the postmaster server loop, pushing each decoded [`Command`]
/// onto `commands` for the route-controller task to apply.
pub async fn run(port: u16, commands: mpsc::Sender<Command>) -> Result<(), PostmasterError> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "postmaster listening");
    loop {
        let (socket, peer) = listener.accept().await?;
        let commands = commands.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, &commands).await {
                warn!(%peer, error = %e, "postmaster connection error");
            }
        });
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    commands: &mpsc::Sender<Command>,
) -> Result<(), PostmasterError> {
    let mut header_buf = [0u8; 16];
    socket.read_exact(&mut header_buf).await?;
    let (_, req) = PostmasterRequest::from_bytes((&header_buf, 0))
        .map_err(|e| PostmasterError::Decode(e.to_string()))?;

    let mut payload = vec![0u8; req.header_bytes as usize];
    if !payload.is_empty() {
        socket.read_exact(&mut payload).await?;
    }

    let command = decode_command(&req, &payload)?;
    let _ = commands.send(command).await;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    let resp = PostmasterResponse::with_timestamp(req.request_type, 0, now, [0, 0, 0]);
    socket.write_all(&resp.to_bytes().map_err(|e| PostmasterError::Decode(e.to_string()))?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_set_heading_negative_disables() {
        let req = PostmasterRequest::set_heading(-1);
        let cmd = decode_command(&req, &[]).unwrap();
        assert!(matches!(cmd, Command::SetHeading { degrees: None }));
    }

    #[test]
    fn decodes_set_heading_positive_value() {
        let req = PostmasterRequest::set_heading(090);
        match decode_command(&req, &[]).unwrap() {
            Command::SetHeading { degrees: Some(d) } => assert_eq!(d, 90.0),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn decodes_module_pause_payload_as_name() {
        let req = PostmasterRequest {
            request_type: request_type::MODULE_PAUSE,
            header_bytes: 4,
            custom: [0, 0, 0],
        };
        match decode_command(&req, b"gps\0").unwrap() {
            Command::ModulePause(name) => assert_eq!(name, "gps"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_request_type_is_rejected() {
        let req = PostmasterRequest { request_type: 0xDEAD_BEEF, header_bytes: 0, custom: [0, 0, 0] };
        assert!(decode_command(&req, &[]).is_err());
    }
}
