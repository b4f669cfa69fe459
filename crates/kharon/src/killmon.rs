//! Kill-monitor responder (spec §6): a tiny TCP service a supervisor
//! polls to confirm the agent process is alive, and through which it
//! can request an orderly halt or reboot.
//!
//! Grounded on `core/include/external/kill_monitor.h`'s packet layout;
//! wire-compatible with [`kharon_core::wire::KillMonitorPacket`].

use deku::prelude::*;
use kharon_core::wire::{KillMonitorPacket, KILL_MONITOR_PACKET_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 9110;

/// What to do when a `halt`/`reboot` payload arrives. Kept as a trait so
/// tests can observe the request without tearing down the test process.
pub trait SystemAction: Send + Sync + 'static {
    fn halt(&self);
    fn reboot(&self);
}

/// Logs the request instead of acting; the real supervisor-triggered
/// shutdown path is outside this port's scope (spec's packaging/
/// deployment Non-goal).
pub struct LoggingSystemAction;

impl SystemAction for LoggingSystemAction {
    fn halt(&self) {
        warn!("kill-monitor requested halt");
    }

    fn reboot(&self) {
        warn!("kill-monitor requested reboot");
    }
}

pub async fn run(port: u16, action: std::sync::Arc<dyn SystemAction>) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "kill-monitor listening");
    loop {
        let (socket, peer) = listener.accept().await?;
        let action = action.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, action.as_ref()).await {
                warn!(%peer, error = %e, "kill-monitor connection error");
            }
        });
    }
}

async fn handle_connection(mut socket: TcpStream, action: &dyn SystemAction) -> std::io::Result<()> {
    let mut buf = [0u8; KILL_MONITOR_PACKET_SIZE];
    socket.read_exact(&mut buf).await?;
    let (_, packet) = KillMonitorPacket::from_bytes((&buf, 0))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    if !packet.is_current_version() {
        warn!("kill-monitor: unrecognized packet version, dropping");
        return Ok(());
    }

    let reply = match packet.payload_str() {
        "alive?" => "not dead",
        "halt" => {
            action.halt();
            "halting"
        }
        "reboot" => {
            action.reboot();
            "rebooting"
        }
        other => {
            warn!(payload = other, "kill-monitor: unrecognized payload, dropping");
            return Ok(());
        }
    };

    socket.write_all(reply.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct RecordingAction {
        halted: AtomicBool,
        rebooted: AtomicBool,
    }

    impl SystemAction for RecordingAction {
        fn halt(&self) {
            self.halted.store(true, Ordering::SeqCst);
        }
        fn reboot(&self) {
            self.rebooted.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn alive_query_gets_not_dead() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let action: Arc<dyn SystemAction> = Arc::new(RecordingAction {
            halted: AtomicBool::new(false),
            rebooted: AtomicBool::new(false),
        });
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let _ = handle_connection(socket, action.as_ref()).await;
        });

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let pkt = KillMonitorPacket::new(*kharon_core::wire::KILL_MONITOR_VERSION, "alive?");
        client.write_all(&pkt.to_bytes().unwrap()).await.unwrap();
        let mut reply = [0u8; 8];
        let n = client.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"not dead");
    }

    #[tokio::test]
    async fn halt_invokes_system_action() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let action = Arc::new(RecordingAction {
            halted: AtomicBool::new(false),
            rebooted: AtomicBool::new(false),
        });
        let action_clone = action.clone();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let _ = handle_connection(socket, action_clone.as_ref()).await;
        });

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let pkt = KillMonitorPacket::new(*kharon_core::wire::KILL_MONITOR_VERSION, "halt");
        client.write_all(&pkt.to_bytes().unwrap()).await.unwrap();
        let mut reply = [0u8; 8];
        let _ = client.read(&mut reply).await.unwrap();
        assert!(action.halted.load(Ordering::SeqCst));
    }
}
