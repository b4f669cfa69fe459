//! `send_kill <device>`: sends a kill-monitor packet to a named device
//! endpoint and prints its reply (spec §6). Used manually or by a
//! supervisor script to probe liveness or request a halt/reboot.

use clap::{Parser, ValueEnum};
use deku::prelude::*;
use kharon_core::wire::{KillMonitorPacket, KILL_MONITOR_VERSION};
use std::io::{Read, Write};
use std::net::TcpStream;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum Action {
    #[default]
    Alive,
    Halt,
    Reboot,
}

impl Action {
    fn payload(self) -> &'static str {
        match self {
            Action::Alive => "alive?",
            Action::Halt => "halt",
            Action::Reboot => "reboot",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "send_kill", about = "Probe or control a device's kill-monitor endpoint")]
struct Options {
    /// Device endpoint, host:port (defaults to the kill-monitor port)
    device: String,

    #[arg(value_enum, default_value_t = Action::Alive)]
    action: Action,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse();
    let pkt = KillMonitorPacket::new(*KILL_MONITOR_VERSION, options.action.payload());

    let mut socket = TcpStream::connect(&options.device)?;
    socket.write_all(&pkt.to_bytes()?)?;

    let mut reply = [0u8; 64];
    let n = socket.read(&mut reply)?;
    println!("{}", String::from_utf8_lossy(&reply[..n]));
    Ok(())
}
