//! `otto on|off`: engages or disengages autopilot via the postmaster
//! AUTOPILOT_ON / AUTOPILOT_OFF requests (spec §6).

use clap::{Parser, ValueEnum};
use deku::prelude::*;
use kharon_core::wire::{request_type, PostmasterRequest};
use std::io::{Read, Write};
use std::net::TcpStream;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Debug, Parser)]
#[command(name = "otto", about = "Engage or disengage autopilot")]
struct Options {
    state: Toggle,

    /// Postmaster host:port
    #[arg(long, default_value = "127.0.0.1:9100")]
    postmaster: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse();
    let request_type = match options.state {
        Toggle::On => request_type::AUTOPILOT_ON,
        Toggle::Off => request_type::AUTOPILOT_OFF,
    };
    let req = PostmasterRequest { request_type, header_bytes: 0, custom: [0, 0, 0] };

    let mut socket = TcpStream::connect(&options.postmaster)?;
    socket.write_all(&req.to_bytes()?)?;
    let mut response_header = [0u8; 48];
    socket.read_exact(&mut response_header)?;
    println!("autopilot {:?}", options.state);
    Ok(())
}
