//! `module <name> on|off`: pauses or resumes a named agent module via
//! the postmaster MODULE_PAUSE / MODULE_RESUME requests (spec §6).

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
#[command(name = "module", about = "Pause or resume a named agent module")]
struct Options {
    name: String,
    state: Toggle,

    /// Postmaster host:port
    #[arg(long, default_value = "127.0.0.1:9100")]
    postmaster: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse();
    let request_type = match options.state {
        Toggle::On => request_type::MODULE_RESUME,
        Toggle::Off => request_type::MODULE_PAUSE,
    };
    let mut payload = options.name.clone().into_bytes();
    payload.push(0);

    let req = PostmasterRequest { request_type, header_bytes: payload.len() as u32, custom: [0, 0, 0] };

    let mut socket = TcpStream::connect(&options.postmaster)?;
    socket.write_all(&req.to_bytes()?)?;
    socket.write_all(&payload)?;
    let mut response_header = [0u8; 48];
    socket.read_exact(&mut response_header)?;
    println!("module {:?} set to {:?}", options.name, options.state);
    Ok(())
}
