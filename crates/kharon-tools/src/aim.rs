//! `aim <degs>`: sets the suggested heading override via the postmaster
//! SET_HEADING request. A negative value disables the override and
//! returns the route controller to its own suggested course (spec §6).

use clap::Parser;
use deku::prelude::*;
use kharon_core::wire::PostmasterRequest;
use std::net::TcpStream;
use std::io::{Read, Write};

#[derive(Debug, Parser)]
#[command(name = "aim", about = "Set or clear the suggested heading override")]
struct Options {
    /// Heading in degrees; negative disables the override
    degs: i32,

    /// Postmaster host:port
    #[arg(long, default_value = "127.0.0.1:9100")]
    postmaster: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse();
    let req = PostmasterRequest::set_heading(options.degs);

    let mut socket = TcpStream::connect(&options.postmaster)?;
    socket.write_all(&req.to_bytes()?)?;

    let mut response_header = [0u8; 48];
    socket.read_exact(&mut response_header)?;
    let (_, resp) = kharon_core::wire::PostmasterResponse::from_bytes((&response_header, 0))?;
    println!("postmaster ack at t={}", String::from_utf8_lossy(&resp.timestamp_ascii).trim_end_matches('\0'));
    Ok(())
}
