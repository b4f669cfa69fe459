//! `go [<name>]`: looks up a named destination in
//! `/opt/kharon/charlie/destinations.txt` and sends it to the running
//! agent via the postmaster SET_DESTINATION request (spec §6).

use clap::Parser;
use deku::prelude::*;
use kharon_core::angles::Bam32;
use kharon_core::config::{find_destination, load_destinations, DESTINATIONS_PATH};
use kharon_core::wire::PostmasterRequest;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "go", about = "Send a named destination to the route controller")]
struct Options {
    /// Destination name from destinations.txt; omitted lists the known names
    name: Option<String>,

    /// Path to the destinations file
    #[arg(long, default_value = DESTINATIONS_PATH)]
    destinations: PathBuf,

    /// Postmaster host:port
    #[arg(long, default_value = "127.0.0.1:9100")]
    postmaster: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse();
    let destinations = load_destinations(&options.destinations)?;

    let Some(name) = options.name else {
        for d in &destinations {
            println!("{} {} {} {}", d.name, d.lon, d.lat, d.radius_m);
        }
        return Ok(());
    };

    let dest = find_destination(&destinations, &name)
        .ok_or_else(|| format!("no destination named {name:?} in {}", options.destinations.display()))?;

    let req = PostmasterRequest::set_destination(
        Bam32::from_degrees(dest.lon).0,
        Bam32::from_degrees(dest.lat).0,
        dest.radius_m as i32,
    );

    let mut socket = TcpStream::connect(&options.postmaster)?;
    socket.write_all(&req.to_bytes()?)?;
    let mut response_header = [0u8; 48];
    socket.read_exact(&mut response_header)?;
    println!("destination {name:?} sent ({}, {})", dest.lon, dest.lat);
    Ok(())
}
