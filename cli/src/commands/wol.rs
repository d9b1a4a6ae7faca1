use std::net::{IpAddr, SocketAddr};

use colored::*;
use netprobe_common::success;
use netprobe_core::Engine;

use crate::terminal::{colors, print};

pub async fn wol(engine: &Engine, mac: &str, broadcast: IpAddr, port: u16) -> anyhow::Result<()> {
    let destination = SocketAddr::new(broadcast, port);
    print::aligned_line("Broadcast", destination.to_string());
    engine.send_wake_on_lan(mac, destination).await?;
    success!("magic packet for {} sent to {destination}", mac.color(colors::MAC_ADDR));
    Ok(())
}
