//! Connects to a switcher and prints protocol activity as it happens.
//!
//! Run against a device (or emulator) reachable on the network:
//! - cargo run -p switchwire --example monitor -- 192.168.10.240:9910
//!
//! Optionally cut a source onto program after connecting:
//! - cargo run -p switchwire --example monitor -- 192.168.10.240:9910 2

use std::{env, net::SocketAddr, thread, time::Duration};

use switchwire::{
    commands::{ProgramInputCommand, ProgramInputSetCommand, TimecodeCommand},
    ReceivedCommand, SwitcherClient, SwitcherHandler,
};

struct Monitor;

impl SwitcherHandler for Monitor {
    fn on_connected(&mut self) {
        println!("[connected]");
    }

    fn on_disconnected(&mut self) {
        println!("[disconnected] reconnecting...");
    }

    fn on_receive(&mut self, commands: Vec<Box<dyn ReceivedCommand>>) {
        for command in commands {
            if let Some(prgi) = command.as_any().downcast_ref::<ProgramInputCommand>() {
                println!("[program] me={} source={}", prgi.me, prgi.source);
            } else if let Some(time) = command.as_any().downcast_ref::<TimecodeCommand>() {
                println!(
                    "[time] {:02}:{:02}:{:02}:{:02}",
                    time.hour, time.minute, time.second, time.frame
                );
            } else {
                println!("[command] {}", String::from_utf8_lossy(&command.name()));
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Args: <switcher_addr> [program_source]
    let mut args = env::args().skip(1);
    let addr: SocketAddr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:9910".to_string())
        .parse()?;
    let source: Option<u16> = args.next().and_then(|s| s.parse().ok());

    let client = SwitcherClient::connect_to(addr, true, Monitor)?;
    println!("switchwire monitor: {} -> {}", client.local_addr()?, addr);

    thread::sleep(Duration::from_secs(1));
    if let Some(source) = source {
        println!("[cut] source {} to program on ME 1", source);
        client.send_command(&ProgramInputSetCommand { me: 0, source })?;
    }

    loop {
        thread::sleep(Duration::from_secs(5));
        let stats = client.statistics();
        println!(
            "[stats] sent={} received={} retransmits={} version={}",
            stats.packets_sent,
            stats.packets_received,
            stats.retransmits,
            client.connection_version()
        );
    }
}
