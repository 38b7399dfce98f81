//! Headless front end: prints a bearing for every measurement that comes in.

use clap::Parser;
use hydrobearing::{
    args::{BearingArgs, CommandTask},
    bearing_estimator::{Bearing, Radian},
    config::Config,
    ingestion_channel::{IngestionChannel, SessionState},
    serial_source::available_ports,
    tracker::{AngleSink, BearingTracker},
};

use log::{error, info, warn};
use std::{error::Error, io, process::ExitCode, thread::sleep, time::Duration};

// Example:
// cargo run --bin hydrobearing --
//                              --mic-distance   0.5
//                              --speed-of-sound 1500
//                              stream /dev/ttyACM0

/// Prints each bearing on its own line.
struct StdoutSink;

impl AngleSink for StdoutSink {
    fn set_angle(&mut self, primary: Radian) {
        self.set_bearing(&Bearing::from_primary(primary));
    }

    fn set_bearing(&mut self, bearing: &Bearing) {
        println!(
            "primary {:>8.2}°  ambiguous {:>8.2}°{}",
            bearing.primary.to_degrees(),
            bearing.ambiguous_degrees(),
            if bearing.saturated { "  (saturated)" } else { "" }
        );
    }

    fn set_status(&mut self, status: &str) {
        info!("{}", status);
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = BearingArgs::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &BearingArgs) -> Result<(), Box<dyn Error>> {
    let config = Config::resolve(args)?;
    if let Err(e) = config.geometry.validate() {
        warn!("{}, no bearings will be produced", e);
    }

    let feed = match &args.command {
        CommandTask::Ports => {
            println!("Available devices:");
            for port in available_ports()? {
                println!("\t{}", port.to_string_lossy());
            }
            return Ok(());
        }
        CommandTask::Config => {
            println!("{}", config.to_ron_string()?);
            return Ok(());
        }
        other => other
            .feed(&config)
            .ok_or("this command does not stream anything")?,
    };

    let endpoint = match feed.endpoint {
        Some(endpoint) => endpoint,
        None => ask_for_port()?,
    };

    let (mut channel, events) =
        IngestionChannel::with_settings(feed.opener, config.port.channel_settings());
    channel.start(&endpoint, config.port.baud_rate)?;

    let mut tracker = BearingTracker::new(config.geometry);
    let mut sink = StdoutSink;
    // Runs until the session dies or we are interrupted
    loop {
        tracker.drain(&events, &mut sink);
        if let Some((_, SessionState::Stopped)) = tracker.session() {
            break;
        }
        sleep(Duration::from_millis(50));
    }
    channel.stop();

    match tracker.last_error() {
        Some(message) if tracker.stats().connection_errors > 0 => Err(message.into()),
        _ => Ok(()),
    }
}

/// Ask the user for the device name.
fn ask_for_port() -> io::Result<String> {
    let available_ports = available_ports()?;
    println!("Available devices:");
    for port in available_ports {
        println!("\t{}", port.to_string_lossy());
    }
    println!("Enter the device name: ");
    let mut device_name = String::new();
    io::stdin().read_line(&mut device_name)?;
    Ok(device_name.trim().to_owned())
}
