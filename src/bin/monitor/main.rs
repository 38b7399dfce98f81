mod gui;

use clap::Parser;
use hydrobearing::{
    args::BearingArgs, config::Config, gui::device_selector, ingestion_channel::IngestionChannel,
    serial_source::available_ports,
};

use gui::{engage_gui, Link};
use std::{error::Error, process::ExitCode};

fn main() -> ExitCode {
    // The alternate screen owns the terminal, only log when asked to
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::init();
    }
    let args = BearingArgs::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &BearingArgs) -> Result<(), Box<dyn Error>> {
    let config = Config::resolve(args)?;
    let feed = args
        .command
        .feed(&config)
        .ok_or("the monitor needs one of the stream, replay or simulate commands")?;

    let endpoint = match feed.endpoint {
        Some(endpoint) => endpoint,
        None => match device_selector(available_ports()?)? {
            Some(port) => port.to_string_lossy().into_owned(),
            None => {
                eprintln!("No serial port selected, check that the device is plugged in");
                return Ok(());
            }
        },
    };

    let (channel, events) =
        IngestionChannel::with_settings(feed.opener, config.port.channel_settings());
    let link = Link {
        channel,
        events,
        endpoint,
        baud_rate: config.port.baud_rate,
    };
    engage_gui(link, config.geometry)?;
    Ok(())
}
