//! Commandline argument parser using clap for hydrobearing

use crate::config::Config;
use crate::serial_source::{PortOpener, ReplayOpener, SerialOpener};
use crate::simulated_source::{SimulatedOpener, Simulation};

use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, sync::Arc, time::Duration};

/// Shared by both binaries.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct BearingArgs {
    #[command(subcommand)]
    /// Where the time differences come from
    pub command: CommandTask,

    /// RON file with port and geometry settings
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Serial line speed, 115200 unless configured otherwise
    #[arg(short = 'b', long = "baud", global = true)]
    pub baud_rate: Option<u32>,

    /// Distance between the two hydrophones, in meters
    #[arg(short = 'd', long = "mic-distance", global = true)]
    pub mic_distance: Option<f64>,

    /// Speed of sound in the water, in meters per second
    #[arg(short = 's', long = "speed-of-sound", global = true)]
    pub speed_of_sound: Option<f64>,
}

#[allow(missing_docs)]
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// List the serial devices that can be streamed from
    #[command(about)]
    Ports,

    /// Stream time differences from the microcontroller
    #[command(about)]
    Stream(StreamCommand),

    /// Play back a file of recorded time differences, one per line
    #[command(about)]
    Replay(ReplayCommand),

    /// Pretend a source is circling the array
    #[command(about)]
    Simulate(SimulateCommand),

    /// Print the effective configuration as RON
    #[command(about)]
    Config,
}

#[allow(missing_docs)]
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct StreamCommand {
    /// Serial device to open; asked for when left out and not configured
    pub port: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct ReplayCommand {
    /// Text file with one time difference, in seconds, per line
    pub file: PathBuf,

    /// Milliseconds between replayed lines
    #[arg(short = 'i', long = "interval", default_value_t = 100)]
    pub interval_ms: u64,
}

#[allow(missing_docs)]
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct SimulateCommand {
    /// Seconds for the source to go once around the array
    #[arg(short = 'p', long = "period", default_value_t = 20.0)]
    pub period_secs: f64,

    /// Peak timing noise, in seconds
    #[arg(short = 'n', long = "noise", default_value_t = 1e-6, value_parser = parse_noise)]
    pub noise: f64,

    /// Fraction of lines sent as garbage
    #[arg(short = 'g', long = "garbage", default_value_t = 0.02, value_parser = parse_ratio)]
    pub garbage_ratio: f64,

    /// Milliseconds between lines
    #[arg(short = 'i', long = "interval", default_value_t = 50)]
    pub interval_ms: u64,
}

fn parse_noise(s: &str) -> Result<f64, String> {
    let noise: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if noise.is_finite() && noise >= 0.0 {
        Ok(noise)
    } else {
        Err(format!("{} is not a usable amount of noise", noise))
    }
}

fn parse_ratio(s: &str) -> Result<f64, String> {
    let ratio: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(format!("{} is not between 0 and 1", ratio))
    }
}

/// What a streaming command reads from.
pub struct Feed {
    /// Opens the endpoint for each session.
    pub opener: Arc<dyn PortOpener>,
    /// What to open; `None` when the user still has to pick a port.
    pub endpoint: Option<String>,
}

impl CommandTask {
    /// The serial port named on the command line, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            CommandTask::Stream(StreamCommand { port }) => port.as_deref(),
            _ => None,
        }
    }

    /// The source this command streams from, or `None` for commands that
    /// do not stream.
    pub fn feed(&self, config: &Config) -> Option<Feed> {
        match self {
            CommandTask::Stream(_) => Some(Feed {
                opener: Arc::new(SerialOpener),
                endpoint: config.port.endpoint.clone(),
            }),
            CommandTask::Replay(ReplayCommand { file, interval_ms }) => Some(Feed {
                opener: Arc::new(ReplayOpener::new(Duration::from_millis(*interval_ms))),
                endpoint: Some(file.to_string_lossy().into_owned()),
            }),
            CommandTask::Simulate(cmd) => Some(Feed {
                opener: Arc::new(SimulatedOpener::new(Simulation {
                    geometry: config.geometry,
                    period: Duration::try_from_secs_f64(cmd.period_secs.max(0.001))
                        .unwrap_or(Simulation::default().period),
                    noise: cmd.noise,
                    garbage_ratio: cmd.garbage_ratio,
                    interval: Duration::from_millis(cmd.interval_ms),
                })),
                endpoint: Some("simulator".to_owned()),
            }),
            CommandTask::Ports | CommandTask::Config => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_go_anywhere() {
        let args = BearingArgs::try_parse_from([
            "hydrobearing",
            "stream",
            "COM3",
            "--baud",
            "9600",
            "-d",
            "0.4",
        ])
        .unwrap();
        assert_eq!(args.baud_rate, Some(9600));
        assert_eq!(args.mic_distance, Some(0.4));
        assert_eq!(args.command.endpoint(), Some("COM3"));
    }

    #[test]
    fn port_is_optional() {
        let args = BearingArgs::try_parse_from(["hydrobearing", "stream"]).unwrap();
        assert_eq!(args.command.endpoint(), None);
        let feed = args.command.feed(&Config::default()).unwrap();
        assert!(feed.endpoint.is_none());
    }

    #[test]
    fn replay_uses_the_file_as_endpoint() {
        let args =
            BearingArgs::try_parse_from(["hydrobearing", "replay", "dive.txt", "-i", "5"]).unwrap();
        let feed = args.command.feed(&Config::default()).unwrap();
        assert_eq!(feed.endpoint.as_deref(), Some("dive.txt"));
    }

    #[test]
    fn listing_ports_does_not_stream() {
        let args = BearingArgs::try_parse_from(["hydrobearing", "ports"]).unwrap();
        assert!(args.command.feed(&Config::default()).is_none());
    }

    #[test]
    fn simulation_knobs_are_checked() {
        for bad in [
            ["--garbage", "nan"],
            ["--garbage", "1.5"],
            ["--noise", "inf"],
            ["--noise", "-1e-6"],
        ] {
            let argv = ["hydrobearing", "simulate", bad[0], bad[1]];
            assert!(BearingArgs::try_parse_from(argv).is_err(), "{:?}", bad);
        }

        let args =
            BearingArgs::try_parse_from(["hydrobearing", "simulate", "-g", "1", "-n", "0"])
                .unwrap();
        match args.command {
            CommandTask::Simulate(cmd) => {
                assert_eq!(cmd.garbage_ratio, 1.0);
                assert_eq!(cmd.noise, 0.0);
            }
            other => panic!("expected simulate, got {:?}", other),
        }
    }

    #[test]
    fn needs_a_command() {
        assert!(BearingArgs::try_parse_from(["hydrobearing"]).is_err());
    }
}
