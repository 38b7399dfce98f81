//! A stand-in for the microcontroller, for when there is no hydrophone rig
//! plugged in. It pretends a source is circling the array and reports the
//! time differences the rig would have measured.

use crate::bearing_estimator::{Geometry, Radian};
use crate::serial_source::{ByteSource, PortOpener};
use rand::{distributions::Uniform, prelude::*, rngs::StdRng};
use std::{
    f64::consts::PI,
    io::{self, Read},
    time::{Duration, Instant},
};

/// How the simulated source moves and how dirty the feed is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Simulation {
    /// The array the simulated source is heard by.
    pub geometry: Geometry,
    /// Time for the source to travel once around the array.
    pub period: Duration,
    /// Peak timing noise added to each measurement, in seconds.
    pub noise: f64,
    /// Fraction of lines that come out as garbage.
    pub garbage_ratio: f64,
    /// Time between lines.
    pub interval: Duration,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            geometry: Geometry::default(),
            period: Duration::from_secs(20),
            noise: 1e-6,
            garbage_ratio: 0.02,
            interval: Duration::from_millis(50),
        }
    }
}

impl Simulation {
    /// Reject settings the random generator cannot work with.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(0.0..=1.0).contains(&self.garbage_ratio) {
            return Err("garbage ratio must be between 0 and 1");
        }
        if !self.noise.is_finite() || self.noise < 0.0 {
            return Err("noise must be finite and not negative");
        }
        Ok(())
    }
}

/// Opens a [`SimulatedFeed`]. The endpoint name is only used for logging.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedOpener {
    simulation: Simulation,
}

impl SimulatedOpener {
    /// An opener that hands out feeds for `simulation`.
    pub fn new(simulation: Simulation) -> Self {
        Self { simulation }
    }
}

impl PortOpener for SimulatedOpener {
    fn open(
        &self,
        _endpoint: &str,
        _baud_rate: u32,
        read_timeout: Duration,
    ) -> io::Result<ByteSource> {
        self.simulation
            .validate()
            .map_err(|msg| io::Error::new(io::ErrorKind::InvalidInput, msg))?;
        Ok(Box::new(SimulatedFeed::new(self.simulation, read_timeout)))
    }
}

/// The time difference an ideal array would see for a source at `angle`
/// from broadside.
pub fn ideal_delta_t(angle: Radian, geometry: &Geometry) -> f64 {
    angle.sin() * geometry.max_delta_t()
}

/// An endless stream of newline-terminated time differences.
pub struct SimulatedFeed {
    simulation: Simulation,
    read_timeout: Duration,
    started: Instant,
    next_due: Instant,
    pending: Vec<u8>,
    rng: StdRng,
}

impl SimulatedFeed {
    fn new(simulation: Simulation, read_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            simulation,
            read_timeout,
            started: now,
            next_due: now,
            pending: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    fn next_line(&mut self, now: Instant) -> String {
        let sim = &self.simulation;
        if self.rng.gen_bool(sim.garbage_ratio) {
            return "ERR no onset\n".to_owned();
        }

        let turns = now.duration_since(self.started).as_secs_f64()
            / sim.period.as_secs_f64().max(f64::EPSILON);
        let angle = turns.fract() * 2.0 * PI;
        let jitter = if sim.noise > 0.0 {
            self.rng.sample(Uniform::new_inclusive(-sim.noise, sim.noise))
        } else {
            0.0
        };
        format!("{:.9}\n", ideal_delta_t(angle, &sim.geometry) + jitter)
    }
}

impl Read for SimulatedFeed {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            let now = Instant::now();
            if now < self.next_due {
                let wait = self.next_due - now;
                spin_sleep::sleep(wait.min(self.read_timeout));
                if wait > self.read_timeout {
                    return Err(io::ErrorKind::TimedOut.into());
                }
            }
            let now = Instant::now();
            self.pending = self.next_line(now).into_bytes();
            self.next_due = now + self.simulation.interval;
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement_decoder::Measurement;
    use std::f64::consts::FRAC_PI_2;

    fn collect_lines(feed: &mut SimulatedFeed, count: usize) -> Vec<String> {
        let mut bytes = Vec::new();
        let mut buf = [0; 7];
        while bytes.iter().filter(|&&b| b == b'\n').count() < count {
            if let Ok(n) = feed.read(&mut buf) {
                bytes.extend_from_slice(&buf[..n]);
            }
        }
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn ideal_delta_t_hits_the_extremes() {
        let g = Geometry::new(0.75, 1500.0);
        assert_eq!(ideal_delta_t(0.0, &g), 0.0);
        assert!((ideal_delta_t(FRAC_PI_2, &g) - g.max_delta_t()).abs() < 1e-15);
        assert!((ideal_delta_t(-FRAC_PI_2, &g) + g.max_delta_t()).abs() < 1e-15);
    }

    #[test]
    fn clean_feed_stays_within_the_array() {
        let simulation = Simulation {
            noise: 0.0,
            garbage_ratio: 0.0,
            interval: Duration::ZERO,
            period: Duration::from_millis(10),
            ..Default::default()
        };
        let mut feed = SimulatedFeed::new(simulation, Duration::from_millis(1));
        let max = simulation.geometry.max_delta_t();
        for line in collect_lines(&mut feed, 200) {
            let m: Measurement = line.parse().unwrap();
            assert!(m.delta_t.abs() <= max + 1e-9, "{} out of range", line);
        }
    }

    #[test]
    fn unusable_settings_refuse_to_open() {
        for simulation in [
            Simulation {
                garbage_ratio: f64::NAN,
                ..Default::default()
            },
            Simulation {
                noise: f64::INFINITY,
                ..Default::default()
            },
        ] {
            let opened = SimulatedOpener::new(simulation).open("sim", 115_200, Duration::ZERO);
            let err = opened.err().expect("opened anyway");
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }
        assert!(Simulation::default().validate().is_ok());
    }

    #[test]
    fn dirty_feed_mixes_in_garbage() {
        let simulation = Simulation {
            garbage_ratio: 1.0,
            interval: Duration::ZERO,
            ..Default::default()
        };
        let mut feed = SimulatedFeed::new(simulation, Duration::from_millis(1));
        for line in collect_lines(&mut feed, 10) {
            assert!(line.parse::<Measurement>().is_err());
        }
    }
}
