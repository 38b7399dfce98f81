//! The consumer side of the ingestion channel.
//!
//! The [`BearingTracker`] drains [`ChannelEvent`]s on whatever thread owns
//! the display, runs every measurement through the estimator, and hands the
//! results to an [`AngleSink`]. Nothing here is shared with the reader
//! thread, so the sink can keep plain mutable state.

use crate::bearing_estimator::{estimate, Bearing, EstimatorError, Geometry, Radian};
use crate::ingestion_channel::{ChannelEvent, SessionId, SessionState};

use log::{error, info, warn};
use std::sync::mpsc::Receiver;

/// Anything that can show a bearing.
pub trait AngleSink {
    /// The most recent primary angle, straight from the arcsine.
    fn set_angle(&mut self, primary: Radian);

    /// The full estimate. Sinks that only care about the primary angle can
    /// leave this alone.
    fn set_bearing(&mut self, bearing: &Bearing) {
        self.set_angle(bearing.primary);
    }

    /// A one-line status message for the user.
    fn set_status(&mut self, _status: &str) {}
}

/// Running totals, mostly for the status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Measurements turned into bearings.
    pub estimated: u64,
    /// Of those, how many were pinned to ±90°.
    pub saturated: u64,
    /// Measurements the estimator refused.
    pub rejected: u64,
    /// Connection failures reported by the channel.
    pub connection_errors: u64,
}

/// Turns channel events into bearings for a sink.
#[derive(Debug)]
pub struct BearingTracker {
    geometry: Geometry,
    latest: Option<Bearing>,
    session: Option<(SessionId, SessionState)>,
    last_error: Option<String>,
    stats: TrackerStats,
}

impl BearingTracker {
    /// A tracker estimating with `geometry`.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            latest: None,
            session: None,
            last_error: None,
            stats: TrackerStats::default(),
        }
    }

    /// Handle everything currently queued, without waiting for more.
    /// Returns how many events were handled.
    pub fn drain<S: AngleSink>(&mut self, events: &Receiver<ChannelEvent>, sink: &mut S) -> usize {
        let mut handled = 0;
        for event in events.try_iter() {
            self.handle(event, sink);
            handled += 1;
        }
        handled
    }

    /// Handle a single event.
    pub fn handle<S: AngleSink>(&mut self, event: ChannelEvent, sink: &mut S) {
        match event {
            ChannelEvent::Measurement { measurement, .. } => {
                match estimate(measurement.delta_t, &self.geometry) {
                    Ok(bearing) => {
                        self.stats.estimated += 1;
                        if bearing.saturated {
                            self.stats.saturated += 1;
                        }
                        self.latest = Some(bearing);
                        sink.set_bearing(&bearing);
                    }
                    Err(e) => self.reject(e, sink),
                }
            }
            ChannelEvent::ConnectionError { session, error } => {
                self.stats.connection_errors += 1;
                let message = error.to_string();
                error!("Session {} : {}", session, message);
                sink.set_status(&message);
                self.last_error = Some(message);
            }
            ChannelEvent::StateChanged { session, state } => {
                info!("Session {} is {}", session, state);
                self.session = Some((session, state));
                // Keep a connection error on screen after the session stops
                if state != SessionState::Stopped || self.last_error.is_none() {
                    sink.set_status(&format!("session {} {}", session, state));
                }
                if state == SessionState::Connecting {
                    self.last_error = None;
                }
            }
        }
    }

    fn reject<S: AngleSink>(&mut self, e: EstimatorError, sink: &mut S) {
        let message = e.to_string();
        // Only the first of a run of identical failures is worth shouting about
        if self.stats.rejected == 0 || self.last_error.as_deref() != Some(message.as_str()) {
            warn!("Cannot estimate a bearing: {}", message);
            sink.set_status(&message);
        }
        self.stats.rejected += 1;
        self.last_error = Some(message);
    }

    /// Swap in a corrected geometry. Later measurements use it.
    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
    }

    /// The geometry in use.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// The last bearing produced, if any.
    pub fn latest(&self) -> Option<Bearing> {
        self.latest
    }

    /// The last session state seen on the channel.
    pub fn session(&self) -> Option<(SessionId, SessionState)> {
        self.session
    }

    /// The last error message, cleared when a new session connects.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Running totals.
    pub fn stats(&self) -> TrackerStats {
        self.stats
    }
}
