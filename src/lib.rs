//! hydrobearing estimates which way an underwater sound came from, using two
//! hydrophones and a microcontroller that times the difference between the
//! moments each of them heard it.
//!
//! The microcontroller prints one time difference per line over a serial
//! link. On the host side the pipeline is:
//!
//! 1. The [ingestion channel](ingestion_channel) reads lines on its own
//!    thread and turns the well-formed ones into
//!    [`Measurement`](measurement_decoder::Measurement)s.
//! 2. The [tracker](tracker) drains those on the display's thread and runs
//!    each through the [bearing estimator](bearing_estimator).
//! 3. Whatever implements [`AngleSink`](tracker::AngleSink) shows the result.
//!    The `monitor` binary draws it in the terminal; the `hydrobearing` binary
//!    just prints it.
//!
//! With only two hydrophones the array cannot tell front from back, so every
//! bearing comes with its mirror image.

#![warn(missing_docs)]
pub mod args;
pub mod bearing_estimator;
pub mod config;
pub mod gui;
pub mod ingestion_channel;
pub mod line_assembler;
pub mod measurement_decoder;
pub mod serial_source;
pub mod simulated_source;
pub mod tracker;
