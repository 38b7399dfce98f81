//! Decodes the lines the microcontroller sends us. Each line carries one
//! arrival time difference in seconds, written as a plain decimal number,
//! e.g. `-0.000213\r\n`.

use nom::{
    character::complete::multispace0,
    combinator::{all_consuming, map, verify},
    error::Error,
    number::complete::double,
    sequence::delimited,
    Finish, IResult,
};

use std::str::FromStr;

/// One arrival time difference between the two hydrophones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Seconds. Positive when the sound reached the first hydrophone first.
    pub delta_t: f64,
}

fn parse_delta_t(s: &str) -> IResult<&str, f64> {
    verify(double, |v: &f64| v.is_finite())(s)
}

fn parse_measurement(s: &str) -> IResult<&str, Measurement> {
    map(
        all_consuming(delimited(multispace0, parse_delta_t, multispace0)),
        |delta_t| Measurement { delta_t },
    )(s)
}

impl FromStr for Measurement {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_measurement(s).finish() {
            Ok((_remaining, measurement)) => Ok(measurement),
            Err(Error { input, code }) => Err(Error {
                input: input.to_string(),
                code,
            }),
        }
    }
}
