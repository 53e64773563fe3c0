//! Output Parsers (spec §4.A): pure `&str -> Result<T, ParseError>`
//! functions, one module per measurement kind. None of these touch I/O —
//! the executors own spawning the tool and feeding it accumulated stdout.
//!
//! Tool-version faithfulness is an explicitly open question (spec §9,
//! open question 1): each parser documents at its top which tool-output
//! shape it assumes (`iputils` ping, BIND `dig`, Linux `traceroute`,
//! `mtr --raw`) rather than trying to cover every variant ever shipped.

pub mod dig_classic;
pub mod dig_trace;
pub mod mtr;
pub mod ping;
pub mod traceroute;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        ParseError(msg.into())
    }
}
