//! Measurement Executors (spec §4.D): one module per non-HTTP measurement
//! kind, each a `run(options, progress) -> serde_json::Value` that never
//! lets an error escape — every terminal state is folded into the returned
//! JSON result object before the dispatcher wraps it in a `ResultFrame`.

pub mod command;
pub mod dns;
pub mod mtr;
pub mod ping;
pub mod tcp_ping;
pub mod traceroute;

use crate::progress_buffer::{Mode, ProgressBuffer};
use common::Measurement;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// The progress-buffer merge mode fixed per measurement kind (spec §4.D
/// "Buffer mode" notes).
pub fn mode_for(measurement: &Measurement) -> Mode {
    match measurement {
        Measurement::Ping(_) => Mode::Append,
        Measurement::Dns(_) => Mode::Append,
        Measurement::Traceroute(_) => Mode::Diff,
        Measurement::Mtr(_) => Mode::Overwrite,
        Measurement::Http(_) => Mode::Append,
    }
}

/// Runs a measurement of any kind (HTTP is dispatched to
/// [`crate::http_engine`] since it isn't a subprocess executor). Returns the
/// final structured result, already a `status`-tagged JSON object.
pub async fn run(
    measurement: &Measurement,
    test_id: String,
    measurement_id: String,
    sink: UnboundedSender<common::ProgressFrame>,
) -> serde_json::Value {
    let progress = ProgressBuffer::new(test_id, measurement_id, mode_for(measurement), sink);
    dispatch(measurement, progress).await
}

async fn dispatch(measurement: &Measurement, progress: Arc<ProgressBuffer>) -> serde_json::Value {
    match measurement {
        Measurement::Ping(opts) if opts.is_tcp() => tcp_ping::run(opts, progress).await,
        Measurement::Ping(opts) => ping::run(opts, progress).await,
        Measurement::Dns(opts) => dns::run(opts, progress).await,
        Measurement::Traceroute(opts) => traceroute::run(opts, progress).await,
        Measurement::Mtr(opts) => mtr::run(opts, progress).await,
        Measurement::Http(opts) => crate::http_engine::run(opts, progress).await,
    }
}
