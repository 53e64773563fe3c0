//! Job dispatcher (spec §4.J "Dispatch"): the bridge between incoming
//! `probe:measurement:request` events and the executors/HTTP engine.

use crate::connection::ConnectionHandle;
use crate::jobs::JobTable;
use crate::status::StatusManager;
use common::{MeasurementRequest, ProgressFrame, ResultFrame, Status};
use std::sync::Arc;

pub async fn handle_measurement_request(
    data: serde_json::Value,
    handle: Arc<ConnectionHandle>,
    jobs: Arc<JobTable>,
    status: Arc<StatusManager>,
) {
    if status.current() != Status::Ready {
        tracing::warn!("dropping measurement request: probe status is not ready");
        return;
    }

    let request: MeasurementRequest = match serde_json::from_value(data) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "measurement request did not match any known kind");
            return;
        }
    };

    // Ack: the request becomes "accepted" exactly when this fires, regardless
    // of whether the options turn out to be valid — validation is an
    // executor-internal concern (spec §4.D step 1) that each executor's own
    // `run()` performs after the ack (spec §4.J step 2), producing a failed
    // result frame on its own if it rejects the options.
    handle.emit("probe:measurement:ack", serde_json::Value::Null);

    jobs.insert(request.measurement_id.clone()).await;

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<ProgressFrame>();
    let handle_for_progress = handle.clone();
    tokio::spawn(async move {
        while let Some(frame) = progress_rx.recv().await {
            handle_for_progress.emit(
                "probe:measurement:progress",
                serde_json::to_value(frame).unwrap_or_default(),
            );
        }
    });

    let test_id = request.test_id.clone();
    let measurement_id = request.measurement_id.clone();
    let jobs_for_completion = jobs.clone();
    tokio::spawn(async move {
        let result = crate::executors::run(
            &request.measurement,
            test_id.clone(),
            measurement_id.clone(),
            progress_tx,
        )
        .await;

        let frame = ResultFrame {
            test_id,
            measurement_id: measurement_id.clone(),
            result,
        };
        handle.emit("probe:measurement:result", serde_json::to_value(frame).unwrap_or_default());
        jobs_for_completion.remove(&measurement_id).await;
    });
}
