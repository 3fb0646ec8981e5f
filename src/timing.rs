//! Run-time measurement helper.
//!
//! Wraps a future, measures its wall-clock duration and emits a
//! `Time Measurement` event through the router. The measured output is
//! returned unchanged; a failure to ship the event never affects it.

use std::future::Future;
use std::time::Instant;

use crate::contract::LogEvent;
use crate::logging::EventRouter;

/// Await `fut`, log how long it took under `function_name`, and return its
/// output.
pub async fn measure<F>(router: &EventRouter, function_name: &str, fut: F) -> F::Output
where
    F: Future,
{
    let start = Instant::now();
    let output = fut.await;
    let run_time = start.elapsed().as_secs_f64();

    router
        .emit(
            LogEvent::new(
                "Time Measurement",
                format!("The function {function_name} completed in {run_time:.4} secs."),
            )
            .with_label("functionName", function_name)
            .with_label("runTime", run_time),
        )
        .await;

    output
}
