use futures::{Future, FutureExt};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose request-level chatter drowns out the batch log.
const QUIET_TARGETS: [&str; 4] = ["hyper_util", "reqwest", "rustls", "h2"];

pub fn setup_tracing() {
    let mut filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    for target in QUIET_TARGETS {
        if let Ok(directive) = format!("{target}=off").parse() {
            filter_layer = filter_layer.add_directive(directive);
        }
    }

    // JSON lines on stdout, one event per line
    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stdout);

    // A second call (tests, embedded use) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init();
}

/// Installs tracing, runs the future and reports its outcome.
///
/// Panics are caught and logged with a backtrace so a crashed batch run still
/// leaves a trail in the log. The returned error is the future's own error, or
/// an error describing the panic.
pub async fn run_with_tracing<F, Fut>(future: F) -> anyhow::Result<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    setup_tracing();

    match std::panic::AssertUnwindSafe(future()).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = ?e, "Run failed");
            Err(e)
        }
        Err(payload) => {
            capture_panic_details(payload.as_ref());
            Err(anyhow::anyhow!("run panicked"))
        }
    }
}

fn capture_panic_details(e: &(dyn std::any::Any + Send)) {
    let backtrace = backtrace::Backtrace::new();
    if let Some(s) = e.downcast_ref::<&str>() {
        error!(panic_message = *s, backtrace = ?backtrace, "Panic occurred with message");
    } else if let Some(s) = e.downcast_ref::<String>() {
        error!(panic_message = s, backtrace = ?backtrace, "Panic occurred with message");
    } else {
        error!(backtrace = ?backtrace, "Panic occurred but the payload is not a string");
    }
}
