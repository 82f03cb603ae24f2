use std::future::Future;
use std::io;
use std::sync::Arc;

use chron_pipeline::Worker;
use tokio::sync::watch;

use crate::context::AppContext;

/// Handle `chrond run`: loop until Ctrl-C, letting the current cycle finish.
pub async fn handle(ctx: &AppContext) -> anyhow::Result<()> {
    let worker = Worker::from_config(Arc::clone(&ctx.pipeline), &ctx.config.pipeline);
    let (shutdown, signal) = watch::channel(false);

    tokio::spawn(forward_interrupt(tokio::signal::ctrl_c(), shutdown));

    worker.run(signal).await?;
    Ok(())
}

/// Request shutdown once `interrupt` resolves.
async fn forward_interrupt(
    interrupt: impl Future<Output = io::Result<()>>,
    shutdown: watch::Sender<bool>,
) {
    match interrupt.await {
        Ok(()) => {
            tracing::info!("interrupt received; stopping after the current cycle");
            let _ = shutdown.send(true);
        }
        Err(error) => {
            tracing::warn!(%error, "cannot listen for interrupts; stop the process to exit");
            // Dropping the sender would stop the worker; park it instead.
            std::future::pending::<()>().await;
        }
    }
}
