//! Runtime helper for spawning link worker loops.

use crate::observability::events;
use std::future::Future;
use std::io;
use std::thread;
use tokio::runtime::Builder;
use tracing::error;

const COMPONENT: &str = "worker_runtime";

/// Runs `run_loop` on a dedicated thread with its own current-thread runtime,
/// so a busy link never stalls the caller's executor.
pub(crate) fn spawn_worker_loop<F, Fut>(worker_name: String, run_loop: F) -> io::Result<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + 'static,
{
    let thread_name = format!("link-{worker_name}");
    thread::Builder::new().name(thread_name).spawn(move || {
        let runtime = match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(
                    event = events::WORKER_STOPPED,
                    component = COMPONENT,
                    worker = %worker_name,
                    err = %err,
                    "failed to create worker runtime"
                );
                return;
            }
        };
        runtime.block_on(run_loop());
    })?;
    Ok(())
}
