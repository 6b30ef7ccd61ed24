use std::future::Future;

use tokio::task::JoinHandle;

/// A long running component of the daemon.
///
/// Services own their state and run as a single task until their inputs are closed. They
/// communicate only through the channels they were constructed with.
pub trait Service: Sized + Send + 'static {
    /// Runs the service to completion.
    fn run(self) -> impl Future<Output = ()> + Send + 'static;

    /// Spawns the service on the current tokio runtime.
    ///
    /// Must be called from within a runtime context.
    fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
