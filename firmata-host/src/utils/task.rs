//! Defines the Firmata-Host runtime task runner.
use std::future::Future;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::errors::{Error, RuntimeError, Unknown};

/// Represents the result of a task.
/// A task may return either () or Result<(), Error> for flexibility, which
/// will be converted to a TaskResult sent to the runtime.
#[derive(Debug)]
pub enum TaskResult {
    Ok,
    Err(Error),
}

/// Represents a handler on a running task (can be used to abort it).
pub type TaskHandler = JoinHandle<Result<(), Error>>;

/// Globally accessible runtime transmitter(TX)/receiver(RX) (not initialised yet)
pub static RUNTIME_TX: OnceCell<Mutex<Option<UnboundedSender<UnboundedReceiver<TaskResult>>>>> =
    OnceCell::const_new();
pub static RUNTIME_RX: OnceCell<Mutex<Option<UnboundedReceiver<UnboundedReceiver<TaskResult>>>>> =
    OnceCell::const_new();

impl From<Result<(), Error>> for TaskResult {
    fn from(result: Result<(), Error>) -> Self {
        match result {
            Ok(_) => TaskResult::Ok,
            Err(e) => TaskResult::Err(e),
        }
    }
}

impl From<()> for TaskResult {
    fn from(_: ()) -> Self {
        TaskResult::Ok
    }
}

/// Creates the runtime channel (once): called by the code generated by `#[firmata_host::runtime]`.
pub async fn init_task_channel() {
    RUNTIME_RX
        .get_or_init(|| async {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<UnboundedReceiver<TaskResult>>();

            RUNTIME_TX
                .get_or_init(|| async { Mutex::new(Some(tx)) })
                .await;

            Mutex::new(Some(rx))
        })
        .await;
}

/// Waits for every task spawned through [`run`] so far (and the ones they spawn) to finish.
///
/// Called at the end of the code generated by `#[firmata_host::runtime]`.
pub async fn wait_for_tasks() -> Result<(), Error> {
    let cell = RUNTIME_RX.get().ok_or(RuntimeError)?;
    let mut receiver = cell.lock().take().ok_or(RuntimeError)?;

    while let Ok(mut task_receiver) = receiver.try_recv() {
        // An aborted task drops its sender: recv() then yields None.
        if let Some(TaskResult::Err(err)) = task_receiver.recv().await {
            log::error!("Task failed: {}", err);
        }
    }

    *cell.lock() = Some(receiver);
    Ok(())
}

/// Runs a given future as a Tokio task while ensuring the main function (marked by `#[firmata_host::runtime]`)
/// will not finish before all tasks running are done.
/// This is done by using a globally accessible channel to communicate the handlers to be waited by the
/// runtime.
///
/// # Parameters
/// * `future`: A future that implements `Future<Output = ()>`, `Send`, and has a `'static` lifetime.
///
/// # Errors
/// * `RuntimeError`: not called from within a `#[firmata_host::runtime]` (or `#[firmata_macros::test]`).
///
/// # Example
/// ```
/// use firmata_host::utils::task;
///
/// #[firmata_host::runtime]
/// async fn main() {
///     task::run(async move {
///         // whatever
///     }).unwrap();
/// }
/// ```
pub fn run<F, T>(future: F) -> Result<TaskHandler, Error>
where
    F: Future<Output = T> + Send + 'static,
    T: Into<TaskResult> + Send + 'static,
{
    let runtime = Handle::try_current().map_err(|_| RuntimeError)?;

    // Create a transmitter(tx)/receiver(rx) unique to this task.
    let (task_tx, task_rx) = tokio::sync::mpsc::unbounded_channel();

    // Send the receiver(rx) side of the task-channel to the runtime.
    {
        let cell = RUNTIME_TX.get().ok_or(RuntimeError)?;
        let mut lock = cell.lock();
        let runtime_tx = lock.as_mut().ok_or(RuntimeError)?;
        runtime_tx.send(task_rx).map_err(|err| Unknown {
            info: err.to_string(),
        })?;
    }

    // Run the future: its result goes through the task channel.
    let handler = runtime.spawn(async move {
        let result = future.await.into();
        task_tx.send(result).map_err(|err| Unknown {
            info: err.to_string(),
        })?;
        Ok(())
    });

    Ok(handler)
}

/// Same as [`run`] when called from `#[firmata_host::runtime]`. From any other Tokio runtime, the
/// future is spawned as a plain Tokio task that the runtime does not wait for.
///
/// # Errors
/// * `RuntimeError`: not called from within a Tokio runtime.
pub fn spawn<F, T>(future: F) -> Result<TaskHandler, Error>
where
    F: Future<Output = T> + Send + 'static,
    T: Into<TaskResult> + Send + 'static,
{
    let runtime = Handle::try_current().map_err(|_| RuntimeError)?;
    let has_channel = RUNTIME_TX
        .get()
        .is_some_and(|cell| cell.lock().is_some());
    if has_channel {
        return run(future);
    }

    Ok(runtime.spawn(async move {
        match future.await.into() {
            TaskResult::Ok => Ok(()),
            TaskResult::Err(err) => Err(err),
        }
    }))
}

#[macro_export]
macro_rules! pause {
    ($ms:expr) => {
        tokio::time::sleep(tokio::time::Duration::from_millis($ms as u64)).await
    };
}

#[macro_export]
macro_rules! pause_sync {
    ($ms:expr) => {
        std::thread::sleep(std::time::Duration::from_millis($ms as u64))
    };
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;
    use std::time::SystemTime;

    use crate::errors::{Error, Unknown};
    use crate::utils::task;

    #[firmata_macros::runtime]
    async fn my_runtime() -> Result<(), Error> {
        task::run(async move {
            pause!(500);
            task::run(async move {
                pause!(100);
                task::run(async move {
                    pause!(100);
                })?;
                Ok::<(), Error>(())
            })?;
            Ok::<(), Error>(())
        })?;

        task::run(async move {
            pause!(500);
        })?;

        Ok(())
    }

    #[test]
    #[serial_test::serial]
    fn test_task_parallel_execution() {
        // The runtime waits for every task (nested ones included), which run in parallel.
        let start = SystemTime::now();
        my_runtime().unwrap();
        let end = SystemTime::now();

        let duration = end.duration_since(start).unwrap().as_millis();
        assert!(
            duration >= 700,
            "Duration should be at least 700ms (found: {})",
            duration,
        );
        assert!(
            duration < 1200,
            "Duration should be lower than 1200ms (found: {})",
            duration,
        );
    }

    #[test]
    fn test_run_outside_runtime() {
        let result = task::run(async move {});
        assert!(result.is_err());
        assert_eq!(
            result.err().unwrap().to_string(),
            "Runtime error: Are you sure your code runs inside #[firmata_host::runtime]?"
        );
    }

    #[firmata_macros::test]
    async fn test_task_abort_execution() {
        let flag = Arc::new(AtomicU8::new(0));
        let flag_clone = flag.clone();

        // Increment the flag after 100ms
        task::run(async move {
            pause!(100);
            flag_clone.fetch_add(1, Ordering::SeqCst);
        })
        .expect("Should not panic");

        pause!(50);
        assert_eq!(
            flag.load(Ordering::SeqCst),
            0,
            "Flag should not be updated by the task before 100ms",
        );

        pause!(100);
        assert_eq!(
            flag.load(Ordering::SeqCst),
            1,
            "Flag should be updated by the task after 100ms",
        );

        // Same test but aborting
        let flag_clone = flag.clone();
        let handler = task::run(async move {
            pause!(100);
            flag_clone.fetch_add(1, Ordering::SeqCst);
        })
        .expect("Should not panic");

        pause!(50);
        handler.abort();

        pause!(100);
        assert_eq!(
            flag.load(Ordering::SeqCst),
            1,
            "Flag should not be updated by an aborted task",
        );
    }

    #[firmata_macros::test]
    async fn test_task_with_result() {
        let task = task::run(async move { Ok::<(), Error>(()) });
        assert!(task.is_ok(), "An Ok(()) task do not panic the runtime");

        let task = task::run(async move {
            Err::<(), Error>(Unknown {
                info: "wow panic!".to_string(),
            })
        });
        assert!(task.is_ok(), "A failing task do not panic the runtime");
    }

    #[test]
    fn test_spawn_outside_runtime() {
        let result = task::spawn(async move {});
        assert!(result.is_err());
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_spawn_from_plain_tokio() {
        let flag = Arc::new(AtomicU8::new(0));
        let flag_clone = flag.clone();
        let handler = task::spawn(async move {
            pause!(20);
            flag_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(handler.await.unwrap().is_ok());
        assert_eq!(flag.load(Ordering::SeqCst), 1);
    }
}
