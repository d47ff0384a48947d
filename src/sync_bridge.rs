use crate::error::TransportError;
use std::future::Future;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Fails unless `rt` belongs to a multi-thread runtime. A current-thread
/// runtime only drives its timers while its own thread polls it, so a
/// transaction bound could never fire.
pub fn ensure_multi_thread(rt: &Handle) -> Result<(), TransportError> {
    match rt.runtime_flavor() {
        RuntimeFlavor::MultiThread => Ok(()),
        flavor => Err(TransportError::UnsupportedRuntime(format!(
            "{flavor:?} handle; a multi-thread runtime is required"
        ))),
    }
}

/// Drives a transport future to completion from the blocking API.
///
/// Inside a runtime worker the thread is handed over with `block_in_place`,
/// which requires the multi-thread scheduler; callers on any other runtime
/// get `TransportError::UnsupportedRuntime` instead of a panic.
pub fn block_on_ops<F, T>(rt: &Handle, f: F) -> Result<T, TransportError>
where
    F: Future<Output = T>,
{
    ensure_multi_thread(rt)?;
    match Handle::try_current() {
        Ok(current) => {
            if current.runtime_flavor() != RuntimeFlavor::MultiThread {
                return Err(TransportError::UnsupportedRuntime(
                    "called from inside a current-thread runtime".into(),
                ));
            }
            Ok(tokio::task::block_in_place(|| rt.block_on(f)))
        }
        Err(_) => Ok(rt.block_on(f)),
    }
}
