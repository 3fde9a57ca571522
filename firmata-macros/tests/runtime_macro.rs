use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use firmata_host::errors::Error;
use firmata_host::utils::task;

#[firmata_macros::runtime]
async fn runtime_without_result() {
    task::run(async move {
        firmata_host::utils::sleep(std::time::Duration::from_millis(50)).await;
    })
    .unwrap();
}

static COUNTER: AtomicU8 = AtomicU8::new(0);

#[firmata_macros::runtime]
async fn runtime_with_result() -> Result<u8, Error> {
    task::run(async move {
        firmata_host::utils::sleep(std::time::Duration::from_millis(100)).await;
        COUNTER.fetch_add(1, Ordering::SeqCst);
    })?;
    Ok(COUNTER.load(Ordering::SeqCst))
}

#[test]
#[serial_test::serial]
fn test_runtime_macro() {
    runtime_without_result();
}

#[test]
#[serial_test::serial]
fn test_runtime_waits_before_returning() {
    assert_eq!(runtime_with_result().unwrap(), 1);
    assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
}

#[firmata_macros::test]
async fn test_test_macro() {
    let counter = Arc::new(AtomicU8::new(0));
    let clone = counter.clone();
    task::run(async move {
        clone.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    firmata_host::utils::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
