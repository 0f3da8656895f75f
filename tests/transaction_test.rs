//! End-to-end transaction behavior against the in-memory controller.
//!
//! These tests run the full stack (handle, arbiter, session) over
//! `MockController`, verifying the observable wire behavior: which lines
//! go out, in what order, and what comes back.

use prologix_gpib::{
    ControllerConfig, GpibError, MockController, PrimaryAddress, PrologixController,
};
use std::time::Duration;

fn test_config() -> ControllerConfig {
    let mut config = ControllerConfig::new("mock");
    config.default_read_timeout = Duration::from_millis(100);
    config.lock_wait_timeout = Duration::from_millis(500);
    config
}

/// Build a controller over the mock and drop the setup directives from the
/// capture, so tests assert per-transaction lines only.
async fn connected(mock: &MockController) -> PrologixController {
    let controller = PrologixController::with_transport(Box::new(mock.clone()), &test_config())
        .await
        .unwrap();
    mock.clear_sent();
    controller
}

#[tokio::test]
async fn every_address_round_trips_through_the_addr_query() {
    let mock = MockController::new();
    let controller = connected(&mock).await;

    for addr in 0..=30 {
        let handle = controller.instrument(addr).unwrap();
        handle.write("*CLS").await.unwrap();

        let reported = controller.current_address().await.unwrap();
        assert_eq!(reported.value(), addr);
    }
}

#[tokio::test]
async fn setup_asserts_mode_framing_and_read_window() {
    let mock = MockController::new();
    let _controller = PrologixController::with_transport(Box::new(mock.clone()), &test_config())
        .await
        .unwrap();

    assert_eq!(
        mock.sent_lines(),
        ["++mode 1", "++eoi 1", "++eos 0", "++auto 0", "++read_tmo_ms 100"]
    );
}

#[tokio::test]
async fn query_sends_addressing_direction_then_payload() {
    let mock = MockController::new();
    mock.respond_to(
        10,
        "*idn?",
        "Agilent Technologies,33521B,MY52700477,2.03-1.19-2.00-52-00",
    );
    let controller = connected(&mock).await;

    let handle = controller.instrument(10).unwrap();
    let idn = handle.query("*idn?").await.unwrap();

    assert_eq!(
        idn,
        "Agilent Technologies,33521B,MY52700477,2.03-1.19-2.00-52-00"
    );
    assert_eq!(mock.sent_lines(), ["++addr 10", "++auto 1", "*idn?"]);
}

#[tokio::test]
async fn responses_lose_exactly_one_terminator() {
    let mock = MockController::new();
    let controller = connected(&mock).await;

    // The ++addr query reply is delivered as "10\r" on the wire.
    let handle = controller.instrument(10).unwrap();
    let reported = handle.query("++addr").await.unwrap();

    assert_eq!(reported, "10");
    assert!(!reported.ends_with('\r'));
}

#[tokio::test]
async fn batched_payload_goes_out_as_contiguous_lines() {
    let mock = MockController::new();
    let controller = connected(&mock).await;
    let handle = controller.instrument(10).unwrap();

    // Sync the session's cache to address 10 / listen direction first.
    handle.write("*CLS").await.unwrap();
    mock.clear_sent();

    handle
        .write("++addr 10\n++auto 0\nSOUR1:VOLT:OFFSET 1")
        .await
        .unwrap();

    assert_eq!(
        mock.sent_lines(),
        ["++addr 10", "++auto 0", "SOUR1:VOLT:OFFSET 1"],
        "embedded lines pass through unparsed, nothing else interleaves"
    );
}

#[tokio::test]
async fn cached_directives_are_not_resent() {
    let mock = MockController::new();
    let controller = connected(&mock).await;
    let handle = controller.instrument(4).unwrap();

    handle.write("OUTP ON").await.unwrap();
    handle.write("OUTP OFF").await.unwrap();

    // Address and direction were asserted by the first write only.
    assert_eq!(
        mock.sent_lines(),
        ["++addr 4", "OUTP ON", "OUTP OFF"],
        "setup already left auto at 0, the second write reuses both"
    );
}

#[tokio::test]
async fn direction_toggles_between_write_and_query() {
    let mock = MockController::new();
    mock.respond_to(6, "MEAS:VOLT:DC?", "4.999");
    let controller = connected(&mock).await;
    let handle = controller.instrument(6).unwrap();

    handle.write("CONF:VOLT:DC").await.unwrap();
    let volts = handle.query("MEAS:VOLT:DC?").await.unwrap();
    handle.write("*CLS").await.unwrap();

    assert_eq!(volts, "4.999");
    assert_eq!(
        mock.sent_lines(),
        [
            "++addr 6",
            "CONF:VOLT:DC",
            "++auto 1",
            "MEAS:VOLT:DC?",
            "++auto 0",
            "*CLS"
        ]
    );
}

#[tokio::test]
async fn timeout_fails_the_query_and_forces_a_reassert() {
    let mock = MockController::new();
    let controller = connected(&mock).await;
    let handle = controller.instrument(10).unwrap();

    // Nothing is scripted, so the wire stays silent.
    let err = handle
        .query_with_timeout("*idn?", Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, GpibError::Timeout(_)));

    // The next transaction must re-send addressing and direction: the
    // failure invalidated the cache.
    mock.respond_to(10, "*idn?", "ACME,Model 1,0,1.0");
    mock.clear_sent();

    let idn = handle.query("*idn?").await.unwrap();
    assert_eq!(idn, "ACME,Model 1,0,1.0");
    assert_eq!(mock.sent_lines(), ["++addr 10", "++auto 1", "*idn?"]);
}

#[tokio::test]
async fn send_failure_surfaces_and_recovers_on_the_next_transaction() {
    let mock = MockController::new();
    let controller = connected(&mock).await;
    let handle = controller.instrument(3).unwrap();

    mock.fail_next_send();
    let err = handle.write("OUTP ON").await.unwrap_err();
    assert!(matches!(err, GpibError::Connection(_)));

    mock.clear_sent();
    handle.write("OUTP ON").await.unwrap();
    assert_eq!(
        mock.sent_lines(),
        ["++addr 3", "OUTP ON"],
        "addressing is re-asserted after the failed attempt"
    );
}

#[tokio::test]
async fn controller_wide_operations_use_the_same_wire() {
    let mock = MockController::new();
    mock.set_version("Prologix GPIB-ETHERNET Controller version 01.06.06.00");
    mock.set_spoll_status(0x50);
    let controller = connected(&mock).await;

    let version = controller.version().await.unwrap();
    assert_eq!(
        version,
        "Prologix GPIB-ETHERNET Controller version 01.06.06.00"
    );

    let addr = PrimaryAddress::new(9).unwrap();
    assert_eq!(controller.serial_poll(addr).await.unwrap(), 0x50);
    controller.device_clear(addr).await.unwrap();
    controller.trigger(addr).await.unwrap();
    controller.local(addr).await.unwrap();
    controller.interface_clear().await.unwrap();

    assert_eq!(
        mock.sent_lines(),
        [
            "++ver", "++addr 9", "++spoll", "++clr", "++trg", "++loc", "++ifc"
        ],
        "the address is asserted once and reused by the following directives"
    );
}

#[tokio::test]
async fn invalid_addresses_are_rejected_at_handle_creation() {
    let mock = MockController::new();
    let controller = connected(&mock).await;

    assert!(controller.instrument(30).is_ok());
    assert!(matches!(
        controller.instrument(31).unwrap_err(),
        GpibError::Address(31)
    ));
}

#[tokio::test]
async fn close_invalidates_every_handle() {
    let mock = MockController::new();
    let controller = connected(&mock).await;
    let a = controller.instrument(5).unwrap();
    let b = controller.instrument(12).unwrap();

    controller.close().await.unwrap();
    controller.close().await.unwrap();

    assert!(matches!(
        a.write("OUTP ON").await.unwrap_err(),
        GpibError::Closed
    ));
    assert!(matches!(
        b.query("*idn?").await.unwrap_err(),
        GpibError::Closed
    ));
}
