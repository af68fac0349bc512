use std::time::Duration;

use crate::error::{PipeError, INFINITE};
use crate::event::WaitResult;
use crate::handle::{EventHandle, PipeHandle, INVALID_HANDLE_VALUE};
use crate::host::PipeHost;
use crate::overlapped::{ConnectStatus, OverlappedResult};
use crate::PipeLimits;

/// Creates a fully connected server/client pair on a fresh instance.
async fn connected_pair(host: &PipeHost, name: &str, buffer_size: usize) -> (PipeHandle, PipeHandle) {
    let server = host.create_pipe(name, 1, buffer_size).unwrap();
    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    assert_eq!(
        host.connect(server, &overlapped).unwrap(),
        ConnectStatus::Pending
    );
    let client = host.open_pipe(name).unwrap();
    let result = host
        .get_overlapped_result(server, &overlapped, true)
        .await
        .unwrap();
    assert_eq!(result, OverlappedResult::Complete(0));
    (server, client)
}

fn is_generic(err: &PipeError) -> bool {
    matches!(err, PipeError::Generic(_))
}

// ---- handles and lifecycle ---------------------------------------------

#[test]
fn invalid_sentinels() {
    assert_eq!(INVALID_HANDLE_VALUE, u64::MAX);
    assert!(!PipeHandle::INVALID.is_valid());
    assert!(!EventHandle::INVALID.is_valid());
}

#[tokio::test]
async fn closed_handle_is_invalid() {
    let host = PipeHost::new();
    let server = host.create_pipe("lifecycle", 1, 4096).unwrap();
    assert!(server.is_valid());

    host.close_handle(server).unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(
        host.read_file(server, &mut buf).await.unwrap_err(),
        PipeError::InvalidHandle
    );
}

#[tokio::test]
async fn double_close_is_a_caller_error() {
    let host = PipeHost::new();
    let server = host.create_pipe("double-close", 1, 4096).unwrap();
    host.close_handle(server).unwrap();
    assert!(is_generic(&host.close_handle(server).unwrap_err()));
}

#[tokio::test]
async fn stale_handle_never_resolves_after_slot_reuse() {
    let host = PipeHost::new();
    let stale = host.create_pipe("reuse-a", 1, 4096).unwrap();
    host.close_handle(stale).unwrap();

    // The freed slot is recycled with a new generation.
    let fresh = host.create_pipe("reuse-b", 1, 4096).unwrap();
    assert_ne!(stale.raw(), fresh.raw());

    let mut buf = [0u8; 4];
    assert_eq!(
        host.read_file(stale, &mut buf).await.unwrap_err(),
        PipeError::InvalidHandle
    );
}

#[tokio::test]
async fn handle_kinds_do_not_alias() {
    let host = PipeHost::new();
    let server = host.create_pipe("kinds", 1, 4096).unwrap();
    let masquerading = EventHandle(server.raw());
    assert_eq!(
        host.set_event(masquerading).unwrap_err(),
        PipeError::InvalidHandle
    );

    let event = host.create_event(true, false).unwrap();
    host.close_handle(event).unwrap();
    assert_eq!(host.set_event(event).unwrap_err(), PipeError::InvalidHandle);
}

#[tokio::test]
async fn create_pipe_validates_arguments() {
    let host = PipeHost::new();
    assert!(is_generic(&host.create_pipe("", 1, 4096).unwrap_err()));
    assert!(is_generic(&host.create_pipe("bad", 0, 4096).unwrap_err()));
    assert!(is_generic(&host.create_pipe("bad", 1, 0).unwrap_err()));

    host.create_pipe("taken", 2, 4096).unwrap();
    assert!(is_generic(&host.create_pipe("taken", 2, 512).unwrap_err()));
}

#[tokio::test]
async fn instance_table_bounds_creation() {
    let host = PipeHost::new();
    host.create_pipe("bounded", 1, 4096).unwrap();
    assert_eq!(
        host.create_pipe("bounded", 1, 4096).unwrap_err(),
        PipeError::PipeBusy
    );
}

#[tokio::test]
async fn open_pipe_errors() {
    let host = PipeHost::new();
    assert!(is_generic(&host.open_pipe("nonexistent").unwrap_err()));

    host.create_pipe("crowded", 1, 4096).unwrap();
    host.open_pipe("crowded").unwrap();
    assert_eq!(host.open_pipe("crowded").unwrap_err(), PipeError::PipeBusy);
}

// ---- connect semantics -------------------------------------------------

#[tokio::test]
async fn pending_connect_signals_event_when_client_opens() {
    let host = PipeHost::new();
    let server = host.create_pipe("pending-connect", 1, 4096).unwrap();
    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();

    assert_eq!(
        host.connect(server, &overlapped).unwrap(),
        ConnectStatus::Pending
    );
    assert_eq!(
        host.get_overlapped_result(server, &overlapped, false)
            .await
            .unwrap(),
        OverlappedResult::Incomplete
    );

    let _client = host.open_pipe("pending-connect").unwrap();

    assert_eq!(
        host.wait_for_multiple_objects(&[event], false, INFINITE)
            .await
            .unwrap(),
        WaitResult::Object(0)
    );
    assert_eq!(
        host.get_overlapped_result(server, &overlapped, true)
            .await
            .unwrap(),
        OverlappedResult::Complete(0)
    );
}

#[tokio::test]
async fn connect_completes_synchronously_with_waiting_client() {
    let host = PipeHost::new();
    let server = host.create_pipe("eager-client", 1, 4096).unwrap();
    let client = host.open_pipe("eager-client").unwrap();

    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    assert_eq!(
        host.connect(server, &overlapped).unwrap(),
        ConnectStatus::Connected
    );

    // The connection is immediately usable.
    host.write_file(client, b"hi").await.unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(host.read_file(server, &mut buf).await.unwrap(), 2);
    assert_eq!(&buf[..2], b"hi");

    // A second connect on a connected instance is an edge case, not an
    // error.
    let overlapped2 = host.create_overlapped(event).unwrap();
    assert_eq!(
        host.connect(server, &overlapped2).unwrap(),
        ConnectStatus::AlreadyConnected
    );
}

#[tokio::test]
async fn connect_requires_a_server_handle() {
    let host = PipeHost::new();
    let (_server, client) = connected_pair(&host, "wrong-side", 4096).await;
    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    assert!(is_generic(&host.connect(client, &overlapped).unwrap_err()));
}

// ---- multi-object waits ------------------------------------------------

#[tokio::test]
async fn wait_any_prefers_lowest_index() {
    let host = PipeHost::new();
    let first = host.create_event(true, false).unwrap();
    let second = host.create_event(true, false).unwrap();

    for _ in 0..10 {
        host.set_event(second).unwrap();
        host.set_event(first).unwrap();
        assert_eq!(
            host.wait_for_multiple_objects(&[first, second], false, INFINITE)
                .await
                .unwrap(),
            WaitResult::Object(0)
        );
        host.reset_event(first).unwrap();
        assert_eq!(
            host.wait_for_multiple_objects(&[first, second], false, INFINITE)
                .await
                .unwrap(),
            WaitResult::Object(1)
        );
        host.reset_event(second).unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn bounded_wait_times_out() {
    let host = PipeHost::new();
    let event = host.create_event(true, false).unwrap();

    let start = tokio::time::Instant::now();
    assert_eq!(
        host.wait_for_multiple_objects(&[event], false, 50)
            .await
            .unwrap(),
        WaitResult::TimedOut
    );
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn infinite_wait_released_by_signal() {
    let host = PipeHost::new();
    let event = host.create_event(true, false).unwrap();

    let waiter = {
        let host = host.clone();
        tokio::spawn(async move {
            host.wait_for_multiple_objects(&[event], false, INFINITE)
                .await
        })
    };
    host.set_event(event).unwrap();
    assert_eq!(waiter.await.unwrap().unwrap(), WaitResult::Object(0));
}

#[tokio::test(start_paused = true)]
async fn wait_for_all_requires_every_event() {
    let host = PipeHost::new();
    let first = host.create_event(false, false).unwrap();
    let second = host.create_event(false, false).unwrap();

    host.set_event(first).unwrap();
    assert_eq!(
        host.wait_for_multiple_objects(&[first, second], true, 20)
            .await
            .unwrap(),
        WaitResult::TimedOut
    );

    host.set_event(second).unwrap();
    assert_eq!(
        host.wait_for_multiple_objects(&[first, second], true, 20)
            .await
            .unwrap(),
        WaitResult::AllSignaled
    );

    // Auto-reset events were consumed by the successful wait.
    assert_eq!(
        host.wait_for_multiple_objects(&[first, second], true, 0)
            .await
            .unwrap(),
        WaitResult::TimedOut
    );
}

#[tokio::test(start_paused = true)]
async fn auto_reset_signal_is_consumed_once() {
    let host = PipeHost::new();
    let auto = host.create_event(false, true).unwrap();
    assert_eq!(
        host.wait_for_multiple_objects(&[auto], false, 0)
            .await
            .unwrap(),
        WaitResult::Object(0)
    );
    assert_eq!(
        host.wait_for_multiple_objects(&[auto], false, 10)
            .await
            .unwrap(),
        WaitResult::TimedOut
    );

    let manual = host.create_event(true, true).unwrap();
    for _ in 0..3 {
        assert_eq!(
            host.wait_for_multiple_objects(&[manual], false, 0)
                .await
                .unwrap(),
            WaitResult::Object(0)
        );
    }
}

#[tokio::test]
async fn wait_list_is_validated() {
    let host = PipeHost::new();
    let event = host.create_event(true, false).unwrap();

    assert!(is_generic(
        &host
            .wait_for_multiple_objects(&[], false, 0)
            .await
            .unwrap_err()
    ));
    assert!(is_generic(
        &host
            .wait_for_multiple_objects(&[event, event], false, 0)
            .await
            .unwrap_err()
    ));

    let mut too_many = Vec::new();
    for _ in 0..65 {
        too_many.push(host.create_event(true, false).unwrap());
    }
    assert!(is_generic(
        &host
            .wait_for_multiple_objects(&too_many, false, 0)
            .await
            .unwrap_err()
    ));
}

// ---- data transfer -----------------------------------------------------

#[tokio::test]
async fn synchronous_round_trip_preserves_bytes() {
    let host = PipeHost::new();
    let (server, client) = connected_pair(&host, "sync-rt", 4096).await;

    let payload = b"synchronous payload";
    assert_eq!(host.write_file(client, payload).await.unwrap(), payload.len());
    let mut buf = [0u8; 64];
    let n = host.read_file(server, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], payload);

    assert_eq!(host.write_file(server, b"reply").await.unwrap(), 5);
    let n = host.read_file(client, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"reply");
}

#[tokio::test]
async fn overlapped_round_trip_preserves_bytes() {
    let host = PipeHost::new();
    let (server, client) = connected_pair(&host, "ovl-rt", 4096).await;

    let write_event = host.create_event(true, false).unwrap();
    let write_ov = host.create_overlapped(write_event).unwrap();
    let out = host.allocate_buffer(32).unwrap();
    out.write_bytes(0, b"overlapped bytes").unwrap();
    host.write_overlapped(client, &write_ov, &out, 0, 16).unwrap();

    let read_event = host.create_event(true, false).unwrap();
    let read_ov = host.create_overlapped(read_event).unwrap();
    let inbuf = host.allocate_buffer(32).unwrap();
    host.read_overlapped(server, &read_ov, &inbuf, 0, 32).unwrap();

    assert_eq!(
        host.wait_for_multiple_objects(&[read_event], false, INFINITE)
            .await
            .unwrap(),
        WaitResult::Object(0)
    );
    assert_eq!(
        host.get_overlapped_result(server, &read_ov, true)
            .await
            .unwrap(),
        OverlappedResult::Complete(16)
    );
    assert_eq!(
        host.get_overlapped_result(client, &write_ov, true)
            .await
            .unwrap(),
        OverlappedResult::Complete(16)
    );
    assert_eq!(inbuf.read_bytes(0, 16).unwrap(), b"overlapped bytes");

    host.free_buffer(&out).unwrap();
    host.free_buffer(&inbuf).unwrap();
}

#[tokio::test]
async fn short_read_reports_more_data() {
    let host = PipeHost::new();
    let (server, client) = connected_pair(&host, "more-data", 4096).await;

    host.write_file(client, b"PIPEDATA").await.unwrap();

    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    let buf = host.allocate_buffer(8).unwrap();
    host.read_overlapped(server, &overlapped, &buf, 0, 3).unwrap();

    assert_eq!(
        host.get_overlapped_result(server, &overlapped, true)
            .await
            .unwrap(),
        OverlappedResult::MoreData(3)
    );
    assert_eq!(buf.read_bytes(0, 3).unwrap(), b"PIP");

    let mut rest = [0u8; 8];
    let n = host.read_file(server, &mut rest).await.unwrap();
    assert_eq!(&rest[..n], b"EDATA");
}

#[tokio::test]
async fn write_larger_than_capacity_completes_as_reader_drains() {
    let host = PipeHost::new();
    let (server, client) = connected_pair(&host, "small-cap", 4).await;

    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    let out = host.allocate_buffer(10).unwrap();
    out.write_bytes(0, b"0123456789").unwrap();
    host.write_overlapped(client, &overlapped, &out, 0, 10).unwrap();

    let mut collected = Vec::new();
    while collected.len() < 10 {
        let mut chunk = [0u8; 4];
        let n = host.read_file(server, &mut chunk).await.unwrap();
        collected.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(collected, b"0123456789");

    assert_eq!(
        host.get_overlapped_result(client, &overlapped, true)
            .await
            .unwrap(),
        OverlappedResult::Complete(10)
    );
}

// ---- in-flight contract ------------------------------------------------

#[tokio::test]
async fn second_operation_on_busy_handle_is_rejected() {
    let host = PipeHost::new();
    let (server, _client) = connected_pair(&host, "busy-handle", 4096).await;

    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    let buf = host.allocate_buffer(16).unwrap();
    host.read_overlapped(server, &overlapped, &buf, 0, 16).unwrap();

    // Same descriptor and a fresh one are both turned away while the
    // first read is in flight.
    assert_eq!(
        host.read_overlapped(server, &overlapped, &buf, 0, 16)
            .unwrap_err(),
        PipeError::PipeBusy
    );
    let event2 = host.create_event(true, false).unwrap();
    let overlapped2 = host.create_overlapped(event2).unwrap();
    assert_eq!(
        host.read_overlapped(server, &overlapped2, &buf, 0, 16)
            .unwrap_err(),
        PipeError::PipeBusy
    );

    assert!(host.cancel_io(server).unwrap());
}

#[tokio::test]
async fn cancel_releases_a_concurrent_waiter() {
    let host = PipeHost::new();
    let (server, _client) = connected_pair(&host, "cancel", 4096).await;

    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    let buf = host.allocate_buffer(16).unwrap();
    host.read_overlapped(server, &overlapped, &buf, 0, 16).unwrap();

    let waiter = {
        let host = host.clone();
        tokio::spawn(async move {
            host.wait_for_multiple_objects(&[event], false, INFINITE)
                .await
        })
    };

    assert!(host.cancel_io(server).unwrap());
    assert_eq!(waiter.await.unwrap().unwrap(), WaitResult::Object(0));
    assert_eq!(
        host.get_overlapped_result(server, &overlapped, true)
            .await
            .unwrap_err(),
        PipeError::Canceled
    );

    // Nothing left to cancel.
    assert!(!host.cancel_io(server).unwrap());
}

#[tokio::test]
async fn cancel_io_ex_targets_one_descriptor() {
    let host = PipeHost::new();
    let (server, _client) = connected_pair(&host, "cancel-ex", 4096).await;

    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    let buf = host.allocate_buffer(16).unwrap();
    host.read_overlapped(server, &overlapped, &buf, 0, 16).unwrap();

    let stranger_event = host.create_event(true, false).unwrap();
    let stranger = host.create_overlapped(stranger_event).unwrap();
    assert!(!host.cancel_io_ex(server, &stranger).unwrap());
    assert!(host.cancel_io_ex(server, &overlapped).unwrap());
}

#[tokio::test]
async fn canceled_pending_connect_rearms_the_instance() {
    let host = PipeHost::new();
    let server = host.create_pipe("rearm", 1, 4096).unwrap();
    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();

    assert_eq!(
        host.connect(server, &overlapped).unwrap(),
        ConnectStatus::Pending
    );
    assert!(host.cancel_io(server).unwrap());
    assert_eq!(
        host.get_overlapped_result(server, &overlapped, true)
            .await
            .unwrap_err(),
        PipeError::Canceled
    );

    host.reset_event(event).unwrap();
    let retry = host.create_overlapped(event).unwrap();
    assert_eq!(host.connect(server, &retry).unwrap(), ConnectStatus::Pending);
    let _client = host.open_pipe("rearm").unwrap();
    assert_eq!(
        host.get_overlapped_result(server, &retry, true)
            .await
            .unwrap(),
        OverlappedResult::Complete(0)
    );
}

#[tokio::test]
async fn result_retrieval_without_operation_errors() {
    let host = PipeHost::new();
    let (server, _client) = connected_pair(&host, "no-op", 4096).await;
    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    assert!(is_generic(
        &host
            .get_overlapped_result(server, &overlapped, false)
            .await
            .unwrap_err()
    ));
}

// ---- teardown semantics ------------------------------------------------

#[tokio::test]
async fn clean_close_drains_then_reports_eof() {
    let host = PipeHost::new();
    let (server, client) = connected_pair(&host, "clean-close", 4096).await;

    host.write_file(client, b"bye").await.unwrap();
    host.close_handle(client).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(host.read_file(server, &mut buf).await.unwrap(), 3);
    assert_eq!(&buf[..3], b"bye");
    assert_eq!(host.read_file(server, &mut buf).await.unwrap(), 0);
    assert_eq!(
        host.write_file(server, b"anyone?").await.unwrap_err(),
        PipeError::BrokenPipe
    );
}

#[tokio::test]
async fn forced_disconnect_discards_data_and_breaks_the_client() {
    let host = PipeHost::new();
    let (server, client) = connected_pair(&host, "forced", 4096).await;

    host.write_file(client, b"undelivered").await.unwrap();
    host.disconnect_pipe(server).unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(
        host.read_file(client, &mut buf).await.unwrap_err(),
        PipeError::BrokenPipe
    );
    assert_eq!(
        host.write_file(client, b"more").await.unwrap_err(),
        PipeError::BrokenPipe
    );

    // The instance is idle again and accepts the next client.
    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    assert_eq!(
        host.connect(server, &overlapped).unwrap(),
        ConnectStatus::Pending
    );
    let client2 = host.open_pipe("forced").unwrap();
    assert_eq!(
        host.get_overlapped_result(server, &overlapped, true)
            .await
            .unwrap(),
        OverlappedResult::Complete(0)
    );
    host.write_file(client2, b"fresh").await.unwrap();
    let n = host.read_file(server, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"fresh");
}

#[tokio::test]
async fn disconnect_requires_a_connected_server() {
    let host = PipeHost::new();
    let server = host.create_pipe("not-connected", 1, 4096).unwrap();
    assert!(is_generic(&host.disconnect_pipe(server).unwrap_err()));

    let (_server2, client) = connected_pair(&host, "client-side", 4096).await;
    assert!(is_generic(&host.disconnect_pipe(client).unwrap_err()));
}

#[tokio::test]
async fn client_process_id_is_recorded() {
    let host = PipeHost::new();
    let (server, client) = connected_pair(&host, "pid", 4096).await;
    assert_eq!(host.client_process_id(server).unwrap(), std::process::id());
    assert_eq!(host.client_process_id(client).unwrap(), std::process::id());
}

// ---- direct buffers ----------------------------------------------------

#[tokio::test]
async fn buffer_access_is_bounds_and_lifetime_checked() {
    let host = PipeHost::new();
    assert!(is_generic(&host.allocate_buffer(0).unwrap_err()));

    let buf = host.allocate_buffer(8).unwrap();
    buf.write_bytes(4, b"abcd").unwrap();
    assert_eq!(buf.read_bytes(4, 4).unwrap(), b"abcd");
    assert!(is_generic(&buf.write_bytes(5, b"abcd").unwrap_err()));
    assert!(is_generic(&buf.read_bytes(8, 1).unwrap_err()));

    host.free_buffer(&buf).unwrap();
    assert!(is_generic(&host.free_buffer(&buf).unwrap_err()));
    assert!(is_generic(&buf.read_bytes(0, 1).unwrap_err()));
}

#[tokio::test]
async fn freeing_a_pinned_buffer_is_rejected() {
    let host = PipeHost::new();
    let (server, _client) = connected_pair(&host, "pinned", 4096).await;

    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    let buf = host.allocate_buffer(16).unwrap();
    host.read_overlapped(server, &overlapped, &buf, 0, 16).unwrap();

    assert!(is_generic(&host.free_buffer(&buf).unwrap_err()));

    assert!(host.cancel_io(server).unwrap());
    assert_eq!(
        host.get_overlapped_result(server, &overlapped, true)
            .await
            .unwrap_err(),
        PipeError::Canceled
    );

    // The transfer task releases its pin on the way out.
    let mut freed = false;
    for _ in 0..100 {
        if host.free_buffer(&buf).is_ok() {
            freed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(freed);
}

#[tokio::test]
async fn overlapped_span_is_validated() {
    let host = PipeHost::new();
    let (server, _client) = connected_pair(&host, "spans", 4096).await;
    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    let buf = host.allocate_buffer(8).unwrap();

    assert!(is_generic(
        &host
            .read_overlapped(server, &overlapped, &buf, 0, 0)
            .unwrap_err()
    ));
    assert!(is_generic(
        &host
            .read_overlapped(server, &overlapped, &buf, 4, 8)
            .unwrap_err()
    ));
}

// ---- selector ----------------------------------------------------------

#[tokio::test]
async fn selector_hands_back_the_ready_token() {
    let host = PipeHost::new();
    let first = host.create_event(true, false).unwrap();
    let second = host.create_event(true, false).unwrap();

    let mut selector = crate::EventSelector::new(&host);
    selector.add(first, "first");
    selector.add(second, "second");

    host.set_event(second).unwrap();
    assert_eq!(*selector.select(INFINITE).await.unwrap().unwrap(), "second");

    // Both ready: earliest registration wins.
    host.set_event(first).unwrap();
    assert_eq!(*selector.select(INFINITE).await.unwrap().unwrap(), "first");

    assert_eq!(selector.remove(first), Some("first"));
    assert_eq!(*selector.select(INFINITE).await.unwrap().unwrap(), "second");

    assert_eq!(selector.remove(second), Some("second"));
    assert!(selector.is_empty());
    assert!(selector.select(0).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn selector_reports_timeout_as_none() {
    let host = PipeHost::new();
    let event = host.create_event(true, false).unwrap();
    let mut selector: crate::EventSelector<&str> = crate::EventSelector::new(&host);
    selector.add(event, "quiet");
    assert!(selector.select(25).await.unwrap().is_none());
}

// ---- configuration -----------------------------------------------------

#[tokio::test]
async fn limits_round_trip_and_apply() {
    assert_eq!(
        PipeLimits::default(),
        PipeLimits {
            max_instances: 1,
            buffer_size: 4096
        }
    );

    let limits = PipeLimits::from_json(r#"{"max_instances":2,"buffer_size":64}"#).unwrap();
    assert_eq!(limits.max_instances, 2);
    assert_eq!(limits.buffer_size, 64);
    let json = limits.to_json().unwrap();
    assert_eq!(PipeLimits::from_json(&json).unwrap(), limits);

    // Missing fields fall back to defaults.
    assert_eq!(PipeLimits::from_json("{}").unwrap(), PipeLimits::default());
    assert!(PipeLimits::from_json("not json").is_err());

    let host = PipeHost::new();
    let server = host.create_pipe_with("configured", &limits).unwrap();
    let _second = host.create_pipe_with("configured", &limits).unwrap();
    let client = host.open_pipe("configured").unwrap();
    host.write_file(client, b"cfg").await.unwrap();

    // First instance holds the waiting client; accept it.
    let event = host.create_event(true, false).unwrap();
    let overlapped = host.create_overlapped(event).unwrap();
    assert_eq!(
        host.connect(server, &overlapped).unwrap(),
        ConnectStatus::Connected
    );
    let mut buf = [0u8; 8];
    let n = host.read_file(server, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"cfg");
}

// ---- name formatting ---------------------------------------------------

#[test]
fn pipe_names_are_normalized() {
    assert_eq!(
        crate::utils::format_pipe_name("echo"),
        "\\\\.\\pipe\\echo"
    );
    assert_eq!(
        crate::utils::format_pipe_name("\\\\.\\pipe\\echo"),
        "\\\\.\\pipe\\echo"
    );
}

#[tokio::test]
async fn prefixed_and_bare_names_are_the_same_pipe() {
    let host = PipeHost::new();
    host.create_pipe("shared-name", 1, 4096).unwrap();
    host.open_pipe("\\\\.\\pipe\\shared-name").unwrap();
}
