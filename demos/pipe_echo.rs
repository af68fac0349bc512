//! Overlapped echo round trip over a single pipe instance.
//!
//! The server issues an asynchronous connect and read; the client runs
//! as a concurrent task on the same host, using the synchronous adapter.

use overpipe::{ConnectStatus, OverlappedResult, PipeHost, WaitResult, INFINITE};

#[tokio::main]
async fn main() -> overpipe::Result<()> {
    env_logger::init();

    let host = PipeHost::new();
    let server = host.create_pipe("echo", 1, 4096)?;

    let connect_event = host.create_event(true, false)?;
    let connect_ov = host.create_overlapped(connect_event)?;
    let status = host.connect(server, &connect_ov)?;
    println!("server: connect -> {:?}", status);

    let client_host = host.clone();
    let client_task = tokio::spawn(async move {
        let client = client_host.open_pipe("echo")?;
        client_host.write_file(client, b"ping").await?;
        let mut reply = [0u8; 16];
        let n = client_host.read_file(client, &mut reply).await?;
        println!("client: got {:?}", String::from_utf8_lossy(&reply[..n]));
        client_host.close_handle(client)?;
        overpipe::Result::Ok(())
    });

    if status == ConnectStatus::Pending {
        let woke = host
            .wait_for_multiple_objects(&[connect_event], false, INFINITE)
            .await?;
        assert_eq!(woke, WaitResult::Object(0));
        host.get_overlapped_result(server, &connect_ov, true).await?;
        println!("server: client connected");
    }

    let read_event = host.create_event(true, false)?;
    let read_ov = host.create_overlapped(read_event)?;
    let buffer = host.allocate_buffer(64)?;
    host.read_overlapped(server, &read_ov, &buffer, 0, 64)?;

    match host.get_overlapped_result(server, &read_ov, true).await? {
        OverlappedResult::Complete(n) | OverlappedResult::MoreData(n) => {
            let request = buffer.read_bytes(0, n)?;
            println!("server: echoing {} bytes", n);
            host.write_file(server, &request).await?;
        }
        other => println!("server: read resolved to {:?}", other),
    }

    client_task.await.expect("client task panicked")?;
    host.free_buffer(&buffer)?;
    host.close_handle(server)?;
    Ok(())
}
