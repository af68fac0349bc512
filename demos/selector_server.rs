//! Event-driven server: several pipe instances fanned into one selector.
//!
//! Each instance carries its own overlapped descriptor and buffer, and
//! cycles accept -> read as its completion event fires. One loop serves
//! every instance without a thread per connection.

use overpipe::{
    ConnectStatus, DirectBuffer, EventSelector, Overlapped, OverlappedResult, PipeHandle,
    PipeHost, INFINITE,
};

const PIPE_NAME: &str = "fanin";
const INSTANCES: usize = 2;

enum Phase {
    Accepting,
    Reading,
}

struct ClientInstance {
    handle: PipeHandle,
    overlapped: Overlapped,
    buffer: DirectBuffer,
    phase: Phase,
}

#[tokio::main]
async fn main() -> overpipe::Result<()> {
    env_logger::init();

    let host = PipeHost::new();
    let mut selector = EventSelector::new(&host);

    for _ in 0..INSTANCES {
        let handle = host.create_pipe(PIPE_NAME, INSTANCES as u32, 4096)?;
        let event = host.create_event(true, false)?;
        let overlapped = host.create_overlapped(event)?;
        let buffer = host.allocate_buffer(4096)?;
        match host.connect(handle, &overlapped)? {
            ConnectStatus::Pending => {}
            other => println!("server: connect resolved early: {:?}", other),
        }
        selector.add(
            event,
            ClientInstance {
                handle,
                overlapped,
                buffer,
                phase: Phase::Accepting,
            },
        );
    }

    for i in 0..INSTANCES {
        let host = host.clone();
        tokio::spawn(async move {
            let client = host.open_pipe(PIPE_NAME)?;
            let message = format!("hello from client {}", i);
            host.write_file(client, message.as_bytes()).await?;
            host.close_handle(client)?;
            overpipe::Result::Ok(())
        });
    }

    let mut served = 0;
    while served < INSTANCES {
        let Some(instance) = selector.select(INFINITE).await? else {
            continue;
        };
        host.reset_event(instance.overlapped.event())?;
        match instance.phase {
            Phase::Accepting => {
                host.get_overlapped_result(instance.handle, &instance.overlapped, true)
                    .await?;
                println!("server: instance accepted a client");
                host.read_overlapped(
                    instance.handle,
                    &instance.overlapped,
                    &instance.buffer,
                    0,
                    4096,
                )?;
                instance.phase = Phase::Reading;
            }
            Phase::Reading => {
                match host
                    .get_overlapped_result(instance.handle, &instance.overlapped, true)
                    .await
                {
                    Ok(OverlappedResult::Complete(n)) | Ok(OverlappedResult::MoreData(n)) => {
                        let message = instance.buffer.read_bytes(0, n)?;
                        println!("server: {}", String::from_utf8_lossy(&message));
                    }
                    Ok(other) => println!("server: read resolved to {:?}", other),
                    Err(e) => println!("server: read failed: {}", e),
                }
                served += 1;
            }
        }
    }

    Ok(())
}
