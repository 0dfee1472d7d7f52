//! Minimal echo server: answers every request with its own bytes.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --example request-client -- hello
//!
//! The server exits after five requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ipcslot::{ChannelConfig, Listener};

const CHANNEL: &str = "ipcslot-echo-example";
const MAX_REQUESTS: usize = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ChannelConfig::default().with_size(4096);
    let mut listener = Listener::create(CHANNEL, config)?;
    let shutdown = listener.shutdown_handle()?;
    eprintln!("Listening on channel {CHANNEL}");

    let served = Arc::new(AtomicUsize::new(0));
    let stop = shutdown.clone();
    listener.register(move |req| {
        let payload = req.payload_until_nul().to_vec();
        eprintln!("Received {} bytes", payload.len());
        if let Err(err) = req.respond(&payload) {
            eprintln!("Reply failed: {err}");
            return;
        }
        if served.fetch_add(1, Ordering::SeqCst) + 1 >= MAX_REQUESTS {
            let _ = stop.trigger();
        }
    });

    listener.listen_until(shutdown.stop_flag())?;
    eprintln!("Served {MAX_REQUESTS} requests, exiting");
    Ok(())
}
