//! Sends one request to the echo-server example and prints the reply.
//!
//! Run with:
//!   cargo run --example request-client -- "some text"

use std::time::Duration;

use ipcslot::{ChannelConfig, ChannelError, Requester};

const CHANNEL: &str = "ipcslot-echo-example";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let message = std::env::args().nth(1).unwrap_or_else(|| "ping".to_string());
    let config = ChannelConfig::default().with_size(4096);
    let mut requester = Requester::connect(CHANNEL, config)?;

    // Retry a couple of times: a timeout leaves the channel usable.
    for attempt in 1..=3 {
        match requester.send_request(message.as_bytes(), Some(Duration::from_secs(2))) {
            Ok(()) => {
                println!("{}", requester.reply_text()?);
                return Ok(());
            }
            Err(err @ ChannelError::TimedOut(_)) => {
                eprintln!("Attempt {attempt}: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err("server did not answer".into())
}
