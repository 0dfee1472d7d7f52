use std::io::{IsTerminal, Write};
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One exchange seen from either side.
#[derive(Serialize)]
pub struct MessageOutput<'a> {
    pub channel: &'a str,
    pub direction: &'static str,
    pub size: usize,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u128>,
}

impl<'a> MessageOutput<'a> {
    pub fn new(channel: &'a str, direction: &'static str, payload: &[u8]) -> Self {
        Self {
            channel,
            direction,
            size: payload.len(),
            payload: payload_preview(payload),
            elapsed_ms: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = Some(elapsed.as_millis());
        self
    }
}

/// Print a message. `raw` is used verbatim for `OutputFormat::Raw`.
pub fn print_message(message: &MessageOutput<'_>, raw: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(message),
        OutputFormat::Table => {
            let elapsed = message
                .elapsed_ms
                .map(|ms| format!("{ms}ms"))
                .unwrap_or_default();
            print_table(
                &["CHANNEL", "DIRECTION", "SIZE", "ELAPSED", "PAYLOAD"],
                vec![vec![
                    message.channel.to_string(),
                    message.direction.to_string(),
                    message.size.to_string(),
                    elapsed,
                    message.payload.clone(),
                ]],
            );
        }
        OutputFormat::Pretty => {
            let elapsed = message
                .elapsed_ms
                .map(|ms| format!(" elapsed={ms}ms"))
                .unwrap_or_default();
            println!(
                "channel={} {} size={}{} payload={}",
                message.channel, message.direction, message.size, elapsed, message.payload
            );
        }
        OutputFormat::Raw => print_raw(raw),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_table(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Segment bytes without the zero fill after the message.
pub fn trim_fill(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &data[..end]
}

pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_fill_keeps_interior_zeros() {
        assert_eq!(trim_fill(b"ab\0c\0\0"), b"ab\0c");
        assert_eq!(trim_fill(b"\0\0"), b"");
    }

    #[test]
    fn binary_payloads_are_summarized() {
        assert_eq!(payload_preview(b"pong"), "pong");
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }

    #[test]
    fn json_omits_missing_elapsed() {
        let message = MessageOutput::new("chan1", "request", b"ping");
        let json = serde_json::to_string(&message).expect("serializes");
        assert_eq!(
            json,
            r#"{"channel":"chan1","direction":"request","size":4,"payload":"ping"}"#
        );
    }
}
