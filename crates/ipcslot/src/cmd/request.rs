use std::fs;
use std::time::Instant;

use ipcslot_channel::Requester;
use tracing::debug;

use crate::cmd::{parse_timeout, RequestArgs};
use crate::exit::{channel_error, io_error, CliResult, SUCCESS};
use crate::output::{print_message, trim_fill, MessageOutput, OutputFormat};

pub fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_timeout(&args.timeout)?;
    let payload = resolve_payload(&args)?;

    let mut requester = Requester::connect(&args.name, args.layout.config())
        .map_err(|err| channel_error("connect failed", err))?;

    let started = Instant::now();
    requester
        .send_request(&payload, timeout)
        .map_err(|err| channel_error("request failed", err))?;
    let elapsed = started.elapsed();
    debug!(channel = %args.name, ?elapsed, "reply received");

    let mut segment = vec![0u8; requester.channel().size()];
    requester
        .read(&mut segment)
        .map_err(|err| channel_error("read failed", err))?;
    let reply = trim_fill(&segment);
    print_message(
        &MessageOutput::new(&args.name, "reply", reply).with_elapsed(elapsed),
        reply,
        format,
    );

    requester.close();
    Ok(SUCCESS)
}

fn resolve_payload(args: &RequestArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
