use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ipcslot_channel::{Listener, ShutdownHandle};
use tracing::{info, warn};

use crate::cmd::{ServeArgs, ServeMode};
use crate::exit::{channel_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_message, trim_fill, MessageOutput, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    if args.count == Some(0) {
        return Err(CliError::new(USAGE, "--count must be greater than zero"));
    }

    let mut listener = Listener::create(&args.name, args.layout.config())
        .map_err(|err| channel_error("create failed", err))?;
    let shutdown = listener
        .shutdown_handle()
        .map_err(|err| channel_error("shutdown handle failed", err))?;
    install_ctrlc_handler(shutdown.clone())?;

    let served = Arc::new(AtomicU64::new(0));
    listener.register(answer(
        args.name.clone(),
        args.mode,
        args.count,
        Arc::clone(&served),
        shutdown.clone(),
        format,
    ));

    info!(channel = %args.name, size = args.layout.size, mode = ?args.mode, "serving");
    listener
        .listen_until(shutdown.stop_flag())
        .map_err(|err| channel_error("listen failed", err))?;
    info!(channel = %args.name, served = served.load(Ordering::SeqCst), "server stopped");

    Ok(SUCCESS)
}

fn answer(
    channel: String,
    mode: ServeMode,
    count: Option<u64>,
    served: Arc<AtomicU64>,
    shutdown: ShutdownHandle,
    format: OutputFormat,
) -> impl FnMut(&mut ipcslot_channel::Request<'_>) + Send + 'static {
    move |req| {
        let request = trim_fill(req.payload()).to_vec();
        print_message(
            &MessageOutput::new(&channel, "request", &request),
            &request,
            format,
        );

        let result = match mode {
            ServeMode::Echo => req.respond(&request),
            ServeMode::Ack => req.acknowledge(),
            ServeMode::Upper => req.respond(&request.to_ascii_uppercase()),
        };
        if let Err(err) = result {
            warn!(channel = %channel, error = %err, "reply failed");
            return;
        }

        let total = served.fetch_add(1, Ordering::SeqCst) + 1;
        if count.is_some_and(|limit| total >= limit) {
            if let Err(err) = shutdown.trigger() {
                warn!(channel = %channel, error = %err, "stop after --count failed");
            }
        }
    }
}

fn install_ctrlc_handler(shutdown: ShutdownHandle) -> CliResult<()> {
    ctrlc::set_handler(move || {
        if let Err(err) = shutdown.trigger() {
            warn!(error = %err, "failed to wake listener");
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
