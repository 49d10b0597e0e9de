use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use roverlink_link::CommunicationManager;

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{link_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

const POLL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = args.link.resolve()?;
    config.heartbeat.enabled = false;
    let deadline = args
        .timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|timeout| Instant::now() + timeout);

    let manager =
        CommunicationManager::open(config).map_err(|err| link_error("open failed", err))?;

    let (tx, rx) = mpsc::channel();
    manager.on_any_message(move |message| {
        let _ = tx.send(message.clone());
    });
    manager
        .start()
        .map_err(|err| link_error("start failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            manager.shutdown();
            return Err(CliError::new(
                TIMEOUT,
                format!("timed out after {printed} message(s)"),
            ));
        }

        let message = match rx.recv_timeout(POLL) {
            Ok(message) => message,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };
        print_message(&message, format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    manager.shutdown();
    Ok(SUCCESS)
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
