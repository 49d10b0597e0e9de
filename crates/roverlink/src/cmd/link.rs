use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use roverlink_link::{CommunicationManager, LinkTransition, Message};
use tracing::{info, warn};

use crate::cmd::listen::install_ctrlc_handler;
use crate::cmd::{parse_duration, LinkRunArgs};
use crate::exit::{link_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_message, print_stats, print_transition, OutputFormat};

const POLL: Duration = Duration::from_millis(100);

enum Event {
    State(LinkTransition),
    Received(Message),
}

pub fn run(args: LinkRunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.resolve()?;
    let deadline = args
        .duration
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|duration| Instant::now() + duration);

    let manager =
        CommunicationManager::open(config).map_err(|err| link_error("open failed", err))?;

    let (tx, rx) = mpsc::channel();
    let state_tx = tx.clone();
    manager.on_link_state(move |transition| {
        let _ = state_tx.send(Event::State(*transition));
    });
    if args.messages {
        manager.on_any_message(move |message| {
            let _ = tx.send(Event::Received(message.clone()));
        });
    }
    manager
        .start()
        .map_err(|err| link_error("start failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;
    info!(transport = manager.transport_name(), "link running");

    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        if !manager.is_receiving() && manager.last_error().is_some() {
            break;
        }
        match rx.recv_timeout(POLL) {
            Ok(Event::State(transition)) => print_transition(&transition, format),
            Ok(Event::Received(message)) => print_message(&message, format),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Err(err) = manager.send_quit("operator exit") {
        warn!(error = %err, "quit notice not sent");
    }
    manager.shutdown();
    print_stats(&manager.stats(), format);
    exit_status(manager.last_error())
}

/// A link whose receive loop died on an error exits as a transport failure.
fn exit_status(last_error: Option<String>) -> CliResult<i32> {
    match last_error {
        Some(reason) => {
            warn!(%reason, "link dropped");
            Err(CliError::new(
                TRANSPORT_ERROR,
                format!("link dropped: {reason}"),
            ))
        }
        None => Ok(SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_stop_exits_successfully() {
        assert_eq!(exit_status(None).unwrap(), SUCCESS);
    }

    #[test]
    fn dropped_link_reports_reason() {
        let err = exit_status(Some("transport error: serial device error: unplugged".into()))
            .unwrap_err();
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.contains("unplugged"));
    }
}
