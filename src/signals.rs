use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tokio::sync::watch;

/// What should we do when the user stops this program?
///
/// The first SIGINT/SIGTERM flips `shutdown` so the API and the scheduler
/// can wind down. A second one exits right away.
pub fn handle_shutdown(shutdown: watch::Sender<bool>) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    std::thread::spawn(move || {
        for (received, signal) in signals.forever().enumerate() {
            if received > 0 {
                log::warn!("Received signal {signal} again, exiting now");
                std::process::exit(1);
            }
            log::info!("Received signal {signal}, shutting down");
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
            let _ = shutdown.send(true);
        }
    });

    Ok(())
}
