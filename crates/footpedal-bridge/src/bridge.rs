//! Session wiring: open the pedal, build the keyboard, run the loop

use crate::config::BridgeConfig;
use crate::device::PedalDevice;
use crate::emitter::VirtualKeyboard;
use crate::poll_loop::{PollLoop, RunSummary};
use crate::ports::{ClaimableSource, KeySink};
use crate::{BridgeResult, ShutdownSignal};
use footpedal_protocol::KeyBindingMap;
use tracing::{info, warn};

/// Runs one bridge session on the real pedal and a uinput keyboard.
pub fn run(config: &BridgeConfig, shutdown: &ShutdownSignal) -> BridgeResult<RunSummary> {
    run_with(config, shutdown, PedalDevice::open, VirtualKeyboard::create)
}

/// Runs one session until `shutdown` is raised or a fatal error.
///
/// `open` gets the configured vendor and product ids; `create_sink` gets the
/// keyboard name and the resolved bindings. Startup is not retried. If it
/// fails after the source was opened, the source is released once before
/// the startup error is returned.
pub fn run_with<S, K, O, C>(
    config: &BridgeConfig,
    shutdown: &ShutdownSignal,
    open: O,
    create_sink: C,
) -> BridgeResult<RunSummary>
where
    S: ClaimableSource,
    K: KeySink,
    O: FnOnce(u16, u16) -> BridgeResult<S>,
    C: FnOnce(&str, &KeyBindingMap) -> BridgeResult<K>,
{
    config.validate()?;
    let bindings = config.key_bindings()?;

    let mut source = open(config.vendor_id, config.product_id)?;
    let sink = match source
        .claim()
        .and_then(|()| create_sink(&config.device_name, &bindings))
    {
        Ok(sink) => sink,
        Err(e) => {
            if let Err(release_err) = source.release() {
                warn!(error = %release_err, "Release after failed startup also failed");
            }
            return Err(e);
        }
    };

    info!(
        name = %config.device_name,
        pedals = bindings.len(),
        timeout_ms = config.read_timeout_ms,
        "Foot pedal bridge running"
    );

    let mut poll_loop = PollLoop::new(
        source,
        sink,
        bindings,
        config.read_timeout(),
        shutdown.clone(),
    )
    .with_error_backoff(config.error_backoff());
    poll_loop.run()
}
