mod config;
mod logging;
mod rumqttc_wrapper;

use std::ffi::c_int;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::bail;
use config::Config;
use log::{error, info};
use mpp2mqtt::home_assistant::HomeAssistant;
use mpp2mqtt::inverter::Inverter;
use mpp2mqtt::metric_collector::MetricCollector;
use mpp2mqtt::poller::Poller;
use mpp2mqtt::simple_mqtt::SimpleMqtt;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use rumqttc_wrapper::RumqttcWrapper;

/// Time granted to the MQTT event loop to deliver the last messages.
const FLUSH_DELAY: Duration = Duration::from_secs(1);

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_: c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() -> anyhow::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(request_shutdown),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores into an atomic
        unsafe { sigaction(signal, &action) }?;
    }
    Ok(())
}

fn main() -> anyhow::Result<ExitCode> {
    let config = Config::load()?;
    logging::init_logger(config.debug);
    info!("Running revision: {}", env!("GIT_HASH"));
    if std::env::args().len() > 1 {
        error!("Arguments passed. Tool is configured by config.toml and environment variables");
    }
    if !config.is_valid() {
        bail!("no MQTT broker configured, set MQTT_HOST or add [home_assistant] to config.toml");
    }

    info!("MPP Solar Monitor starting...");
    info!("Device: {}", config.device.display());
    info!("Topic: {}", config.mqtt_topic);
    info!("Interval: {}s", config.poller.interval_secs);

    install_signal_handlers()?;

    let mut output_channels: Vec<Box<dyn MetricCollector>> = Vec::new();
    if let Some(mqtt) = &config.home_assistant {
        info!("Publishing to Home Assistant at {}", mqtt.host);
        output_channels.push(Box::new(HomeAssistant::<RumqttcWrapper>::new(
            mqtt,
            &config.mqtt_topic,
        )));
    }
    if let Some(mqtt) = &config.simple_mqtt {
        info!("Publishing to simple MQTT broker at {}", mqtt.host);
        output_channels.push(Box::new(SimpleMqtt::<RumqttcWrapper>::new(
            mqtt,
            &config.mqtt_topic,
        )));
    }

    let inverter = Inverter::new(&config.device, config.transaction.clone());
    let mut poller = Poller::new(inverter, config.poller.clone());

    let result = poller.run(&mut output_channels, &SHUTDOWN);
    thread::sleep(FLUSH_DELAY);
    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!("{e}, exiting");
            Ok(ExitCode::FAILURE)
        }
    }
}
