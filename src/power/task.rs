//! Power Sequencer Task
//!
//! Samples the triggers every poll period, feeds the [`TriggerSequencer`]
//! and carries out its decisions on the relay and the command queue.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Timer};
use embedded_hal::digital::{InputPin, StatefulOutputPin};

use crate::config::SequencerConfig;
use crate::hal::gpio::{PowerRelay, TriggerInputs};
use crate::hal::timer::Timeout;
use crate::link::AmpLink;
use crate::power::sequencer::{SequencerAction, TriggerSequencer};
use crate::types::{ControlCommand, Preset};

/// Trigger power sequencer bound to its pins and the amplifier link
pub struct PowerSequencer<'a, M, T1, T2, T3, R>
where
    M: RawMutex,
    T1: InputPin,
    T2: InputPin,
    T3: InputPin,
    R: StatefulOutputPin,
{
    triggers: TriggerInputs<T1, T2, T3>,
    relay: PowerRelay<R>,
    link: &'a AmpLink<M>,
    core: TriggerSequencer,
}

impl<'a, M, T1, T2, T3, R> PowerSequencer<'a, M, T1, T2, T3, R>
where
    M: RawMutex,
    T1: InputPin,
    T2: InputPin,
    T3: InputPin,
    R: StatefulOutputPin,
{
    /// Create the sequencer with the amplifier considered off
    pub fn new(
        triggers: TriggerInputs<T1, T2, T3>,
        relay: PowerRelay<R>,
        link: &'a AmpLink<M>,
        config: SequencerConfig,
    ) -> Self {
        Self {
            triggers,
            relay,
            link,
            core: TriggerSequencer::new(config),
        }
    }

    /// Get the decision core
    #[must_use]
    pub const fn core(&self) -> &TriggerSequencer {
        &self.core
    }

    /// Sample the triggers once and apply the resulting action
    pub async fn step(&mut self, now: Instant) -> SequencerAction {
        let observed = self.triggers.read();
        let powered = self.relay.is_powered();
        let action = self.core.update(observed, powered, now);

        match action {
            SequencerAction::PowerOff => self.relay.off(),
            SequencerAction::PowerOnAndSelect(preset) => {
                self.relay.on();
                self.wait_for_device().await;
                self.select(preset).await;
            }
            SequencerAction::Select(preset) => self.select(preset).await,
            SequencerAction::CooldownActive => debug!("power on blocked by cooldown"),
            SequencerAction::Resynced | SequencerAction::PowerOffPending | SequencerAction::Idle => {}
        }

        if self.link.is_device_connected() {
            if let Some(preset) = self.core.on_connection(self.link.connection_epoch()) {
                info!("amplifier reconnected, re-asserting {:?}", preset);
                self.select(preset).await;
            }
        }

        action
    }

    /// Wait for the amplifier to enumerate after power-on
    ///
    /// Returns `false` on timeout; power stays applied either way.
    pub async fn wait_for_device(&mut self) -> bool {
        let config = *self.core.config();
        let timeout = Timeout::new(config.connect_timeout);
        loop {
            if self.link.is_device_connected() {
                info!("amplifier connected");
                self.core.acknowledge_connection(self.link.connection_epoch());
                return true;
            }
            if timeout.expired() {
                error!("amplifier not connected after {} ms", config.connect_timeout.as_millis());
                return false;
            }
            Timer::after(config.connect_poll).await;
        }
    }

    async fn select(&mut self, preset: Preset) {
        if let Err(e) = self.link.enqueue_command(ControlCommand::set_preset(preset)).await {
            error!("preset {:?} not queued: {:?}", preset, e);
            return;
        }
        if !self.link.is_device_connected() {
            // The queued command reaches the amplifier on its next connection
            self.core.expect_connection(self.link.connection_epoch());
        }
    }

    /// Sample the triggers forever, one poll period after the previous step
    pub async fn run(&mut self) -> ! {
        let period = self.core.config().poll_period;
        loop {
            self.step(Instant::now()).await;
            Timer::after(period).await;
        }
    }
}
