//! The simulated power supply.
//!
//! [`DeviceModel`] owns the state of all four channels and executes
//! translated SCPI commands against it. Every command goes through the same
//! explicit pipeline:
//!
//! 1. **resolve** -- map the [`ParsedCommand`] to a typed [`DeviceAction`],
//!    validating the channel number and parameter types
//! 2. **clamp** -- cap levels above the channel's limits at the limit
//! 3. **log** -- record the action (at `info` when dispatch logging is on)
//! 4. **execute** -- apply the action under that channel's lock
//!
//! Each channel sits behind its own [`tokio::sync::Mutex`], so the telemetry
//! poller and concurrent request handlers see every write either completely
//! or not at all, and work on different channels never contends.

use chrono::Local;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use psuctl_core::error::{Error, Result};
use psuctl_core::types::{
    CHANNEL_COUNT, ChannelId, ChannelLimits, ChannelState, OutputState, TelemetryReading,
};
use psuctl_scpi::commands::encode_measurement;
use psuctl_scpi::{Operation, Parameter, ParsedCommand, Translator, TranslatorConfig};

use crate::models::SupplyModel;

/// A validated, typed device operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceAction {
    /// Set the current level of a channel.
    SetCurrent { channel: ChannelId, amps: f64 },
    /// Set the voltage level of a channel.
    SetVoltage { channel: ChannelId, volts: f64 },
    /// Switch a channel's output.
    SetChannelState {
        channel: ChannelId,
        state: OutputState,
    },
    /// Measure a channel.
    GetAllMeasurements { channel: ChannelId },
}

impl DeviceAction {
    /// Resolve a translated command, validating its channel and parameters.
    pub fn resolve(command: &ParsedCommand) -> Result<Self> {
        let channel = ChannelId::new(command.integer(Parameter::Channel)?)?;
        let action = match command.operation() {
            Operation::SetCurrent => DeviceAction::SetCurrent {
                channel,
                amps: command.float(Parameter::Current)?,
            },
            Operation::SetVoltage => DeviceAction::SetVoltage {
                channel,
                volts: command.float(Parameter::Voltage)?,
            },
            Operation::SetChannelState => DeviceAction::SetChannelState {
                channel,
                state: command.state(Parameter::State)?,
            },
            Operation::GetAllMeasurements => DeviceAction::GetAllMeasurements { channel },
        };
        Ok(action)
    }

    /// The channel this action addresses.
    pub fn channel(&self) -> ChannelId {
        match *self {
            DeviceAction::SetCurrent { channel, .. }
            | DeviceAction::SetVoltage { channel, .. }
            | DeviceAction::SetChannelState { channel, .. }
            | DeviceAction::GetAllMeasurements { channel } => channel,
        }
    }

    /// Cap levels above `limits` at the limit. Values below zero pass through.
    pub fn clamped(self, limits: ChannelLimits) -> Self {
        match self {
            DeviceAction::SetCurrent { channel, amps } if amps > limits.max_current => {
                DeviceAction::SetCurrent {
                    channel,
                    amps: limits.max_current,
                }
            }
            DeviceAction::SetVoltage { channel, volts } if volts > limits.max_voltage => {
                DeviceAction::SetVoltage {
                    channel,
                    volts: limits.max_voltage,
                }
            }
            other => other,
        }
    }
}

/// What a device operation returns.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceResponse {
    /// A setting was applied.
    Done,
    /// A measurement was taken.
    Measurement(TelemetryReading),
}

impl DeviceResponse {
    /// Encode as the instrument's response line (without terminator).
    pub fn to_wire(&self) -> String {
        match self {
            DeviceResponse::Done => String::new(),
            DeviceResponse::Measurement(reading) => encode_measurement(reading),
        }
    }
}

/// Device model options.
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// Options for the device's SCPI translator.
    pub translator: TranslatorConfig,
    /// Log each executed action at `info` instead of `trace`.
    pub log_dispatch: bool,
}

impl DeviceConfig {
    /// Set the translator options.
    pub fn translator(mut self, config: TranslatorConfig) -> Self {
        self.translator = config;
        self
    }

    /// Enable or disable per-action dispatch logging.
    pub fn log_dispatch(mut self, enabled: bool) -> Self {
        self.log_dispatch = enabled;
        self
    }
}

/// Simulated four-channel power supply.
#[derive(Debug)]
pub struct DeviceModel {
    model: SupplyModel,
    translator: Translator,
    channels: [Mutex<ChannelState>; CHANNEL_COUNT as usize],
    log_dispatch: bool,
}

impl DeviceModel {
    /// Create a device in its power-on state (0 V, 0 A, all outputs off).
    pub fn new(model: SupplyModel, config: DeviceConfig) -> Self {
        DeviceModel {
            model,
            translator: Translator::new(config.translator),
            channels: ChannelId::ALL.map(|channel| Mutex::new(ChannelState::new(channel))),
            log_dispatch: config.log_dispatch,
        }
    }

    /// The model definition (name and limits).
    pub fn model(&self) -> &SupplyModel {
        &self.model
    }

    /// Translate and execute one SCPI command.
    ///
    /// Translation errors abort before any state is touched.
    pub async fn execute_command(&self, command: &str) -> Result<DeviceResponse> {
        let parsed = self.translator.translate(command).inspect_err(|e| {
            debug!(command = %command.trim(), error = %e, "SCPI translation failed");
        })?;
        self.dispatch(&parsed).await
    }

    /// Execute an already translated command.
    pub async fn dispatch(&self, command: &ParsedCommand) -> Result<DeviceResponse> {
        let action = DeviceAction::resolve(command)?;
        self.run(action).await
    }

    /// Set the current level of `channel` (clamped to its limit).
    pub async fn set_current(&self, channel: i64, amps: f64) -> Result<()> {
        let channel = ChannelId::new(channel)?;
        self.run(DeviceAction::SetCurrent { channel, amps }).await?;
        Ok(())
    }

    /// Set the voltage level of `channel` (clamped to its limit).
    pub async fn set_voltage(&self, channel: i64, volts: f64) -> Result<()> {
        let channel = ChannelId::new(channel)?;
        self.run(DeviceAction::SetVoltage { channel, volts }).await?;
        Ok(())
    }

    /// Switch the output of `channel`.
    pub async fn set_channel_state(&self, channel: i64, state: OutputState) -> Result<()> {
        let channel = ChannelId::new(channel)?;
        self.run(DeviceAction::SetChannelState { channel, state })
            .await?;
        Ok(())
    }

    /// Measure `channel` now.
    pub async fn get_all_measurements(&self, channel: i64) -> Result<TelemetryReading> {
        let channel = ChannelId::new(channel)?;
        match self.run(DeviceAction::GetAllMeasurements { channel }).await? {
            DeviceResponse::Measurement(reading) => Ok(reading),
            DeviceResponse::Done => Err(Error::Protocol(
                "measurement produced no reading".to_string(),
            )),
        }
    }

    /// Copy of every channel's stored state, in channel order.
    pub async fn snapshot(&self) -> Vec<ChannelState> {
        let mut states = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            states.push(*channel.lock().await);
        }
        states
    }

    /// Clamp, log, and execute a resolved action.
    async fn run(&self, action: DeviceAction) -> Result<DeviceResponse> {
        let limits = self.model.limits_for(action.channel());
        let clamped = action.clamped(limits);
        if clamped != action {
            debug!(requested = ?action, applied = ?clamped, "level above channel limit, clamped");
        }

        if self.log_dispatch {
            info!(action = ?clamped, "executing device action");
        } else {
            trace!(action = ?clamped, "executing device action");
        }

        Ok(self.execute(clamped).await)
    }

    async fn execute(&self, action: DeviceAction) -> DeviceResponse {
        let mut state = self.channels[action.channel().index()].lock().await;
        match action {
            DeviceAction::SetCurrent { amps, .. } => {
                state.current = amps;
                DeviceResponse::Done
            }
            DeviceAction::SetVoltage { volts, .. } => {
                state.voltage = volts;
                DeviceResponse::Done
            }
            DeviceAction::SetChannelState { state: output, .. } => {
                state.output = output;
                DeviceResponse::Done
            }
            DeviceAction::GetAllMeasurements { .. } => {
                DeviceResponse::Measurement(state.reading(Local::now().naive_local()))
            }
        }
    }
}

impl Default for DeviceModel {
    fn default() -> Self {
        Self::new(SupplyModel::default(), DeviceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn reading(device: &DeviceModel, channel: i64) -> TelemetryReading {
        device.get_all_measurements(channel).await.unwrap()
    }

    #[tokio::test]
    async fn power_on_state() {
        let device = DeviceModel::default();
        for channel in 1..=4 {
            let r = reading(&device, channel).await;
            assert_eq!(r.voltage, 0.0);
            assert_eq!(r.current, 0.0);
            assert_eq!(r.state, OutputState::Off);
            assert_eq!(r.power, 0.0);
        }
    }

    #[tokio::test]
    async fn commands_update_state() {
        let device = DeviceModel::default();
        device.execute_command(":SOURce1:CURRent 2.0").await.unwrap();
        device.execute_command(":SOURce1:VOLTage 10.0").await.unwrap();
        device.execute_command(":OUTPut1:STATe ON").await.unwrap();

        let r = reading(&device, 1).await;
        assert_eq!((r.voltage, r.current, r.state, r.power), (10.0, 2.0, OutputState::On, 20.0));

        for channel in 2..=4 {
            assert_eq!(reading(&device, channel).await.state, OutputState::Off);
        }
    }

    #[tokio::test]
    async fn output_off_keeps_levels() {
        let device = DeviceModel::default();
        device.set_current(1, 2.0).await.unwrap();
        device.set_voltage(1, 10.0).await.unwrap();
        device.set_channel_state(1, OutputState::On).await.unwrap();
        device.execute_command(":OUTPut1:STATe OFF").await.unwrap();

        let r = reading(&device, 1).await;
        assert_eq!((r.voltage, r.current, r.state, r.power), (10.0, 2.0, OutputState::Off, 0.0));
    }

    #[tokio::test]
    async fn levels_above_limit_are_clamped() {
        let device = DeviceModel::default();
        device.execute_command(":SOURce3:VOLTage 10.0").await.unwrap();
        device.execute_command(":SOURce3:CURRent 2.5").await.unwrap();
        device.execute_command(":SOURce4:VOLTage 20.0").await.unwrap();
        device.execute_command(":SOURce1:CURRent 9.0").await.unwrap();

        assert_eq!(reading(&device, 3).await.voltage, 5.0);
        assert_eq!(reading(&device, 3).await.current, 1.0);
        assert_eq!(reading(&device, 4).await.voltage, 15.0);
        assert_eq!(reading(&device, 1).await.current, 3.0);
    }

    #[tokio::test]
    async fn level_at_limit_is_kept() {
        let device = DeviceModel::default();
        device.set_voltage(2, 32.0).await.unwrap();
        assert_eq!(reading(&device, 2).await.voltage, 32.0);
    }

    #[tokio::test]
    async fn negative_levels_are_stored_as_is() {
        let device = DeviceModel::default();
        device.execute_command(":SOURce2:VOLTage -1.5").await.unwrap();
        device.set_current(2, -0.5).await.unwrap();

        let r = reading(&device, 2).await;
        assert_eq!(r.voltage, -1.5);
        assert_eq!(r.current, -0.5);
    }

    #[tokio::test]
    async fn invalid_channel_is_rejected() {
        let device = DeviceModel::default();
        assert!(matches!(
            device.execute_command(":SOURce5:CURRent 1.0").await,
            Err(Error::InvalidChannel(5))
        ));
        assert!(matches!(
            device.execute_command(":MEASure0:ALL").await,
            Err(Error::InvalidChannel(0))
        ));
        assert!(matches!(
            device.set_channel_state(7, OutputState::On).await,
            Err(Error::InvalidChannel(7))
        ));
    }

    #[tokio::test]
    async fn unknown_segment_leaves_state_unchanged() {
        let device = DeviceModel::default();
        device.set_voltage(1, 12.0).await.unwrap();
        let before = device.snapshot().await;

        assert!(matches!(
            device.execute_command(":SOURce1:POWer 3.0").await,
            Err(Error::UnknownSegment { .. })
        ));
        assert!(matches!(
            device.execute_command(":SYSTem:BEEPer ON").await,
            Err(Error::UnknownSegment { .. })
        ));

        assert_eq!(device.snapshot().await, before);
    }

    #[tokio::test]
    async fn numeric_state_tokens() {
        let device = DeviceModel::default();
        device.execute_command(":OUTPut4:STATe 1").await.unwrap();
        assert_eq!(reading(&device, 4).await.state, OutputState::On);
        device.execute_command(":OUTPut4:STATe 0").await.unwrap();
        assert_eq!(reading(&device, 4).await.state, OutputState::Off);
        assert!(matches!(
            device.execute_command(":OUTPut4:STATe 2").await,
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn measurement_response_is_encoded() {
        let device = DeviceModel::default();
        let response = device.execute_command(":MEASure1:ALL").await.unwrap();
        assert!(response.to_wire().starts_with("OFF,0,0,0,"));
        assert_eq!(
            device.execute_command(":OUTPut1:STATe ON").await.unwrap(),
            DeviceResponse::Done
        );
        assert_eq!(DeviceResponse::Done.to_wire(), "");
    }

    #[test]
    fn clamp_only_touches_levels() {
        let limits = ChannelLimits::new(5.0, 1.0);
        let channel = ChannelId::new(3).unwrap();
        assert_eq!(
            DeviceAction::SetVoltage { channel, volts: 6.0 }.clamped(limits),
            DeviceAction::SetVoltage { channel, volts: 5.0 }
        );
        let state = DeviceAction::SetChannelState {
            channel,
            state: OutputState::On,
        };
        assert_eq!(state.clamped(limits), state);
    }

    #[tokio::test]
    async fn concurrent_writers_and_readers() {
        let device = Arc::new(DeviceModel::default());
        let mut tasks = Vec::new();
        for n in 0..50 {
            let device = Arc::clone(&device);
            tasks.push(tokio::spawn(async move {
                let channel = (n % 4) + 1;
                device.set_voltage(channel, 1.0).await.unwrap();
                device.set_current(channel, 0.5).await.unwrap();
                device.set_channel_state(channel, OutputState::On).await.unwrap();
                device.get_all_measurements(channel).await.unwrap()
            }));
        }
        for task in tasks {
            let r = task.await.unwrap();
            assert_eq!(r.state, OutputState::On);
            assert_eq!(r.power, 0.5);
        }
    }
}
