//! High-level power supply interface.
//!
//! [`PowerSupply`] turns the three things a caller wants to do (read
//! telemetry, switch a channel on at given levels, switch it off) into SCPI
//! command sequences sent over a [`Transport`]. Each call may carry the
//! [`CorrelationId`] of the request it serves; it is passed unchanged to
//! every transport call.

use std::sync::Arc;

use tracing::debug;

use psuctl_core::correlation::CorrelationId;
use psuctl_core::error::Result;
use psuctl_core::transport::Transport;
use psuctl_core::types::{ChannelId, OutputState, Telemetry, TelemetryReading};
use psuctl_scpi::commands::{
    cmd_measure_all, cmd_set_current, cmd_set_output, cmd_set_voltage, parse_measurement,
};

/// A four-channel supply reached through a [`Transport`].
#[derive(Clone)]
pub struct PowerSupply {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for PowerSupply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerSupply")
            .field("connected", &self.transport.is_connected())
            .finish()
    }
}

impl PowerSupply {
    /// Drive the supply behind `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        PowerSupply { transport }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Measure one channel.
    pub async fn measure(
        &self,
        channel: ChannelId,
        correlation: Option<&CorrelationId>,
    ) -> Result<TelemetryReading> {
        let response = self
            .transport
            .send_text(&cmd_measure_all(channel), correlation)
            .await?;
        parse_measurement(&response)
    }

    /// Measure all four channels, in channel order.
    pub async fn telemetry(&self, correlation: Option<&CorrelationId>) -> Result<Telemetry> {
        let mut telemetry = Telemetry::new();
        for channel in ChannelId::ALL {
            telemetry.insert(channel, self.measure(channel, correlation).await?);
        }
        Ok(telemetry)
    }

    /// Set current and voltage of `channel`, then switch its output on.
    ///
    /// The three commands are sent in that order, each after the previous
    /// one completed. The first failure aborts the sequence.
    pub async fn turn_on_channel(
        &self,
        channel: ChannelId,
        current: f64,
        voltage: f64,
        correlation: Option<&CorrelationId>,
    ) -> Result<()> {
        debug!(%channel, current, voltage, "turning channel on");
        self.transport
            .send_text(&cmd_set_current(channel, current), correlation)
            .await?;
        self.transport
            .send_text(&cmd_set_voltage(channel, voltage), correlation)
            .await?;
        self.transport
            .send_text(&cmd_set_output(channel, OutputState::On), correlation)
            .await?;
        Ok(())
    }

    /// Switch the output of `channel` off, leaving its levels untouched.
    pub async fn turn_off_channel(
        &self,
        channel: ChannelId,
        correlation: Option<&CorrelationId>,
    ) -> Result<()> {
        debug!(%channel, "turning channel off");
        self.transport
            .send_text(&cmd_set_output(channel, OutputState::Off), correlation)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psuctl_core::error::Error;
    use psuctl_test_harness::MockTransport;

    const LINE: &str = "ON,10,2,20,2026.10.15 12-00-00-000042";

    fn ch(n: i64) -> ChannelId {
        ChannelId::new(n).unwrap()
    }

    fn supply(mock: &Arc<MockTransport>) -> PowerSupply {
        PowerSupply::new(Arc::clone(mock) as Arc<dyn Transport>)
    }

    #[tokio::test]
    async fn turn_on_sends_current_voltage_state() {
        let mock = Arc::new(MockTransport::new());
        mock.expect(":SOURce1:CURRent 2.0", "");
        mock.expect(":SOURce1:VOLTage 10.0", "");
        mock.expect(":OUTPut1:STATe ON", "");

        let id = CorrelationId::new();
        supply(&mock)
            .turn_on_channel(ch(1), 2.0, 10.0, Some(&id))
            .await
            .unwrap();

        assert_eq!(mock.remaining_expectations(), 0);
        assert!(
            mock.sent_with_correlation()
                .iter()
                .all(|(_, c)| *c == Some(id))
        );
    }

    #[tokio::test]
    async fn turn_on_stops_at_first_failure() {
        let mock = Arc::new(MockTransport::new());
        mock.expect(":SOURce2:CURRent 0.5", "");
        mock.expect_failure(":SOURce2:VOLTage 3.3", Error::Timeout);

        let result = supply(&mock).turn_on_channel(ch(2), 0.5, 3.3, None).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(
            mock.sent_commands(),
            vec![":SOURce2:CURRent 0.5", ":SOURce2:VOLTage 3.3"]
        );
    }

    #[tokio::test]
    async fn turn_off_sends_only_state() {
        let mock = Arc::new(MockTransport::new());
        mock.expect(":OUTPut4:STATe OFF", "");
        supply(&mock).turn_off_channel(ch(4), None).await.unwrap();
        assert_eq!(mock.sent_commands(), vec![":OUTPut4:STATe OFF"]);
    }

    #[tokio::test]
    async fn telemetry_measures_every_channel_in_order() {
        let mock = Arc::new(MockTransport::new());
        for n in 1..=4 {
            mock.expect(&format!(":MEASure{n}:ALL"), LINE);
        }

        let telemetry = supply(&mock).telemetry(None).await.unwrap();
        assert_eq!(telemetry.len(), 4);
        assert_eq!(telemetry[&ch(3)].power, 20.0);
        assert!(telemetry[&ch(1)].state.is_on());
        assert_eq!(
            mock.sent_commands(),
            vec![":MEASure1:ALL", ":MEASure2:ALL", ":MEASure3:ALL", ":MEASure4:ALL"]
        );
    }

    #[tokio::test]
    async fn malformed_measurement_is_protocol_error() {
        let mock = Arc::new(MockTransport::new());
        mock.expect(":MEASure1:ALL", "garbage");
        let result = supply(&mock).measure(ch(1), None).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
