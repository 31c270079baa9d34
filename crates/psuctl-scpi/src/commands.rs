//! GPP-4323 command builders and response parsers.
//!
//! All functions are pure: they produce command strings or consume response
//! text without performing any I/O. The caller sends the commands over a
//! [`Transport`](psuctl_core::Transport) and feeds responses back in.
//!
//! # Measurement response
//!
//! `:MEASure{n}:ALL` is answered with one comma-separated line:
//!
//! ```text
//! STATE,VOLTAGE,CURRENT,POWER,TIMESTAMP
//! ON,10,2,20,2026.10.15 12-00-00-000000
//! ```
//!
//! Setting commands are answered with an empty line.

use psuctl_core::error::{Error, Result};
use psuctl_core::types::{
    ChannelId, OutputState, TelemetryReading, format_timestamp, parse_timestamp,
};

/// Number of comma-separated fields in a measurement response.
const MEASUREMENT_FIELDS: usize = 5;

/// Prefix of an error response line from the instrument.
pub const ERROR_PREFIX: &str = "ERR ";

// ---------------------------------------------------------------
// Command builders
// ---------------------------------------------------------------

/// Build a "set current level" command (`:SOURce{n}:CURRent {amps}`).
pub fn cmd_set_current(channel: ChannelId, amps: f64) -> String {
    format!(":SOURce{channel}:CURRent {}", format_level(amps))
}

/// Build a "set voltage level" command (`:SOURce{n}:VOLTage {volts}`).
pub fn cmd_set_voltage(channel: ChannelId, volts: f64) -> String {
    format!(":SOURce{channel}:VOLTage {}", format_level(volts))
}

/// Build a "set output state" command (`:OUTPut{n}:STATe ON|OFF`).
pub fn cmd_set_output(channel: ChannelId, state: OutputState) -> String {
    format!(":OUTPut{channel}:STATe {state}")
}

/// Build a "measure everything" query (`:MEASure{n}:ALL`).
pub fn cmd_measure_all(channel: ChannelId) -> String {
    format!(":MEASure{channel}:ALL")
}

/// Format a level as plain decimal text that parses back to the same
/// `f64`, always carrying a decimal point (`2` -> `2.0`) as the float
/// extraction rule requires.
pub fn format_level(value: f64) -> String {
    // `Display` for floats never uses exponent notation.
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

// ---------------------------------------------------------------
// Response codec
// ---------------------------------------------------------------

/// Encode a reading as a measurement response line (without terminator).
pub fn encode_measurement(reading: &TelemetryReading) -> String {
    format!(
        "{},{},{},{},{}",
        reading.state,
        reading.voltage,
        reading.current,
        reading.power,
        format_timestamp(&reading.timestamp)
    )
}

/// Parse a measurement response line.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the line has the wrong number of fields
/// or any field fails to parse, and passes through instrument error lines
/// (see [`check_response`]).
pub fn parse_measurement(response: &str) -> Result<TelemetryReading> {
    let line = check_response(response)?;
    let fields: Vec<&str> = line.splitn(MEASUREMENT_FIELDS, ',').collect();
    if fields.len() != MEASUREMENT_FIELDS {
        return Err(Error::Protocol(format!(
            "measurement response has {} fields, expected {MEASUREMENT_FIELDS}: '{line}'",
            fields.len()
        )));
    }

    let state: OutputState = fields[0]
        .parse()
        .map_err(|_| Error::Protocol(format!("bad output state '{}'", fields[0])))?;

    Ok(TelemetryReading {
        state,
        voltage: parse_number(fields[1], "voltage")?,
        current: parse_number(fields[2], "current")?,
        power: parse_number(fields[3], "power")?,
        timestamp: parse_timestamp(fields[4])?,
    })
}

/// Strip the line terminator and turn `ERR <message>` lines into errors.
pub fn check_response(response: &str) -> Result<&str> {
    let line = response.trim_end_matches(['\r', '\n']);
    match line.strip_prefix(ERROR_PREFIX) {
        Some(message) => Err(Error::Protocol(format!("instrument error: {message}"))),
        None => Ok(line),
    }
}

/// Encode an error as an instrument error line (without terminator).
pub fn encode_error(error: &Error) -> String {
    format!("{ERROR_PREFIX}{error}")
}

fn parse_number(field: &str, what: &str) -> Result<f64> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::Protocol(format!("bad {what} value '{field}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ch(n: i64) -> ChannelId {
        ChannelId::new(n).unwrap()
    }

    #[test]
    fn set_current_command() {
        assert_eq!(cmd_set_current(ch(1), 2.0), ":SOURce1:CURRent 2.0");
        assert_eq!(cmd_set_current(ch(2), 0.25), ":SOURce2:CURRent 0.25");
    }

    #[test]
    fn set_voltage_command() {
        assert_eq!(cmd_set_voltage(ch(1), 10.0), ":SOURce1:VOLTage 10.0");
        assert_eq!(cmd_set_voltage(ch(4), 12.5), ":SOURce4:VOLTage 12.5");
    }

    #[test]
    fn set_output_command() {
        assert_eq!(cmd_set_output(ch(1), OutputState::On), ":OUTPut1:STATe ON");
        assert_eq!(cmd_set_output(ch(3), OutputState::Off), ":OUTPut3:STATe OFF");
    }

    #[test]
    fn measure_all_command() {
        assert_eq!(cmd_measure_all(ch(4)), ":MEASure4:ALL");
    }

    #[test]
    fn format_level_always_has_decimal_point() {
        assert_eq!(format_level(2.0), "2.0");
        assert_eq!(format_level(-1.0), "-1.0");
        assert_eq!(format_level(0.0), "0.0");
        assert_eq!(format_level(1e20), "100000000000000000000.0");
        assert_eq!(format_level(1e-7), "0.0000001");
    }

    #[test]
    fn format_level_keeps_small_values_exact() {
        for value in [1.2345678912e-5, 0.000012345678912, 5e-10, 0.1 + 0.2] {
            let text = format_level(value);
            assert!(!text.contains('e'), "{text}");
            assert_eq!(text.parse::<f64>().unwrap(), value);
        }
    }

    #[test]
    fn builders_translate_back() {
        let translator = crate::Translator::default();
        for command in [
            cmd_set_current(ch(1), 2.0),
            cmd_set_voltage(ch(2), 31.5),
            cmd_set_output(ch(3), OutputState::On),
            cmd_measure_all(ch(4)),
        ] {
            assert!(translator.translate(&command).is_ok(), "{command}");
        }
    }

    #[test]
    fn measurement_line() {
        let reading = TelemetryReading {
            voltage: 10.0,
            current: 2.0,
            state: OutputState::On,
            power: 20.0,
            timestamp: NaiveDate::from_ymd_opt(2026, 10, 15)
                .unwrap()
                .and_hms_micro_opt(12, 0, 0, 42)
                .unwrap(),
        };
        let line = encode_measurement(&reading);
        assert_eq!(line, "ON,10,2,20,2026.10.15 12-00-00-000042");
        assert_eq!(parse_measurement(&format!("{line}\n")).unwrap(), reading);
    }

    #[test]
    fn measurement_rejects_malformed() {
        assert!(matches!(
            parse_measurement("ON,10,2"),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            parse_measurement("MAYBE,10,2,20,2026.10.15 12-00-00-000000"),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            parse_measurement("ON,ten,2,20,2026.10.15 12-00-00-000000"),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(parse_measurement(""), Err(Error::Protocol(_))));
    }

    #[test]
    fn error_lines() {
        let line = encode_error(&Error::InvalidChannel(9));
        assert!(line.starts_with("ERR invalid channel 9"));
        match check_response(&line) {
            Err(Error::Protocol(msg)) => assert!(msg.contains("invalid channel 9")),
            other => panic!("expected Protocol error, got {other:?}"),
        }
        assert_eq!(check_response("\r\n").unwrap(), "");
    }
}
