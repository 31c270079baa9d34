//! SCPI command handling for the GPP-4323 family of four-channel supplies.
//!
//! This crate implements the small, fixed SCPI-style grammar psuctl speaks.
//! It provides:
//!
//! - **Command tree** ([`tree`]) -- an immutable trie of command headers,
//!   each optionally carrying a parameter-extraction rule and, at the
//!   leaves, an [`Operation`].
//! - **Translator** ([`translator`]) -- walks the tree against a
//!   colon-delimited command and yields a [`ParsedCommand`].
//! - **Command builders** ([`commands`]) -- construct the command strings the
//!   driver sends and parse the measurement response.
//!
//! # Grammar
//!
//! | Command                      | Operation                         |
//! |------------------------------|-----------------------------------|
//! | `:SOURce{n}:CURRent {f}`     | [`Operation::SetCurrent`]         |
//! | `:SOURce{n}:VOLTage {f}`     | [`Operation::SetVoltage`]         |
//! | `:OUTPut{n}:STATe {ON\|OFF}` | [`Operation::SetChannelState`]    |
//! | `:MEASure{n}:ALL`            | [`Operation::GetAllMeasurements`] |
//!
//! # Example
//!
//! ```
//! use psuctl_scpi::{Operation, Parameter, ParamValue, Translator, TranslatorConfig};
//!
//! let translator = Translator::new(TranslatorConfig::default());
//! let parsed = translator.translate(":SOURce1:CURRent 2.0").unwrap();
//! assert_eq!(parsed.operation(), Operation::SetCurrent);
//! assert_eq!(parsed.get(Parameter::Channel), Some(&ParamValue::Integer(1)));
//! assert_eq!(parsed.get(Parameter::Current), Some(&ParamValue::Float(2.0)));
//! ```

pub mod commands;
pub mod translator;
pub mod tree;

pub use translator::{ParamValue, ParsedCommand, Translator, TranslatorConfig};
pub use tree::{CommandNode, CommandTree, ExtractionRule, Operation, Parameter};
