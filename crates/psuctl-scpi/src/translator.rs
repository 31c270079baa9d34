//! SCPI command translator.
//!
//! [`Translator`] walks its [`CommandTree`] against a colon-delimited
//! command, collecting every extracted parameter, and returns a
//! [`ParsedCommand`] naming the operation of the last matched node.

use std::collections::BTreeMap;

use psuctl_core::error::{Error, Result};
use psuctl_core::types::OutputState;
use tracing::{info, trace};

use crate::tree::{CommandTree, Operation, Parameter};

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Whole number (channel index, SCPI boolean digit).
    Integer(i64),
    /// Decimal number (levels).
    Float(f64),
    /// Anything else, kept verbatim (`ON`, `OFF`).
    Token(String),
}

impl ParamValue {
    /// Classify raw parameter text: anything containing `.` is a float,
    /// otherwise an integer if it parses, otherwise a token.
    pub fn from_raw(raw: &str) -> Self {
        if raw.contains('.') {
            if let Ok(value) = raw.parse::<f64>() {
                return ParamValue::Float(value);
            }
        } else if let Ok(value) = raw.parse::<i64>() {
            return ParamValue::Integer(value);
        }
        ParamValue::Token(raw.to_string())
    }
}

/// Result of translating one command: an operation plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    operation: Operation,
    params: BTreeMap<Parameter, ParamValue>,
}

impl ParsedCommand {
    /// The operation to execute.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// All extracted parameters.
    pub fn params(&self) -> &BTreeMap<Parameter, ParamValue> {
        &self.params
    }

    /// A single parameter, if present.
    pub fn get(&self, parameter: Parameter) -> Option<&ParamValue> {
        self.params.get(&parameter)
    }

    /// Read `parameter` as an integer.
    pub fn integer(&self, parameter: Parameter) -> Result<i64> {
        match self.require(parameter)? {
            ParamValue::Integer(value) => Ok(*value),
            other => Err(Error::InvalidParameter(format!(
                "{parameter} must be an integer, got {other:?}"
            ))),
        }
    }

    /// Read `parameter` as a float; integers are widened.
    pub fn float(&self, parameter: Parameter) -> Result<f64> {
        match self.require(parameter)? {
            ParamValue::Float(value) => Ok(*value),
            ParamValue::Integer(value) => Ok(*value as f64),
            other => Err(Error::InvalidParameter(format!(
                "{parameter} must be a number, got {other:?}"
            ))),
        }
    }

    /// Read `parameter` as an output state (`ON`/`OFF` or `1`/`0`).
    pub fn state(&self, parameter: Parameter) -> Result<OutputState> {
        match self.require(parameter)? {
            ParamValue::Token(token) => token.parse(),
            ParamValue::Integer(value) => value.to_string().parse(),
            other => Err(Error::InvalidParameter(format!(
                "{parameter} must be ON or OFF, got {other:?}"
            ))),
        }
    }

    fn require(&self, parameter: Parameter) -> Result<&ParamValue> {
        self.params
            .get(&parameter)
            .ok_or(Error::MissingParameter(parameter.name()))
    }
}

/// Translator options.
#[derive(Debug, Clone, Default)]
pub struct TranslatorConfig {
    /// Log each translation at `info` instead of `trace`.
    pub log_translations: bool,
    /// Log the rendered command tree at `info` on construction.
    pub show_tree: bool,
}

impl TranslatorConfig {
    /// Enable or disable per-command translation logging.
    pub fn log_translations(mut self, enabled: bool) -> Self {
        self.log_translations = enabled;
        self
    }

    /// Enable or disable logging the command tree at startup.
    pub fn show_tree(mut self, enabled: bool) -> Self {
        self.show_tree = enabled;
        self
    }
}

/// Translates SCPI command text into [`ParsedCommand`]s.
///
/// The translator owns its command tree for its whole lifetime; the tree is
/// never modified after construction, so a translator can be shared freely.
#[derive(Debug, Clone)]
pub struct Translator {
    tree: CommandTree,
    config: TranslatorConfig,
}

impl Translator {
    /// Create a translator for the GPP-4323 grammar.
    pub fn new(config: TranslatorConfig) -> Self {
        Self::with_tree(CommandTree::gpp4323(), config)
    }

    /// Create a translator over a custom tree.
    pub fn with_tree(tree: CommandTree, config: TranslatorConfig) -> Self {
        if config.show_tree {
            info!("SCPI command tree:\n{tree}");
        }
        Translator { tree, config }
    }

    /// The tree this translator walks.
    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    /// Translate one command.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownSegment`] if a segment matches no child node
    /// - [`Error::ParameterExtraction`] if a node's rule cannot read its segment
    /// - [`Error::IncompleteCommand`] if the command is empty or stops at a
    ///   routing node
    pub fn translate(&self, command: &str) -> Result<ParsedCommand> {
        let text = command.trim();
        let mut node = self.tree.root();
        let mut params = BTreeMap::new();

        for segment in text.split(':') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            node = node
                .child_for(segment)
                .ok_or_else(|| Error::UnknownSegment {
                    segment: segment.to_string(),
                    command: text.to_string(),
                })?;

            if let Some((parameter, raw)) = node.extract_from(segment)? {
                params.insert(parameter, ParamValue::from_raw(raw));
            }
        }

        let operation = node
            .resolved_operation()
            .ok_or_else(|| Error::IncompleteCommand(text.to_string()))?;
        let parsed = ParsedCommand { operation, params };

        if self.config.log_translations {
            info!(command = %text, operation = %operation, params = ?parsed.params, "SCPI translated");
        } else {
            trace!(command = %text, operation = %operation, params = ?parsed.params, "SCPI translated");
        }

        Ok(parsed)
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(TranslatorConfig::default())
    }
}
