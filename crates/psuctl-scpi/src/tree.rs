//! The SCPI command tree.
//!
//! A [`CommandTree`] is a trie of [`CommandNode`]s built once at startup and
//! read-only afterwards. Each colon-delimited segment of a command selects
//! one child of the current node. A node may declare an [`ExtractionRule`]
//! that pulls a parameter out of its segment, and leaf nodes name the
//! [`Operation`] the whole command resolves to. Nodes without an operation
//! are pure routing nodes.
//!
//! # Header matching
//!
//! A segment matches a node when the segment's leading alphabetic run (its
//! header) equals the node's tag, ignoring case, or equals the tag's SCPI
//! short form (its uppercase letters, e.g. `SOUR` for `SOURce`). Anything
//! after the header -- a channel suffix such as `1`, or a space-separated
//! argument -- is left to the extraction rule. Among siblings the first
//! matching node wins.

use std::fmt;

use psuctl_core::error::{Error, Result};

/// Operations a translated command can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `:SOURce{n}:CURRent {f}`
    SetCurrent,
    /// `:SOURce{n}:VOLTage {f}`
    SetVoltage,
    /// `:OUTPut{n}:STATe {ON|OFF}`
    SetChannelState,
    /// `:MEASure{n}:ALL`
    GetAllMeasurements,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::SetCurrent => "set_current",
            Operation::SetVoltage => "set_voltage",
            Operation::SetChannelState => "set_channel_state",
            Operation::GetAllMeasurements => "get_all_measurements",
        };
        write!(f, "{s}")
    }
}

/// Names of the parameters a command can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Parameter {
    /// Channel number, from the suffix of `SOURce{n}` and friends.
    Channel,
    /// Current level in amperes.
    Current,
    /// Voltage level in volts.
    Voltage,
    /// Output state token.
    State,
}

impl Parameter {
    /// Lowercase parameter name, as used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Channel => "channel",
            Parameter::Current => "current",
            Parameter::Voltage => "voltage",
            Parameter::State => "state",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a node pulls its parameter out of a command segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRule {
    /// Digit run immediately after the header (`SOURce1` -> `1`).
    Integer,
    /// Decimal-pointed number after a space (`CURRent 2.0` -> `2.0`).
    Float,
    /// Token after a space: a digit run, `ON`, or `OFF`.
    State,
}

impl ExtractionRule {
    fn name(&self) -> &'static str {
        match self {
            ExtractionRule::Integer => "integer",
            ExtractionRule::Float => "float",
            ExtractionRule::State => "state",
        }
    }

    /// Apply the rule to the text following the header.
    ///
    /// Returns the raw parameter text, or `None` if the rule does not match.
    fn apply<'a>(&self, rest: &'a str) -> Option<&'a str> {
        match self {
            ExtractionRule::Integer => {
                let end = rest
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rest.len());
                (end > 0).then(|| &rest[..end])
            }
            ExtractionRule::Float => {
                let token = argument(rest)?;
                is_decimal(token).then_some(token)
            }
            ExtractionRule::State => {
                let token = argument(rest)?;
                let valid = token.chars().all(|c| c.is_ascii_digit())
                    || token.eq_ignore_ascii_case("ON")
                    || token.eq_ignore_ascii_case("OFF");
                valid.then_some(token)
            }
        }
    }
}

/// The first whitespace-separated token after the header, which must be
/// separated from the header by at least one space.
fn argument(rest: &str) -> Option<&str> {
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.split_whitespace().next()
}

/// `-?digits.digits`
fn is_decimal(token: &str) -> bool {
    let unsigned = token.strip_prefix('-').unwrap_or(token);
    match unsigned.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.chars().all(|c| c.is_ascii_digit())
                && frac.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Leading alphabetic run of a segment.
fn header(segment: &str) -> &str {
    let end = segment
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(segment.len());
    &segment[..end]
}

/// One node of the command tree.
#[derive(Debug, Clone)]
pub struct CommandNode {
    tag: String,
    short_form: String,
    extract: Option<(ExtractionRule, Parameter)>,
    operation: Option<Operation>,
    children: Vec<CommandNode>,
}

impl CommandNode {
    /// Create a routing node for `tag` (e.g. `"SOURce"`).
    pub fn new(tag: &str) -> Self {
        let short_form: String = tag.chars().filter(|c| c.is_ascii_uppercase()).collect();
        CommandNode {
            tag: tag.to_string(),
            short_form,
            extract: None,
            operation: None,
            children: Vec::new(),
        }
    }

    /// Extract `parameter` from this node's segment using `rule`.
    pub fn extract(mut self, rule: ExtractionRule, parameter: Parameter) -> Self {
        self.extract = Some((rule, parameter));
        self
    }

    /// Mark this node as a leaf resolving to `operation`.
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Append a child node.
    pub fn child(mut self, child: CommandNode) -> Self {
        self.children.push(child);
        self
    }

    /// The node's tag as registered.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The operation this node resolves to, if it is a leaf.
    pub fn resolved_operation(&self) -> Option<Operation> {
        self.operation
    }

    /// Child nodes in registration order.
    pub fn children(&self) -> &[CommandNode] {
        &self.children
    }

    /// Whether `segment`'s header names this node.
    pub fn matches(&self, segment: &str) -> bool {
        let header = header(segment);
        !header.is_empty()
            && (header.eq_ignore_ascii_case(&self.tag)
                || (!self.short_form.is_empty() && header.eq_ignore_ascii_case(&self.short_form)))
    }

    /// First child matching `segment`.
    pub fn child_for(&self, segment: &str) -> Option<&CommandNode> {
        self.children.iter().find(|child| child.matches(segment))
    }

    /// Apply this node's extraction rule to `segment`.
    ///
    /// Returns `Ok(None)` for nodes that carry no parameter.
    pub fn extract_from<'a>(&self, segment: &'a str) -> Result<Option<(Parameter, &'a str)>> {
        let Some((rule, parameter)) = self.extract else {
            return Ok(None);
        };
        let rest = &segment[header(segment).len()..];
        match rule.apply(rest) {
            Some(raw) => Ok(Some((parameter, raw))),
            None => Err(Error::ParameterExtraction {
                segment: segment.to_string(),
                rule: rule.name(),
            }),
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let label = if self.tag.is_empty() { "Root" } else { &self.tag };
        write!(f, "{}{}", "    ".repeat(depth), label)?;
        if let Some((rule, parameter)) = self.extract {
            write!(f, " <{parameter}: {}>", rule.name())?;
        }
        if let Some(operation) = self.operation {
            write!(f, " -> {operation}")?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Immutable command trie rooted at an unnamed node.
#[derive(Debug, Clone)]
pub struct CommandTree {
    root: CommandNode,
}

impl CommandTree {
    /// Build a tree from top-level nodes.
    pub fn new(nodes: Vec<CommandNode>) -> Self {
        let mut root = CommandNode::new("");
        root.children = nodes;
        CommandTree { root }
    }

    /// The grammar understood by the GPP-4323.
    pub fn gpp4323() -> Self {
        use ExtractionRule::*;

        CommandTree::new(vec![
            CommandNode::new("SOURce")
                .extract(Integer, Parameter::Channel)
                .child(
                    CommandNode::new("CURRent")
                        .extract(Float, Parameter::Current)
                        .operation(Operation::SetCurrent),
                )
                .child(
                    CommandNode::new("VOLTage")
                        .extract(Float, Parameter::Voltage)
                        .operation(Operation::SetVoltage),
                ),
            CommandNode::new("OUTPut")
                .extract(Integer, Parameter::Channel)
                .child(
                    CommandNode::new("STATe")
                        .extract(State, Parameter::State)
                        .operation(Operation::SetChannelState),
                ),
            CommandNode::new("MEASure")
                .extract(Integer, Parameter::Channel)
                .child(CommandNode::new("ALL").operation(Operation::GetAllMeasurements)),
        ])
    }

    /// The root node.
    pub fn root(&self) -> &CommandNode {
        &self.root
    }
}

impl Default for CommandTree {
    fn default() -> Self {
        Self::gpp4323()
    }
}

impl fmt::Display for CommandTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.render(f, 0)
    }
}
