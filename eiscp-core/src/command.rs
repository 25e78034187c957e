//! Symbolic command names and their resolution to eISCP opcodes.
//!
//! Every name maps to exactly one [`CommandDescriptor`]:
//! - `Literal`: a fixed opcode (`"p1"` → `PWR01`)
//! - `Template`: an opcode prefix completed by one argument (`"v 2A"` → `MVL2A`)
//! - `Macro`: named destinations, each an ordered list of navigation steps

use std::collections::HashMap;
use std::fmt;

use crate::error::EiscpError;
use crate::navigation::{MacroPlan, PlannedStep, Step};

/// Opcode issued for an empty input line.
pub const SELECT_OPCODE: &str = "NTCSELECT";

/// Name that a bare digit is rewritten to.
pub const SELECT_LINE: &str = "select-line";

// ── CommandDescriptor ────────────────────────────────────────────

/// One macro destination: target name and its steps.
pub type MacroTarget = (&'static str, &'static [&'static str]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDescriptor {
    Literal(&'static str),
    Template(&'static str),
    Macro(&'static [MacroTarget]),
}

impl CommandDescriptor {
    /// Number of arguments the descriptor requires.
    pub fn arity(&self) -> usize {
        match self {
            CommandDescriptor::Literal(_) => 0,
            CommandDescriptor::Template(_) | CommandDescriptor::Macro(_) => 1,
        }
    }
}

// ── Resolved ─────────────────────────────────────────────────────

/// What a `(name, argument)` pair resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A single opcode to send once.
    Opcode(String),
    /// A macro to hand to the navigation engine.
    Macro(MacroPlan),
}

impl fmt::Display for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Opcode(op) => write!(f, "{op}"),
            Resolved::Macro(plan) => write!(f, "{plan}"),
        }
    }
}

// ── Standard table ───────────────────────────────────────────────

use self::CommandDescriptor::{Literal, Macro, Template};

const GO_TARGETS: &[MacroTarget] = &[
    ("dlna", &["net", "top", "0"]),
    ("favorites", &["net", "top", "1"]),
    ("vtuner", &["net", "top", "2"]),
    ("music", &["net", "top", "0", "0", "0"]),
    ("radio", &["net", "top", "2", "0"]),
];

/// The receiver command set.
pub const STANDARD_COMMANDS: &[(&str, CommandDescriptor)] = &[
    // Power
    ("p0", Literal("PWR00")),
    ("p1", Literal("PWR01")),
    ("p?", Literal("PWRQSTN")),
    // Muting
    ("m0", Literal("AMT00")),
    ("m1", Literal("AMT01")),
    ("m", Literal("AMTTG")),
    ("m?", Literal("AMTQSTN")),
    // Master volume
    ("vu", Literal("MVLUP")),
    ("vd", Literal("MVLDOWN")),
    ("v", Template("MVL")),
    ("v?", Literal("MVLQSTN")),
    // Speaker layout
    ("sb", Literal("SPLSB")),
    ("sh", Literal("SPLFH")),
    ("sw", Literal("SPLFW")),
    ("shw", Literal("SPLHW")),
    ("up", Literal("SPLUP")),
    ("s?", Literal("SPLQSTN")),
    // Input selector
    ("net", Literal("SLI2B")),
    ("vcr", Literal("SLI00")),
    ("cbl", Literal("SLI01")),
    ("game", Literal("SLI02")),
    ("aux", Literal("SLI03")),
    ("pc", Literal("SLI05")),
    ("bd", Literal("SLI10")),
    ("fm", Literal("SLI24")),
    ("am", Literal("SLI25")),
    ("tuner", Literal("SLI26")),
    ("usb", Literal("SLI2C")),
    ("iu", Literal("SLIUP")),
    ("id", Literal("SLIDOWN")),
    ("i?", Literal("SLIQSTN")),
    // Tuner
    ("f", Template("TUN")),
    ("f?", Literal("TUNQSTN")),
    ("fdt", Literal("TUNDIRECT")),
    // Network transport
    ("play", Literal("NTCPLAY")),
    ("stop", Literal("NTCSTOP")),
    ("pause", Literal("NTCPAUSE")),
    ("repeat", Literal("NTCREPEAT")),
    ("random", Literal("NTCRANDOM")),
    ("display", Literal("NTCDISPLAY")),
    ("right", Literal("NTCRIGHT")),
    ("left", Literal("NTCLEFT")),
    ("tup", Literal("NTCTRUP")),
    ("tdn", Literal("NTCTRDN")),
    ("u", Literal("NTCUP")),
    ("d", Literal("NTCDOWN")),
    ("s", Literal(SELECT_OPCODE)),
    (SELECT_LINE, Template("NLSL")),
    ("n", Template("NLSL")),
    ("r", Literal("NTCRETURN")),
    ("cu", Literal("NTCCHUP")),
    ("cd", Literal("NTCCHDN")),
    ("ls", Literal("NTCLIST")),
    ("menu", Literal("NTCMENU")),
    ("top", Literal("NTCTOP")),
    // Metadata queries
    ("artist", Literal("NATQSTN")),
    ("album", Literal("NALQSTN")),
    ("title", Literal("NTIQSTN")),
    ("track", Literal("NTRQSTN")),
    ("status", Literal("NSTQSTN")),
    ("n?", Literal("NLSQSTN")),
    // Network services
    ("dlna", Literal("NSV000")),
    ("favorites", Literal("NSV010")),
    ("vtuner", Literal("NSV020")),
    ("lastfm", Literal("NSV060")),
    ("spotify", Literal("NSV0A1")),
    // Macros
    ("go", Macro(GO_TARGETS)),
];

// ── CommandTable ─────────────────────────────────────────────────

/// Registry of symbolic names. Keys are unique.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: HashMap<String, CommandDescriptor>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in receiver command set.
    pub fn standard() -> Self {
        let mut table = Self::new();
        for (name, descriptor) in STANDARD_COMMANDS {
            table.entries.insert((*name).to_string(), *descriptor);
        }
        table
    }

    /// Add a name. Fails if the name is already present.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        descriptor: CommandDescriptor,
    ) -> Result<(), EiscpError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(EiscpError::DuplicateCommand(name));
        }
        self.entries.insert(name, descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted list of every registered name.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve a tokenized `(name, argument)` pair.
    ///
    /// No range validation is done on arguments; the device rejects bad
    /// values itself.
    pub fn resolve(&self, name: Option<&str>, arg: Option<&str>) -> Result<Resolved, EiscpError> {
        let (name, arg) = match (name, arg) {
            (None, None) => return Ok(Resolved::Opcode(SELECT_OPCODE.to_string())),
            (None, Some(_)) => return Err(EiscpError::UnknownCommand(String::new())),
            (Some(digit), _) if is_single_digit(digit) => (SELECT_LINE, Some(digit)),
            (Some(name), arg) => (name, arg),
        };

        let descriptor = self
            .get(name)
            .ok_or_else(|| EiscpError::UnknownCommand(name.to_string()))?;

        match (*descriptor, arg) {
            (Literal(opcode), _) => Ok(Resolved::Opcode(opcode.to_string())),
            (Template(prefix), Some(arg)) => Ok(Resolved::Opcode(format!("{prefix}{arg}"))),
            (Macro(targets), Some(target)) => {
                let (_, tokens) = targets
                    .iter()
                    .find(|(t, _)| *t == target)
                    .ok_or_else(|| EiscpError::UnknownMacroTarget {
                        name: name.to_string(),
                        target: target.to_string(),
                    })?;
                self.plan(name, target, tokens).map(Resolved::Macro)
            }
            (Template(_) | Macro(_), None) => Err(EiscpError::ArgumentCount {
                command: name.to_string(),
                expected: 1,
                got: 0,
            }),
        }
    }

    /// Turn macro tokens into steps with resolved opcodes.
    fn plan(&self, name: &str, target: &str, tokens: &[&str]) -> Result<MacroPlan, EiscpError> {
        let steps = tokens
            .iter()
            .map(|token| {
                let step = Step::parse(token);
                let opcode = match &step {
                    Step::Command(literal) => match self.get(literal) {
                        Some(Literal(opcode)) => opcode.to_string(),
                        _ => return Err(EiscpError::UnknownCommand(literal.clone())),
                    },
                    navigation => navigation.opcode(),
                };
                Ok(PlannedStep { step, opcode })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(MacroPlan {
            name: name.to_string(),
            target: target.to_string(),
            steps,
        })
    }
}

fn is_single_digit(s: &str) -> bool {
    s.len() == 1 && s.as_bytes()[0].is_ascii_digit()
}
