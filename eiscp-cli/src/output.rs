//! Rendering of state snapshots, the command reference and input lines.

use std::fmt::Write;

use eiscp_core::{CommandDescriptor, CommandTable, DeviceState};

use crate::config::OutputFormat;

/// Render one snapshot in the configured format.
pub fn render(state: &DeviceState, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => state.to_string(),
        OutputFormat::Json => serde_json::to_string(state).unwrap_or_else(|e| {
            tracing::warn!("cannot serialize state: {e}");
            String::new()
        }),
    }
}

/// Words that print the command reference instead of reaching the receiver.
pub const HELP_WORDS: &[&str] = &["?", "h", "help"];

pub fn is_help(name: &str) -> bool {
    HELP_WORDS.contains(&name)
}

/// One line per command: name, then the opcode it sends, the opcode prefix
/// its argument completes, or its macro targets.
pub fn help(table: &CommandTable) -> String {
    let mut out = String::new();
    for name in table.names() {
        let Some(descriptor) = table.get(name) else {
            continue;
        };
        let detail = match descriptor {
            CommandDescriptor::Literal(opcode) => opcode.to_string(),
            CommandDescriptor::Template(prefix) => format!("{prefix}<arg>"),
            CommandDescriptor::Macro(targets) => {
                let names: Vec<&str> = targets.iter().map(|(target, _)| *target).collect();
                format!("<{}>", names.join("|"))
            }
        };
        let _ = writeln!(out, "{name:<14} {detail}");
    }
    out.push_str("(empty line)   NTCSELECT\n");
    out
}

/// Split an input line into `(name, argument)` on whitespace. Anything after
/// the second word is ignored.
pub fn tokenize(line: &str) -> (Option<&str>, Option<&str>) {
    let mut words = line.split_whitespace();
    (words.next(), words.next())
}
