//! Allowlisted bridge command catalogue.
//!
//! A command name that is not in [`COMMANDS`] cannot be registered with the
//! router and is rejected before any handler runs.

use crate::gate::GateOptions;

/// A bridge command definition.
pub struct CommandDef {
    pub name: &'static str,
    pub description: &'static str,
    /// Request payload shape, for help output.
    pub usage: &'static str,
    pub options: GateOptions,
}

impl CommandDef {
    /// Format as a help line, e.g. `  ping                 - Liveness check`
    fn help_line(&self) -> String {
        let mut line = format!("  {:<20}- {}", self.name, self.description);
        if !self.usage.is_empty() {
            line.push_str(&format!("\n  {:<20}  {}", "", self.usage));
        }
        line
    }
}

pub const COMMANDS: &[CommandDef] = &[
    CommandDef {
        name: "ping",
        description: "Liveness check for the bridge",
        usage: "",
        options: GateOptions {
            skip_origin_check: false,
            skip_rate_limit: true,
        },
    },
    CommandDef {
        name: "open_file",
        description: "Open a markdown document and return its validated text",
        usage: r#"{"path": "<file>"}"#,
        options: GateOptions::STRICT,
    },
    CommandDef {
        name: "resolve_resource",
        description: "Resolve an image or link relative to an open document",
        usage: r#"{"document": "<file>", "resource": "<relative path>"}"#,
        options: GateOptions::STRICT,
    },
    CommandDef {
        name: "open_external",
        description: "Open an http(s) link in the system browser",
        usage: r#"{"url": "<url>"}"#,
        options: GateOptions::STRICT,
    },
    CommandDef {
        name: "validate_url",
        description: "Check and normalize a URL without opening it",
        usage: r#"{"url": "<url>"}"#,
        options: GateOptions::STRICT,
    },
    CommandDef {
        name: "copy_rich_text",
        description: "Build a sanitized clipboard payload from preview HTML",
        usage: r#"{"html": "<html>", "text": "<optional plain text>"}"#,
        options: GateOptions::STRICT,
    },
];

/// Look up a command by exact name.
pub fn find_command(name: &str) -> Option<&'static CommandDef> {
    COMMANDS.iter().find(|cmd| cmd.name == name)
}

/// Help text listing every command.
pub fn format_help_text() -> String {
    let mut lines = vec!["Commands:".to_string()];
    for cmd in COMMANDS {
        lines.push(cmd.help_line());
    }
    lines.join("\n")
}
