//! CLI subcommand: `mdguard commands`

use crate::commands::format_help_text;

pub fn run() {
    println!("{}", format_help_text());
}
