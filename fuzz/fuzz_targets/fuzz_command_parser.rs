//! Fuzz target: `Command::parse`
//!
//! Any text must parse without panicking, and re-joining the parsed base
//! and flags must parse back to the same command.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use arctic_link::command::Command;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let cmd = Command::parse(&text);

    if cmd.base().starts_with('-') {
        return;
    }
    let mut line = cmd.base().to_owned();
    for (flag, value) in cmd.flags() {
        line.push(' ');
        line.push_str(flag);
        if !value.is_empty() {
            line.push(' ');
            line.push_str(value);
        }
    }
    assert_eq!(Command::parse(&line), cmd);
});
