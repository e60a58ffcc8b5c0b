//! `init` and `config` commands.
//!
//! Grounded on the teacher's `cli/commands/init.rs`: same "write a default
//! settings.toml, refuse to clobber one without `--force`" shape.

use crate::config::Settings;

pub fn run_init(force: bool) {
    match Settings::init_config_file(force) {
        Ok(path) => {
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

pub fn run_config(settings: &Settings) {
    println!("Current configuration:");
    println!("{}", "=".repeat(50));
    match toml::to_string_pretty(settings) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Error displaying config: {e}"),
    }
}
