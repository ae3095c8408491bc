//! Programmer registration and dispatch
//!
//! This module provides a centralized registry for all programmers, with support
//! for feature-gated inclusion and dynamic help text generation.

use hvprog_core::programmer::HvProgrammer;

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory AVR emulator for testing (chip=<name>,mode=<parallel|serial>)",
    });

    #[cfg(feature = "linux-gpio")]
    programmers.push(ProgrammerInfo {
        name: "linux_gpio",
        aliases: &["linux-gpio", "gpio"],
        description: "Linux GPIO bitbang (dev=/dev/gpiochipN,mode=<parallel|serial>,<line>=<offset>)",
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");

    for p in &programmers {
        help.push_str(&format!("  {:12} - {}\n", p.name, p.description));
    }

    help
}

/// Generate a short list of programmer names for CLI help
pub fn programmer_names_short() -> String {
    let programmers = available_programmers();
    let names: Vec<&str> = programmers.iter().map(|p| p.name).collect();
    names.join(", ")
}

/// Resolve a programmer name or alias to its canonical name
pub fn find_programmer(name: &str) -> Option<&'static str> {
    available_programmers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name))
        .map(|p| p.name)
}

/// Execute a function with the specified programmer
///
/// The programmer string can be just the name (e.g., "dummy") or include
/// parameters (e.g., "linux_gpio:gpiochip=1,mode=serial").
#[allow(unused_variables)]
pub fn with_programmer<F>(programmer: &str, f: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut dyn HvProgrammer) -> Result<(), Box<dyn std::error::Error>>,
{
    let (name, options) = parse_programmer_string(programmer);

    let canonical_name = match find_programmer(name) {
        Some(n) => n,
        None => {
            return Err(unknown_programmer_error(name));
        }
    };

    match canonical_name {
        #[cfg(feature = "dummy")]
        "dummy" => {
            let config = dummy_config(&options)?;
            log::info!(
                "Emulating {} over the {} interface",
                config.chip.description,
                config.protocol
            );
            let mut master = hvprog_dummy::DummyAvr::new(config);
            f(&mut master)
        }

        #[cfg(feature = "linux-gpio")]
        "linux_gpio" => {
            log::info!("Opening Linux GPIO programmer...");

            let mut master = hvprog_linux_gpio::open_linux_gpio(&options).map_err(|e| {
                format!(
                    "Failed to open Linux GPIO programmer: {}\n\
                     Make sure the gpiochip exists and you have read/write permissions.",
                    e
                )
            })?;

            f(master.as_mut())
        }

        _ => Err(unknown_programmer_error(name)),
    }
}

/// Build the emulated target from `chip=` and `mode=` options
#[cfg(feature = "dummy")]
fn dummy_config(
    options: &[(&str, &str)],
) -> Result<hvprog_dummy::DummyConfig, Box<dyn std::error::Error>> {
    use hvprog_core::programmer::Protocol;
    use hvprog_dummy::DummyConfig;

    let mut config = DummyConfig::default();
    for &(key, value) in options {
        match key {
            "chip" => {
                let protocol = config.protocol;
                config = DummyConfig::for_chip(value).ok_or_else(|| {
                    format!(
                        "Unknown chip '{}' (see 'hvprog list-chips' for the supported models)",
                        value
                    )
                })?;
                config.protocol = protocol;
            }
            "mode" => {
                config.protocol = match value {
                    "parallel" | "hvpp" => Protocol::Parallel,
                    "serial" | "hvsp" => Protocol::Serial,
                    _ => return Err(format!("Invalid mode '{}', expected parallel or serial", value).into()),
                };
            }
            _ => log::warn!("Ignoring unknown dummy option '{}'", key),
        }
    }
    Ok(config)
}

/// Parse a programmer string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

fn unknown_programmer_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown programmer: {}\n\n", name);
    msg.push_str(&programmer_help());
    msg.push_str("\nUse 'hvprog list-programmers' for more details");
    msg.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_programmer_options() {
        let (name, options) = parse_programmer_string("linux_gpio:gpiochip=1,mode=serial");
        assert_eq!(name, "linux_gpio");
        assert_eq!(options, vec![("gpiochip", "1"), ("mode", "serial")]);

        let (name, options) = parse_programmer_string("dummy");
        assert_eq!(name, "dummy");
        assert!(options.is_empty());
    }

    #[test]
    fn unknown_programmer_is_rejected() {
        assert!(find_programmer("ch341a").is_none());
        let err = with_programmer("ch341a", |_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("Unknown programmer"));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn dummy_options_select_chip_and_mode() {
        use hvprog_core::programmer::Protocol;

        let config = dummy_config(&[("mode", "serial"), ("chip", "ATtiny85")]).unwrap();
        assert_eq!(config.chip.description, "ATtiny85");
        assert_eq!(config.protocol, Protocol::Serial);

        assert!(dummy_config(&[("chip", "ATnothing")]).is_err());
        assert!(dummy_config(&[("mode", "jtag")]).is_err());
    }

    #[cfg(feature = "linux-gpio")]
    #[test]
    fn linux_gpio_aliases_resolve() {
        assert_eq!(find_programmer("gpio"), Some("linux_gpio"));
        assert_eq!(find_programmer("linux-gpio"), Some("linux_gpio"));
    }
}
