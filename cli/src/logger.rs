use log::{Level, Metadata, Record};

/// Prints `[target] message`, coloured by level. Records from other crates
/// only show up from `Warn` upwards.
pub struct ColoredLogger;

impl log::Log for ColoredLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with("tessera") || metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let color = match record.level() {
            Level::Info => "\x1b[36m",
            Level::Warn => "\x1b[33m",
            Level::Error => "\x1b[31m",
            Level::Debug => "\x1b[35m",
            Level::Trace => "\x1b[37m",
        };
        let reset = "\x1b[0m";
        let bold = "\x1b[1m";
        let target = record.target().trim_start_matches("tessera::");

        if record.level() <= Level::Warn {
            eprintln!("{color}{bold}[{target}]{reset} {}", record.args());
        } else {
            println!("{color}{bold}[{target}]{reset} {}", record.args());
        }
    }

    fn flush(&self) {}
}

pub static LOGGER: ColoredLogger = ColoredLogger;
