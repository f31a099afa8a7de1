#![cfg_attr(not(feature = "std"), no_std)]

use core::cell::Cell;

use critical_section::Mutex;

static PRINT_HOOK: Mutex<Cell<Option<fn(core::fmt::Arguments)>>> = Mutex::new(Cell::new(None));

pub const RESET: &str = "\u{001B}[0m";
pub const RED: &str = "\u{001B}[31m";
pub const GREEN: &str = "\u{001B}[32m";
pub const YELLOW: &str = "\u{001B}[33m";
pub const BLUE: &str = "\u{001B}[34m";
pub const CYAN: &str = "\u{001B}[35m";

static LOGGER: KernelLogger = KernelLogger;

/// Install the kernel logger as the `log` backend. Only the first call takes effect; the level
/// filter is updated on every call.
pub fn init_logger(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_max_level(level);
    log::set_logger(&LOGGER)
}

/// Route formatted records to `hook` in addition to any built-in backend.
pub fn set_print_hook(hook: fn(core::fmt::Arguments)) {
    critical_section::with(|cs| PRINT_HOOK.borrow(cs).set(Some(hook)));
}

pub fn clear_print_hook() {
    critical_section::with(|cs| PRINT_HOOK.borrow(cs).set(None));
}

fn level_color(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => RED,
        log::Level::Warn => YELLOW,
        log::Level::Info => GREEN,
        log::Level::Debug => BLUE,
        log::Level::Trace => CYAN,
    }
}

struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = level_color(record.level());

        cfg_if::cfg_if! {
            if #[cfg(feature = "std")] {
                std::eprintln!(
                    "{}{} {} - {}{}",
                    color,
                    record.level(),
                    record.target(),
                    record.args(),
                    RESET
                );
            }
        }

        // copy the hook out so it doesn't run inside the critical section
        let hook = critical_section::with(|cs| PRINT_HOOK.borrow(cs).get());
        if let Some(hook) = hook {
            hook(format_args!(
                "{}{} {} - {}{}",
                color,
                record.level(),
                record.target(),
                record.args(),
                RESET
            ));
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn counting_hook(_args: core::fmt::Arguments) {
        HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn hook_receives_enabled_records_only() {
        let _ = init_logger(log::LevelFilter::Info);
        set_print_hook(counting_hook);

        log::info!("visible");
        log::debug!("filtered out");
        clear_print_hook();
        log::warn!("no hook installed");

        assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn colors_per_level() {
        assert_eq!(level_color(log::Level::Error), RED);
        assert_eq!(level_color(log::Level::Trace), CYAN);
    }
}
