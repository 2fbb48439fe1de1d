//! Observability hooks for the iteration engine.
//!
//! Chunk transitions, tile tuning and cache fills are the interesting events
//! when diagnosing an iteration. The `log_metric!` macro emits them as
//! structured key/value records on the `visiter::metric` log target, and
//! `init_logging` wires an `env_logger` backend for hosts that have none.
//!
//! Release builds skip the formatting in `log_metric!` but still evaluate each
//! value once, so locals computed for a record stay used.

use log::LevelFilter;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Once;

use crate::error::Result;

/// Logs a structured key-value metric record at `debug` level, only in debug builds.
///
/// # Example
/// ```
/// use visiter_cache::log_metric;
/// let rows = 4;
/// log_metric!("event"="row_group", "rows"=&rows);
/// ```
#[macro_export]
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        #[cfg(debug_assertions)]
        {
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+
            ::log::debug!(target: "visiter::metric", "{{ {} }}", parts.join(", "));
        }
        #[cfg(not(debug_assertions))]
        {
            $(
                let _ = &$value;
            )+
        }
    };
}

static INIT_LOGGER: Once = Once::new();

/// Installs an `env_logger` backend at `level`, optionally appending to `log_file`.
///
/// Only the first call has any effect. If another logger is already installed
/// the call is a no-op.
pub fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    if INIT_LOGGER.is_completed() {
        return Ok(());
    }
    let file = match log_file {
        Some(path) => Some(OpenOptions::new().append(true).create(true).open(path)?),
        None => None,
    };

    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.is_test(false);
        builder.filter_level(level);

        // Custom formatter: level, target and message only.
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args())
        });

        if let Some(file) = file {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        let _ = builder.try_init();
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    #[test]
    fn test_log_metric_evaluates_each_value_once() {
        let calls = Cell::new(0);
        let next = || {
            calls.set(calls.get() + 1);
            calls.get()
        };
        log_metric!("event" = "test", "first" = next(), "second" = next());
        assert_eq!(calls.get(), 2);
    }
}
