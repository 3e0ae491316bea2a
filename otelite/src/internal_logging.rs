#![allow(unused_macros)]
//! Internal diagnostics.
//!
//! **Note**: `otel_info!`, `otel_warn!`, `otel_debug!` and `otel_error!` are meant for
//! otelite itself and for exporters built on top of it, not for application logging.
//!
//! With the `internal-logs` feature the events are emitted through `tracing`, with the
//! crate name as target and the event `name` duplicated as a field so `fmt` subscribers
//! show it. Under `cfg(test)` they are also printed to stdout, which shows up when tests
//! run with `--nocapture`. Values may be evaluated more than once, so pass expressions
//! such as `format!(..)` or references rather than values that would be moved.

#[doc(hidden)]
#[macro_export]
macro_rules! __otel_log {
    ($level:ident, $label:literal, $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(test)]
        {
            print!(concat!($label, ": name={}\n"), $name);
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = $name;
        }
    };
    ($level:ident, $label:literal, $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(
                name: $name,
                target: env!("CARGO_PKG_NAME"),
                name = $name,
                $($key = { $value }),+
            );
        }

        #[cfg(test)]
        {
            print!(concat!($label, ": name={}"), $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            print!("\n");
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

/// Logs an informational event.
///
/// ```rust
/// use otelite::otel_info;
/// otel_info!(name: "Controller.Started", period_ms = 3000);
/// ```
#[macro_export]
macro_rules! otel_info {
    (name: $name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_log!(info, "otel_info", $name $(, $($rest)*)?)
    };
}

/// Logs a warning.
///
/// ```rust
/// use otelite::otel_warn;
/// otel_warn!(name: "Config.InvalidEnvValue", variable = "OTEL_METRIC_EXPORT_INTERVAL");
/// ```
#[macro_export]
macro_rules! otel_warn {
    (name: $name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_log!(warn, "otel_warn", $name $(, $($rest)*)?)
    };
}

/// Logs a debug event.
///
/// ```rust
/// use otelite::otel_debug;
/// otel_debug!(name: "Controller.NoMetricsToExport");
/// ```
#[macro_export]
macro_rules! otel_debug {
    (name: $name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_log!(debug, "otel_debug", $name $(, $($rest)*)?)
    };
}

/// Logs an error.
///
/// ```rust
/// use otelite::otel_error;
/// otel_error!(name: "Controller.ExportFailed", reason = format!("{}", "connection refused"));
/// ```
#[macro_export]
macro_rules! otel_error {
    (name: $name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_log!(error, "otel_error", $name $(, $($rest)*)?)
    };
}
