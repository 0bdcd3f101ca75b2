// Diagnostic stream. Routed to the `log` facade when the feature is on,
// otherwise the arguments are still type-checked but nothing is emitted.

#[cfg(feature = "log")]
macro_rules! diag_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! diag_warn {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

#[cfg(feature = "log")]
macro_rules! diag_info {
    ($($arg:tt)*) => { log::info!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! diag_info {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}

#[cfg(feature = "log")]
macro_rules! diag_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! diag_debug {
    ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
}
