//! Logging shims that compile to nothing unless `with_tracing` is enabled.

macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "with_tracing")]
        ::tracing::trace!($($arg)*);
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "with_tracing")]
        ::tracing::debug!($($arg)*);
    };
}

macro_rules! warning {
    ($($arg:tt)*) => {
        #[cfg(feature = "with_tracing")]
        ::tracing::warn!($($arg)*);
    };
}

macro_rules! error {
    ($($arg:tt)*) => {
        #[cfg(feature = "with_tracing")]
        ::tracing::error!($($arg)*);
    };
}

pub(crate) use {debug, error, trace, warning};
