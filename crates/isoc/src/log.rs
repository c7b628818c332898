//! Logging shims.
//!
//! Hardware builds log through `defmt` (feature `defmt`, filtered at build
//! time by `DEFMT_LOG`); desktop and simulator builds log through `tracing`
//! (feature `tracing`, filtered at run time by the subscriber). With neither
//! feature the macros only type-check their arguments.
//!
//! Arguments must be primitives, `&str`, or crate types that implement both
//! `Display` and `defmt::Format` (such as `IsocError`), so that every backend
//! accepts them.

macro_rules! trace {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::trace!($($arg)+);
        #[cfg(feature = "tracing")]
        ::tracing::trace!($($arg)+);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            let _ = ::core::format_args!($($arg)+);
        }
    }};
}

macro_rules! debug {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::debug!($($arg)+);
        #[cfg(feature = "tracing")]
        ::tracing::debug!($($arg)+);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            let _ = ::core::format_args!($($arg)+);
        }
    }};
}

macro_rules! info {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::info!($($arg)+);
        #[cfg(feature = "tracing")]
        ::tracing::info!($($arg)+);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            let _ = ::core::format_args!($($arg)+);
        }
    }};
}

// `warn` would clash with the built-in lint attribute on re-export.
macro_rules! warn_ {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::warn!($($arg)+);
        #[cfg(feature = "tracing")]
        ::tracing::warn!($($arg)+);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            let _ = ::core::format_args!($($arg)+);
        }
    }};
}

macro_rules! error {
    ($($arg:tt)+) => {{
        #[cfg(feature = "defmt")]
        ::defmt::error!($($arg)+);
        #[cfg(feature = "tracing")]
        ::tracing::error!($($arg)+);
        #[cfg(not(any(feature = "defmt", feature = "tracing")))]
        {
            let _ = ::core::format_args!($($arg)+);
        }
    }};
}

pub(crate) use {debug, error, info, trace, warn_ as warn};
