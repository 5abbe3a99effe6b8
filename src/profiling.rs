//! Profiling support via Tracy.
//!
//! Enabled with the `profiling` Cargo feature. The executor opens a span per
//! graph traversal and per node run, and [`FrameDriver`](crate::driver::FrameDriver)
//! marks frame boundaries. Start a Tracy client (`tracy_client::Client::start()`)
//! in the application to collect them; spans are skipped while no client is
//! running.
//!
//! When profiling is disabled (the default), all macros compile to no-ops.

#[cfg(feature = "profiling")]
pub use tracy_client::{self, Client};

/// Mark the end of a frame for Tracy's frame analysis.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        if let Some(client) = $crate::profiling::Client::running() {
            client.frame_mark();
        }
    };
}

/// Mark the end of a frame (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Create a profiling span for the current scope.
///
/// ```ignore
/// fn encode_shadows() {
///     profile_scope!("encode_shadows");
///     // ...
/// }
/// ```
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::Client::running()
            .map(|c| c.span_alloc(Some($name), "", file!(), line!(), 0));
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Create a profiling span with a runtime-determined name, such as a node
/// label.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope_dynamic {
    ($name:expr) => {
        let _profile_span = $crate::profiling::Client::running()
            .map(|c| c.span_alloc(Some($name), "", file!(), line!(), 0));
    };
}

/// Create a profiling span with a dynamic name (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope_dynamic {
    ($name:expr) => {
        let _ = $name;
    };
}

pub use frame_mark;
pub use profile_scope;
pub use profile_scope_dynamic;
