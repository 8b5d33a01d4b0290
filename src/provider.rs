//! Seam to the event-source layer.
//!
//! Providers own probe attachment (kprobes, tracepoints, timers) and
//! register themselves outside this crate. The tree only holds a
//! reference so passes can ask which provider a probe resolved to.

use std::fmt;

pub trait Provider {
    /// Provider name as written in probe specs, e.g. `kprobe`.
    fn name(&self) -> &str;
}

impl fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Provider({})", self.name())
    }
}
