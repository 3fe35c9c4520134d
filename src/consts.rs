//! Shared numeric defaults for the engine.

// ── Canvas ──────────────────────────────────────────────────────

/// Width of a canvas created without an explicit document.
pub const DEFAULT_CANVAS_WIDTH: f64 = 1920.0;

/// Height of a canvas created without an explicit document.
pub const DEFAULT_CANVAS_HEIGHT: f64 = 1080.0;

/// Background color of a canvas created without an explicit document.
pub const DEFAULT_CANVAS_BACKGROUND: &str = "#ffffff";

/// Smallest width or height an element may have, in canvas units.
pub const MIN_ELEMENT_SIZE: f64 = 1.0;

// ── Sync ────────────────────────────────────────────────────────

/// Upper bound on a single remote write before it counts as failed.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;

/// Upper bound on a remote fetch (listing or reconciliation refetch).
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Buffered events per subscriber before slow receivers start lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

// ── Remote (HTTP) ───────────────────────────────────────────────

pub const DEFAULT_REMOTE_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REMOTE_CONNECT_TIMEOUT_SECS: u64 = 10;
