//! Canvas and workspace synchronization engine.
//!
//! This crate owns the client-local model of a project's spatial workspaces
//! (moodboards, whiteboards, workflows, timelines): a positioned, layered set
//! of canvas elements with threaded annotations, the drag gesture that moves
//! them, and the write-through/reconcile loop that keeps the local copy in
//! line with a single remote source of truth. Rendering, auth, and the backend
//! itself live elsewhere; the backend is reached through [`remote::RemoteStore`].
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`spatial`] | Points, sizes, clamping, and z-order helpers |
//! | [`doc`] | Element, content, and canvas document types |
//! | [`store`] | In-memory element store for one canvas |
//! | [`annotation`] | Threaded annotations anchored to elements |
//! | [`input`] | Drag gesture state machine |
//! | [`event`] | Change events and the broadcast bus |
//! | [`workspace`] | Workspace records, drafts, and patches |
//! | [`remote`] | Remote store trait plus in-memory and HTTP backends |
//! | [`directory`] | Per-project workspace dedup cache |
//! | [`sync`] | Pending mutations, FIFO write-through, reconciliation |
//! | [`engine`] | Per-workspace facade exposing the imperative API |
//! | [`config`] | Environment-driven tuning knobs |
//! | [`error`] | Shared error-code trait |
//! | [`consts`] | Shared numeric defaults |

pub mod annotation;
pub mod config;
pub mod consts;
pub mod directory;
pub mod doc;
pub mod engine;
pub mod error;
pub mod event;
pub mod input;
pub mod remote;
pub mod spatial;
pub mod store;
pub mod sync;
pub mod workspace;
