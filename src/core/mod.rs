//! Core module: building blocks tanpa socket I/O
//!
//! - `FrameBuffer`: byte stream → message utuh
//! - `OutboundQueue`: FIFO per session, satu writer
//! - `Shutdown` / `WorkerGauge`: cancellation dan liveness accounting
//! - `TerminationSignals`: SIGINT/SIGTERM tanpa global state

mod frame_buffer;
mod outbound;
mod shutdown;
mod signal;

pub use frame_buffer::FrameBuffer;
pub use outbound::OutboundQueue;
pub use shutdown::{Shutdown, WorkerGauge};
pub use signal::TerminationSignals;
