//! Command-line adapter over `agent-mesh-core`.

pub mod reply;
