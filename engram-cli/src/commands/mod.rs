// engram-cli/src/commands/mod.rs
// ============================================================================
// Module: Commands
// Description: One function per CLI verb, each returning the envelope's
// `data` payload or a `CliError`.
// Purpose: Keep `main.rs` a thin arg-parsing and dispatch layer.
// Dependencies: engram-core, engram-store, engram-learn, engram-bbon
// ============================================================================

pub mod bbon;
pub mod core;
