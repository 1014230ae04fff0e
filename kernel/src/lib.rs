// Ringlog Kernel
//
// Fixed-capacity log of the most recent commands, shared between a
// character-device style front end and a TCP server.

pub mod access;
pub mod adapters;
pub mod assembly;
pub mod config;
pub mod log;
pub mod position;
