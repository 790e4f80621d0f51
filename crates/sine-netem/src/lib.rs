//! tc data plane for SiNE.
//!
//! Synthesizes and applies the per-node traffic-control program on the
//! shared-bridge interface: one HTB hierarchy with a class per
//! destination, a netem + tbf chain under each class, and flower filters
//! steering traffic by destination IP. The program shape is part of the
//! external contract — verification scripts match the exact class ids.

pub mod apply;
pub mod namespace;
pub mod program;

pub use apply::{install, update, TcError};
pub use namespace::Netns;
pub use program::{dest_class_minor, DestSlot, Shaping, TcProgram, DEFAULT_CLASS_MINOR};
