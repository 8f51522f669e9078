//! Transport adapters implementing [`Connection`](crate::core::Connection).

pub mod console;
pub mod memory;
pub mod tcp;

pub use console::ConsoleConnection;
pub use memory::MemoryConnection;
pub use tcp::peer_origin;
