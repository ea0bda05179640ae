//! Client-local durable storage of funnel documents.

pub mod memory;
mod repository;

pub use memory::InMemoryFunnelRepository;
pub use repository::LocalFunnelRepository;
