//! Resolver backends

pub mod memory;
pub mod url;

pub use memory::MemoryResolver;
pub use url::UrlResolver;
