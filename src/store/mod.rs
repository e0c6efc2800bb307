pub mod disk;
pub mod memory;

pub use disk::DiskRepository;
pub use memory::MemoryRepository;
