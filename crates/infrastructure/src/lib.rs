//! 调度服务端基础设施实现

pub mod memory_coordination;

pub use memory_coordination::MemoryCoordinationRegistry;
