//! 调度服务端领域层：实体、协调服务端口、存储端口、路径规划

pub mod coordination;
pub mod entities;
pub mod paths;
pub mod repositories;

pub use coordination::{ChildChangeEvent, CoordinationRegistry};
pub use repositories::ScheduleRepository;
