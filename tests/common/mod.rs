//! 集成测试公共工具

pub mod stub_engine;

pub use stub_engine::*;
