//! 块设备请求层
//!
//! 所有设备共享一张定长请求表；每个主设备号在设备表中有一项，
//! 记录驱动和该设备按电梯顺序排列的待处理请求链。
//!
//! - block/request.rs 请求槽、设备表项与请求表
//! - block/elevator.rs 请求排序与插入
//! - block/device.rs 驱动接口与注册
//! - block/ll_rw.rs 提交请求与完成回调
//! - block/ramdisk.rs 内存盘驱动
//! - block/handle.rs 可以提供对某块缓冲的 RAII 引用

mod device;
mod elevator;
mod handle;
mod ll_rw;
mod ramdisk;
mod request;

pub use device::BlockDriver;
pub use handle::Block;
pub use ramdisk::RamDisk;
pub use request::{IoOp, RequestCmd, RequestInfo};

pub(crate) use request::RequestQueue;
