//! 相机内参的异步解析
//!
//! 以设备身份为键，先查本地缓存，未命中再查远端服务；
//! 每个请求在到达终态时恰好回调一次。
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod cache;
pub mod identity;
pub mod lookup;
pub mod params;
pub mod resolver;
pub mod slot;

pub use cache::ParamCache;
pub use identity::DeviceIdentity;
pub use lookup::{HttpLookup, LookupError, LookupQuery, LookupService};
pub use params::CameraParams;
pub use resolver::{
    CalibrationRequest, CalibrationResolver, CalibrationResult, CalibrationState, ResolverConfig,
};
pub use slot::{CalibrationCallback, CalibrationSlot};
