#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use vsync_controller_core as core;
pub use vsync_controller_k8s_api as k8s;
pub use vsync_controller_k8s_index as index;
pub use vsync_controller_k8s_status as status;

mod args;
mod lease;

pub use self::args::Args;
