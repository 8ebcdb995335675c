//! Run module: identity of one analysis run

mod run_info;

pub use run_info::RunInfo;
