pub mod fs_store;
pub mod pipeline;
pub mod policy;
pub mod store;
