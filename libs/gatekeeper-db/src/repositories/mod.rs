pub mod approval_repo;
pub mod json_store;
pub mod memory_store;
