pub mod query_mode;
pub mod query_status;
pub mod set_mode;
