pub mod http_client;
pub mod periodic;
pub mod target_process;
pub mod types;
