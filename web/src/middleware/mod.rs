pub mod request_log;
pub mod security_headers;
