use serde::Serialize;

pub(crate) mod health_check_controller;
pub(crate) mod version_controller;

/// Envelope for successful JSON responses.
#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    status_code: u16,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status_code: u16, data: T) -> Self {
        Self { status_code, data }
    }
}
