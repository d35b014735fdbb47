use serde::Serialize;

/// The success envelope: `{data, message}`.
#[derive(Serialize)]
pub struct Response<T> {
    pub data: T,
    pub message: String,
}

impl<T> Response<T> {
    pub fn new(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
        }
    }
}

/// The error envelope: `{detail}`.
#[derive(Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl ErrorDetail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}
