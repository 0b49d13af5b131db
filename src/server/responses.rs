use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, Clone)]
pub struct UnknownProgram {
    pub id: String,
}

impl IntoResponse for UnknownProgram {
    fn into_response(self) -> Response {
        let id = self.id;

        IntoResponse::into_response((StatusCode::NOT_FOUND, format!("Program `{id}` not found")))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InvalidSecret;

impl IntoResponse for InvalidSecret {
    fn into_response(self) -> Response {
        IntoResponse::into_response((StatusCode::FORBIDDEN, "Invalid or missing secret"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AccessDenied;

impl IntoResponse for AccessDenied {
    fn into_response(self) -> Response {
        IntoResponse::into_response((StatusCode::FORBIDDEN, "Access denied"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotFound(pub &'static str);

impl IntoResponse for NotFound {
    fn into_response(self) -> Response {
        IntoResponse::into_response((StatusCode::NOT_FOUND, format!("{} not found", self.0)))
    }
}
