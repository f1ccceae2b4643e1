//! Upstream HTTP surface
//!
//! - **Server** (`server.rs`) - hyper routes over a coordinator
//! - **Response** (`response.rs`) - `{success, data, error, details}` envelope
//! - **Form** (`form.rs`) - multipart or raw upload bodies
//! - **Health** (`health.rs`) - liveness and readiness

mod form;
mod health;
mod response;
mod server;

pub use form::{upload_from_body, DEFAULT_UPLOAD_NAME, FILE_FIELD};
pub use health::{HealthCheck, HealthCheckResult, HealthStatus};
pub use response::{status_for, ApiResponse};
pub use server::{route, ApiServer, Route};
