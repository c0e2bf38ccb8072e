//! Standard attribute keys recorded by the middleware.
//!
//! Follows the semantic-convention names used across tracing backends so
//! exported spans line up with spans emitted by other instrumentations.

/// Logical name of the service emitting the span.
pub const SERVICE_NAME: &str = "service.name";

/// HTTP request method.
pub const HTTP_REQUEST_METHOD: &str = "http.request.method";

/// Numeric HTTP response status code.
pub const HTTP_RESPONSE_STATUS_CODE: &str = "http.response.status_code";

/// Size of the request body, in bytes, when known.
pub const HTTP_REQUEST_BODY_SIZE: &str = "http.request.body.size";

/// URI scheme of the request.
pub const URL_SCHEME: &str = "url.scheme";

/// Target path of the request, as received.
pub const URL_PATH: &str = "url.path";

/// Host component the request was addressed to.
pub const SERVER_ADDRESS: &str = "server.address";

/// The `User-Agent` header as sent by the client.
pub const USER_AGENT_ORIGINAL: &str = "user_agent.original";

/// Network address of the immediate client.
pub const CLIENT_ADDRESS: &str = "client.address";

/// Type of an error recorded on a span.
pub const EXCEPTION_TYPE: &str = "exception.type";

/// Message of an error recorded on a span.
pub const EXCEPTION_MESSAGE: &str = "exception.message";

/// Stack trace captured when an error was recorded, if available.
pub const EXCEPTION_STACKTRACE: &str = "exception.stacktrace";
