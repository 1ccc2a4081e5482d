use askama::Template;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::handlers::TRY_AGAIN_REPLY;

/// Twilio messaging reply carrying exactly one message.
#[derive(Template)]
#[template(path = "twiml.xml")]
pub struct TwimlTemplate<'a> {
    pub body: &'a str,
}

/// Rendered TwiML, served as `application/xml`.
#[derive(Debug, Clone)]
pub struct TwimlReply(pub String);

impl TwimlReply {
    pub fn message(body: &str) -> Self {
        match (TwimlTemplate { body }).render() {
            Ok(xml) => Self(xml),
            Err(err) => {
                error!(error = %err, "failed to render twiml");
                Self(format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response><Message>{TRY_AGAIN_REPLY}</Message></Response>"
                ))
            }
        }
    }
}

impl IntoResponse for TwimlReply {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/xml; charset=utf-8"),
            )],
            self.0,
        )
            .into_response()
    }
}
