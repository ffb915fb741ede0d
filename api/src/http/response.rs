use bytes::Bytes;
use http::{
    header::{CONTENT_LENGTH, CONTENT_TYPE},
    HeaderValue, StatusCode,
};

pub type Response = http::Response<Option<Bytes>>;

pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        let mut response = http::Response::new(None);
        *response.status_mut() = self;
        if allows_content_length(self) {
            response.headers_mut().insert(CONTENT_LENGTH, 0.into());
        }

        response
    }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Response {
        with_content_type(self, &mime::APPLICATION_OCTET_STREAM)
    }
}

pub struct Json<T>(pub T);
impl<T> IntoResponse for Json<T>
where
    T: serde::Serialize,
{
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(json) => with_content_type(json.into(), &mime::APPLICATION_JSON),
            Err(err) => {
                tracing::error!(%err, "failed to serialize response body");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

pub struct Html<T>(pub T);
impl<T> IntoResponse for Html<T>
where
    T: Into<Bytes>,
{
    fn into_response(self) -> Response {
        with_content_type(self.0.into(), &mime::TEXT_HTML_UTF_8)
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        with_content_type(self.into(), &mime::TEXT_PLAIN_UTF_8)
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        with_content_type(Bytes::from(self), &mime::TEXT_PLAIN_UTF_8)
    }
}

impl<B: IntoResponse> IntoResponse for (StatusCode, B) {
    fn into_response(self) -> Response {
        let mut response = self.1.into_response();
        *response.status_mut() = self.0;

        response
    }
}

/// 1xx and 204 responses never carry a `Content-Length`.
pub(crate) fn allows_content_length(status: StatusCode) -> bool {
    !status.is_informational() && status != StatusCode::NO_CONTENT
}

pub(crate) fn with_content_type(body: Bytes, content_type: &mime::Mime) -> Response {
    let body_len = body.len();
    let mut response = http::Response::new(Some(body));

    if let Ok(value) = HeaderValue::from_str(content_type.as_ref()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, body_len.into());

    response
}
