use http::{
    header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS},
    HeaderValue, Method, StatusCode,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    domains::{NewPerson, PersonUpdate},
    error::StoreError,
    http::{Html, IntoResponse, Json, Request, Response},
    AppState,
};

use self::payload::{Field, PersonPayload};

type HandlerResult = Result<Response, StoreError>;

/// Dispatches a request to its handler. Store failures the error handler
/// cannot translate are returned to the server.
pub async fn route_request(request: Request, app_state: AppState) -> HandlerResult {
    if let Some(response) = app_state.static_files.serve(&request).await {
        return Ok(response);
    }

    let path = request.uri().path().trim_end_matches('/');
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    // HEAD answers like GET, minus the body
    let head = request.method() == Method::HEAD;
    let method = if head { "GET" } else { request.method().as_str() };

    let result = match (method, segments.as_slice()) {
        ("GET", ["info"]) => info(&app_state).await,
        ("GET", ["api", "persons"]) => list_people(&app_state).await,
        ("GET", ["api", "persons", id]) => get_person(&app_state, id).await,
        ("POST", ["api", "persons"]) => create_person(&app_state, &request).await,
        ("PUT", ["api", "persons", id]) => update_person(&app_state, id, &request).await,
        ("DELETE", ["api", "persons", id]) => delete_person(&app_state, id).await,
        ("OPTIONS", _) => Ok(preflight()),
        _ => Ok(unknown_endpoint()),
    };

    let mut response = result.or_else(handle_error)?;
    if head {
        *response.body_mut() = None;
    }

    Ok(response)
}

/// Turns the store failures a client can act on into `400`s. Everything else
/// is handed back untouched.
pub fn handle_error(err: StoreError) -> HandlerResult {
    tracing::error!("{err}");

    match err {
        StoreError::MalformedId(_) => Ok(error_response(
            StatusCode::BAD_REQUEST,
            "malformatted id",
        )),
        StoreError::Validation(message) => Ok(error_response(StatusCode::BAD_REQUEST, &message)),
        err => Err(err),
    }
}

async fn info(app_state: &AppState) -> HandlerResult {
    let now = OffsetDateTime::now_utc();
    let count = app_state.repository.count().await?;

    let timestamp = now.format(&Rfc3339).unwrap_or_else(|_| now.to_string());
    let body = format!("<p>Phonebook has info for {count} people</p><p>{timestamp}</p>");

    Ok(Html(body).into_response())
}

async fn list_people(app_state: &AppState) -> HandlerResult {
    let people = app_state.repository.list_all().await?;
    Ok(Json(people).into_response())
}

async fn get_person(app_state: &AppState, id: &str) -> HandlerResult {
    let person = app_state.repository.find_by_id(id).await?;

    Ok(match person {
        Some(person) => Json(person).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

async fn create_person(app_state: &AppState, request: &Request) -> HandlerResult {
    let payload = match PersonPayload::from_request(request) {
        Ok(payload) => payload,
        Err(response) => return Ok(response),
    };

    let present = |field: Option<Field>| field.and_then(Field::into_present);
    let (Some(name), Some(number)) = (present(payload.name), present(payload.number)) else {
        return Ok(error_response(StatusCode::BAD_REQUEST, "content missing"));
    };

    let person = app_state
        .repository
        .insert(NewPerson { name, number })
        .await?;

    Ok(Json(person).into_response())
}

async fn update_person(app_state: &AppState, id: &str, request: &Request) -> HandlerResult {
    let payload = match PersonPayload::from_request(request) {
        Ok(payload) => payload,
        Err(response) => return Ok(response),
    };

    let update = PersonUpdate {
        name: payload.name.map(Field::into_text).unwrap_or_default(),
        number: payload.number.map(Field::into_text).unwrap_or_default(),
    };

    let person = app_state.repository.update_by_id(id, update).await?;

    Ok(match person {
        Some(person) => Json(person).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

async fn delete_person(app_state: &AppState, id: &str) -> HandlerResult {
    app_state.repository.delete_by_id(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();

    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,HEAD,PUT,PATCH,POST,DELETE"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );

    response
}

fn unknown_endpoint() -> Response {
    error_response(StatusCode::NOT_FOUND, "unknown endpoint")
}

fn error_response(status: StatusCode, message: &str) -> Response {
    #[derive(serde::Serialize)]
    struct ErrorBody<'a> {
        error: &'a str,
    }

    (status, Json(ErrorBody { error: message })).into_response()
}

mod payload {
    use super::*;

    #[derive(Debug, Default, serde::Deserialize)]
    pub(super) struct PersonPayload {
        pub(super) name: Option<Field>,
        pub(super) number: Option<Field>,
    }

    /// A field value as clients send it. Numbers and booleans are stored in
    /// their textual form.
    #[derive(Debug, serde::Deserialize)]
    #[serde(untagged)]
    pub(super) enum Field {
        Text(String),
        Number(serde_json::Number),
        Bool(bool),
    }

    impl Field {
        pub(super) fn into_text(self) -> String {
            match self {
                Field::Text(text) => text,
                Field::Number(number) => number.to_string(),
                Field::Bool(flag) => flag.to_string(),
            }
        }

        /// `None` for the falsy values `""`, `0` and `false`.
        pub(super) fn into_present(self) -> Option<String> {
            let present = match &self {
                Field::Text(text) => !text.is_empty(),
                Field::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
                Field::Bool(flag) => *flag,
            };

            present.then(|| self.into_text())
        }
    }

    impl PersonPayload {
        /// A missing or empty body reads as `{}`.
        pub(super) fn from_request(request: &Request) -> Result<Self, Response> {
            let Some(body) = request.body().as_ref().filter(|body| !body.is_empty()) else {
                return Ok(Self::default());
            };

            serde_json::from_slice(body).map_err(|err| {
                tracing::debug!(%err, "rejecting request body");
                error_response(StatusCode::BAD_REQUEST, "malformed json")
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use http::header::CONTENT_TYPE;
    use serde_json::{json, Value};

    use crate::{
        domains::Person,
        repositories::{memory::MemoryPeopleRepository, PeopleRepository},
        statics::StaticFiles,
    };

    use super::*;

    fn app_state() -> (AppState, Arc<MemoryPeopleRepository>) {
        let repository = Arc::new(MemoryPeopleRepository::new());
        let state = AppState {
            repository: repository.clone(),
            static_files: Arc::new(StaticFiles::new("/nonexistent/phonebook/build")),
        };

        (state, repository)
    }

    fn request(method: Method, path: &str, body: Option<Value>) -> Request {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(body.map(|body| Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn send(state: &AppState, method: Method, path: &str, body: Option<Value>) -> Response {
        route_request(request(method, path, body), state.clone())
            .await
            .expect("request should not fail")
    }

    fn json_body(response: &Response) -> Value {
        let body = response.body().as_ref().expect("response has a body");
        serde_json::from_slice(body).unwrap()
    }

    async fn create(state: &AppState, name: &str, number: &str) -> Person {
        let response = send(
            state,
            Method::POST,
            "/api/persons",
            Some(json!({ "name": name, "number": number })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        serde_json::from_value(json_body(&response)).unwrap()
    }

    #[tokio::test]
    async fn created_person_can_be_fetched() {
        let (state, _) = app_state();
        let created = create(&state, "Arto Hellas", "040-123456").await;

        let response = send(&state, Method::GET, &format!("/api/persons/{}", created.id), None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            json_body(&response),
            json!({ "id": created.id, "name": "Arto Hellas", "number": "040-123456" })
        );
    }

    #[tokio::test]
    async fn lists_every_person() {
        let (state, _) = app_state();
        create(&state, "Ada Lovelace", "39-44-5323523").await;
        create(&state, "Dan Abramov", "12-43-234345").await;

        let response = send(&state, Method::GET, "/api/persons", None).await;
        let people = json_body(&response);

        assert_eq!(response.status(), StatusCode::OK);
        let mut names: Vec<_> = people
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, ["Ada Lovelace", "Dan Abramov"]);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_without_writing() {
        let (state, repository) = app_state();

        for body in [
            json!({ "number": "040-123456" }),
            json!({ "name": "Arto Hellas" }),
            json!({ "name": "", "number": "040-123456" }),
            json!({ "name": "Arto Hellas", "number": null }),
            json!({}),
        ] {
            let response = send(&state, Method::POST, "/api/persons", Some(body)).await;

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(json_body(&response), json!({ "error": "content missing" }));
        }

        let response = send(&state, Method::POST, "/api/persons", None).await;
        assert_eq!(json_body(&response), json!({ "error": "content missing" }));

        assert_eq!(repository.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn numeric_fields_are_stored_as_text() {
        let (state, _) = app_state();
        let body = json!({ "name": "Ada", "number": 12345 });

        let response = send(&state, Method::POST, "/api/persons", Some(body)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(&response)["number"], "12345");
    }

    #[tokio::test]
    async fn falsy_fields_count_as_missing() {
        let (state, repository) = app_state();

        for body in [
            json!({ "name": "Ada", "number": 0 }),
            json!({ "name": false, "number": "1" }),
        ] {
            let response = send(&state, Method::POST, "/api/persons", Some(body)).await;

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(json_body(&response), json!({ "error": "content missing" }));
        }

        assert_eq!(repository.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn head_mirrors_get_without_body() {
        let (state, _) = app_state();
        let created = create(&state, "Ada", "1").await;

        for path in ["/api/persons".to_string(), format!("/api/persons/{}", created.id)] {
            let response = send(&state, Method::HEAD, &path, None).await;

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
            assert!(response.body().is_none());
        }
    }

    #[tokio::test]
    async fn invalid_json_is_rejected() {
        let (state, repository) = app_state();
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/api/persons")
            .body(Some(Bytes::from_static(b"{\"name\": ")))
            .unwrap();

        let response = route_request(request, state).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&response), json!({ "error": "malformed json" }));
        assert_eq!(repository.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_ids_are_translated() {
        let (state, _) = app_state();

        for method in [Method::GET, Method::PUT, Method::DELETE] {
            let body = (method == Method::PUT).then(|| json!({ "name": "a", "number": "1" }));
            let response = send(&state, method, "/api/persons/not-an-id", body).await;

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(json_body(&response), json!({ "error": "malformatted id" }));
        }
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (state, _) = app_state();
        let path = format!("/api/persons/{}", uuid::Uuid::now_v7());

        let response = send(&state, Method::GET, &path, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.body().is_none());

        let body = json!({ "name": "a", "number": "1" });
        let response = send(&state, Method::PUT, &path, Some(body)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.body().is_none());
    }

    #[tokio::test]
    async fn update_is_persisted() {
        let (state, _) = app_state();
        let created = create(&state, "Mary Poppendieck", "39-23-6423122").await;
        let path = format!("/api/persons/{}", created.id);

        let body = json!({ "name": "Mary Poppendieck", "number": "040-999999" });
        let response = send(&state, Method::PUT, &path, Some(body)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(&response)["number"], "040-999999");

        let response = send(&state, Method::GET, &path, None).await;
        assert_eq!(json_body(&response)["number"], "040-999999");
        assert_eq!(json_body(&response)["name"], "Mary Poppendieck");
    }

    #[tokio::test]
    async fn update_writes_absent_fields_as_empty() {
        let (state, _) = app_state();
        let created = create(&state, "Ada", "1").await;
        let path = format!("/api/persons/{}", created.id);

        let response = send(&state, Method::PUT, &path, Some(json!({ "number": "2" }))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(&response)["name"], "");
        assert_eq!(json_body(&response)["number"], "2");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (state, _) = app_state();
        let created = create(&state, "Arto Hellas", "040-123456").await;
        let path = format!("/api/persons/{}", created.id);

        for _ in 0..2 {
            let response = send(&state, Method::DELETE, &path, None).await;
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
            assert!(response.body().is_none());
        }

        let response = send(&state, Method::GET, &path, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn info_reports_count_and_fresh_timestamp() {
        let (state, _) = app_state();
        create(&state, "Ada", "1").await;
        create(&state, "Dan", "2").await;

        let first = send(&state, Method::GET, "/info", None).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = send(&state, Method::GET, "/info", None).await;

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()[CONTENT_TYPE], "text/html; charset=utf-8");

        let first = std::str::from_utf8(first.body().as_ref().unwrap()).unwrap().to_string();
        let second = std::str::from_utf8(second.body().as_ref().unwrap()).unwrap().to_string();

        assert!(first.contains("Phonebook has info for 2 people"), "{first}");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let (state, _) = app_state();

        for (method, path) in [
            (Method::GET, "/nonexistent"),
            (Method::PATCH, "/api/persons"),
            (Method::POST, "/api/persons/123"),
            (Method::GET, "/api/persons/a/b"),
            (Method::GET, "/"),
        ] {
            let response = send(&state, method, path, None).await;

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(json_body(&response), json!({ "error": "unknown endpoint" }));
        }
    }

    #[tokio::test]
    async fn trailing_slash_is_ignored() {
        let (state, _) = app_state();
        create(&state, "Ada", "1").await;

        let response = send(&state, Method::GET, "/api/persons/", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(&response).as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn preflight_lists_allowed_methods() {
        let (state, _) = app_state();
        let response = send(&state, Method::OPTIONS, "/api/persons", None).await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_METHODS],
            "GET,HEAD,PUT,PATCH,POST,DELETE"
        );
    }

    #[test]
    fn validation_errors_keep_their_message() {
        let response = handle_error(StoreError::Validation("name is required".into())).unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&response), json!({ "error": "name is required" }));
    }

    #[test]
    fn other_errors_are_propagated() {
        let err = handle_error(StoreError::Database(sqlx::Error::PoolClosed)).unwrap_err();
        assert!(matches!(err, StoreError::Database(sqlx::Error::PoolClosed)));
    }
}
