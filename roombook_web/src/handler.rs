use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use roombook::domain::{
    booking::{BookingError, BookingRequest},
    reservation::ReservationId,
};
use tracing::error;

use crate::{
    flash::{clear_cookie, Flash, FlashLevel},
    registry::AppRegistry,
    view,
};

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

pub async fn show_form(State(registry): State<AppRegistry>, headers: HeaderMap) -> Response {
    let service = registry.booking_service();
    let flash = Flash::from_headers(&headers);
    render(view::booking_form(service.policy(), flash.as_ref()), flash.is_some())
}

pub async fn submit_reservation(
    State(registry): State<AppRegistry>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let request = booking_request(fields);
    match registry.booking_service().reserve(request).await {
        Ok(reservation) => redirect_with(
            "/reservations",
            Flash::new(
                FlashLevel::Success,
                format!(
                    "Reservation confirmed: {} {} {}~{}",
                    reservation.room(),
                    reservation.date(),
                    reservation.start_label(),
                    reservation.end_label()
                ),
            ),
        ),
        Err(BookingError::DataAccess(e)) => internal_error(e),
        Err(e) => redirect_with("/", Flash::new(FlashLevel::Danger, e.to_string())),
    }
}

pub async fn show_reservations(
    State(registry): State<AppRegistry>,
    headers: HeaderMap,
) -> Response {
    let flash = Flash::from_headers(&headers);
    match registry.booking_service().list().await {
        Ok(reservations) => render(
            view::reservation_list(&reservations, flash.as_ref()),
            flash.is_some(),
        ),
        Err(e) => internal_error(e),
    }
}

pub async fn delete_reservation(
    State(registry): State<AppRegistry>,
    Path(id): Path<String>,
) -> Response {
    let id = match id.parse::<u64>() {
        Ok(id) => ReservationId::from(id),
        Err(_) => return not_found(&format!("Reservation {} not found.", id)),
    };
    match registry.booking_service().cancel(id).await {
        Ok(_) => redirect_with(
            "/reservations",
            Flash::new(FlashLevel::Info, "The reservation has been deleted."),
        ),
        Err(e @ BookingError::NotFound { .. }) => not_found(&e.to_string()),
        Err(e) => internal_error(e),
    }
}

/// フォームの値を予約入力に詰め替える
///
/// `slots`は複数回送られてくる。
fn booking_request(fields: Vec<(String, String)>) -> BookingRequest {
    fields
        .into_iter()
        .fold(BookingRequest::default(), |mut request, (key, value)| {
            match key.as_str() {
                "name" => request.name = value,
                "student_id" => request.student_id = value,
                "room" => request.room = value,
                "date" => request.date = value,
                "slots" => request.slots.push(value),
                _ => {}
            }
            request
        })
}

fn render(html: String, consumed_flash: bool) -> Response {
    if consumed_flash {
        ([(header::SET_COOKIE, clear_cookie())], Html(html)).into_response()
    } else {
        Html(html).into_response()
    }
}

fn redirect_with(to: &str, flash: Flash) -> Response {
    (
        [(header::SET_COOKIE, flash.to_cookie())],
        Redirect::to(to),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Html(view::not_found(message))).into_response()
}

fn internal_error<E: std::fmt::Display>(e: E) -> Response {
    error!("予約処理で内部エラーが発生しました: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(view::server_error()),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{HeaderValue, Request, Response as HttpResponse},
        Router,
    };
    use roombook::{
        domain::{
            booking::{BookingPolicy, BookingService},
            reservation::Room,
            slot::generate_slots,
            Entity,
        },
        infrastructure::reservation::InMemoryReservationRepository,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::route::build_routers;

    fn app() -> (Router, AppRegistry) {
        let policy = BookingPolicy::new(
            ["A101", "A102", "B201"].into_iter().map(Room::new).collect(),
            generate_slots(8, 23).unwrap(),
        );
        let registry = AppRegistry::new(BookingService::new(
            policy,
            Box::new(InMemoryReservationRepository::new()),
        ));
        (build_routers(registry.clone()), registry)
    }

    fn post_form(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn location<B>(response: &HttpResponse<B>) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    /// レスポンスのflash Cookieを次のリクエスト用の形にする
    fn flash_cookie<B>(response: &HttpResponse<B>) -> String {
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_owned()
    }

    async fn body_text(response: Response) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_submit_reservation() {
        let (app, registry) = app();
        let response = app
            .clone()
            .oneshot(post_form(
                "name=Alice&student_id=B10901001&room=A101&date=2024-01-01&slots=09%3A00&slots=10%3A00",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/reservations");
        let cookie = flash_cookie(&response);

        let reservations = registry.booking_service().list().await.unwrap();
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].start_label(), "09:00");
        assert_eq!(reservations[0].end_label(), "11:00");

        let response = app
            .oneshot(get("/reservations", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Reservation confirmed: A101 2024-01-01 09:00~11:00"));
        assert!(html.contains("<td>Alice</td>"));
    }

    #[tokio::test]
    async fn test_submit_empty_selection() {
        let (app, registry) = app();
        let response = app
            .clone()
            .oneshot(post_form(
                "name=Alice&student_id=B10901001&room=A101&date=2024-01-01",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        let cookie = flash_cookie(&response);
        assert!(registry.booking_service().list().await.unwrap().is_empty());

        let response = app.oneshot(get("/", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::SET_COOKIE],
            "flash=; Path=/; Max-Age=0"
        );
        let html = body_text(response).await;
        assert!(html.contains("Please select at least one time slot."));
    }

    #[tokio::test]
    async fn test_submit_long_value_fits_cookie() {
        let (app, _) = app();
        let body = format!(
            "name=Alice&student_id=B1&room={}&date=2024-01-01&slots=09%3A00",
            "A".repeat(8000)
        );
        let response = app.oneshot(post_form(&body)).await.unwrap();
        assert_eq!(location(&response), "/");
        let cookie = flash_cookie(&response);
        assert!(cookie.len() < 4096);
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());
        let flash = Flash::from_headers(&headers).unwrap();
        assert!(flash.message.starts_with("Unknown room: AAAA"));
        assert!(flash.message.ends_with("..."));
    }

    #[tokio::test]
    async fn test_submit_conflict() {
        let (app, registry) = app();
        let first = "name=Alice&student_id=B1&room=A101&date=2024-01-01&slots=09%3A00&slots=10%3A00";
        let second = "name=Bob&student_id=B2&room=A101&date=2024-01-01&slots=10%3A00&slots=11%3A00";
        app.clone().oneshot(post_form(first)).await.unwrap();
        let response = app.oneshot(post_form(second)).await.unwrap();
        assert_eq!(location(&response), "/");
        assert_eq!(registry.booking_service().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_reservation() {
        let (app, registry) = app();
        app.clone()
            .oneshot(post_form(
                "name=Alice&student_id=B1&room=B201&date=2024-01-01&slots=13%3A00",
            ))
            .await
            .unwrap();
        let id = registry.booking_service().list().await.unwrap()[0].id();

        let response = app
            .clone()
            .oneshot(get(&format!("/delete/{}", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/reservations");
        assert!(registry.booking_service().list().await.unwrap().is_empty());

        let response = app
            .clone()
            .oneshot(get(&format!("/delete/{}", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app.oneshot(get("/delete/abc", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_show_form() {
        let (app, _) = app();
        let response = app.oneshot(get("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let html = body_text(response).await;
        assert!(html.contains(r#"<option value="B201">B201</option>"#));
        assert!(html.contains("22:00-23:00"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = app();
        let response = app.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
