use std::sync::Arc;

use axum::{
    http::header,
    response::{Html, IntoResponse, Redirect},
    routing::get,
    Router,
};

use crate::{auth::CurrentUser, AppState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/sign-in", get(sign_in))
        .route("/assets/app.js", get(app_js))
        .route("/assets/style.css", get(style_css))
}

async fn index(user: Option<CurrentUser>) -> impl IntoResponse {
    match user {
        Some(_) => Html(include_str!("../assets/index.html")).into_response(),
        None => Redirect::to("/sign-in").into_response(),
    }
}

async fn sign_in(user: Option<CurrentUser>) -> impl IntoResponse {
    match user {
        Some(_) => Redirect::to("/").into_response(),
        None => Html(include_str!("../assets/sign_in.html")).into_response(),
    }
}

async fn app_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        include_str!("../assets/app.js"),
    )
}

async fn style_css() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css")],
        include_str!("../assets/style.css"),
    )
}
