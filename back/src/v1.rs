use std::sync::Arc;

use api::v1::{CreateTodo, Todo};
use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{auth::CurrentUser, error::Error, AppState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/todos", get(get_todos))
        .route("/todos", post(add_todo))
        .route("/todos/:id/done", post(set_todo_done))
        .route("/todos/:id", delete(remove_todo))
}

async fn get_todos(State(state): State<Arc<AppState>>, user: CurrentUser) -> Json<Vec<Todo>> {
    Json(state.list_todos(&user.subject).await)
}

async fn add_todo(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(request): Json<CreateTodo>,
) -> Result<Json<Todo>, Error> {
    let todo = state.add_todo(&user.subject, &request.content).await?;
    Ok(Json(todo))
}

async fn set_todo_done(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(done): Json<bool>,
) -> Result<Json<Todo>, Error> {
    let todo = state.set_done(&user.subject, id, done).await?;
    Ok(Json(todo))
}

async fn remove_todo(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<(), Error> {
    state.remove_todo(&user.subject, id).await
}
