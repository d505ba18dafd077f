pub mod auth;
pub mod buildings;
pub mod checklist;
pub mod managers;
pub mod messages;
pub mod photos;
pub mod requests;

use crate::middleware::AppState;
use axum::Router;

pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::routes())
        .nest("/buildings", buildings::routes())
        .nest("/requests", requests::routes())
        .nest("/requests/:request_id/messages", messages::routes())
        .nest("/requests/:request_id/checklist", checklist::routes())
        .nest("/requests/:request_id/photos", photos::photo_routes())
        .nest("/requests/:request_id/documents", photos::document_routes())
        .nest("/admin/managers", managers::routes())
}
