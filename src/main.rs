pub mod auth;
pub mod config;
pub mod err;
pub mod input;
pub mod io;
pub mod models;
pub mod repo;
pub mod siswa;
pub mod validate;

#[cfg(test)]
mod test_utils;

use std::path::Path;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::err::{Error, Success};
use crate::io::{FileStore, LocalFileStore};
use crate::repo::{PgSiswaRepository, SiswaRepository};

pub type Payload<T> = Result<(StatusCode, Json<Success<T>>), Error>;

pub fn proceeds<V>(message: &'static str, value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok((StatusCode::OK, Json(Success::of(message, value))))
}

pub fn created<V>(message: &'static str, value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok((StatusCode::CREATED, Json(Success::of(message, value))))
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn SiswaRepository>,
    pub files: Arc<dyn FileStore>,
}

pub fn app(state: AppState, storage_root: &Path, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/login", post(auth::login))
        .route("/siswas", get(siswa::index).post(siswa::store))
        .route("/siswas/search", get(siswa::search))
        .route("/siswas/:id", get(siswa::show).delete(siswa::destroy))
        .nest_service("/storage", ServeDir::new(storage_root))
        .fallback(err::handler404)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::parse();

    let pg = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!().run(&pg).await?;

    let files = LocalFileStore::new(config.storage_dir.clone(), config.public_url.clone());
    io::prepare_io(&files).await?;

    let state = AppState {
        repo: Arc::new(PgSiswaRepository::new(pg)),
        files: Arc::new(files),
    };
    let app = app(state, &config.storage_dir, config.max_body_bytes);

    let listener = TcpListener::bind(config.listen).await?;
    log::info!("Starting Siswa HTTP Server on http://{}", config.listen);
    axum::serve(listener, app).await?;
    Ok(())
}
