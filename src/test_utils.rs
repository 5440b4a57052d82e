//! In-memory store and request helpers for driving the router in tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::io::{LocalFileStore, Purpose};
use crate::models::{NewSiswa, Siswa};
use crate::repo::{RepoError, RepoResult, SiswaRepository};
use crate::{app, AppState};

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";
pub const GIF: &[u8] = b"GIF89a\x01\0\x01\0\0\0\0;";

const BOUNDARY: &str = "siswa-test-boundary";

/// `SiswaRepository` over a vector, mirroring the Postgres ordering and matching rules.
#[derive(Default)]
pub struct MemorySiswaRepository {
    rows: Mutex<Vec<Siswa>>,
    next_id: AtomicI64,
    outage: AtomicBool,
    reject_inserts: AtomicBool,
    blind_nis_lookups: AtomicBool,
}

impl MemorySiswaRepository {
    pub fn rows(&self) -> Vec<Siswa> {
        self.rows.lock().unwrap().clone()
    }

    /// Every call fails as if the pool could not hand out a connection.
    pub fn fail_with_outage(&self) {
        self.outage.store(true, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self) {
        self.reject_inserts.store(true, Ordering::SeqCst);
    }

    /// `find_by_nis` stops seeing rows while `insert` still enforces uniqueness, the way
    /// a concurrent create looks between the lookup and the insert.
    pub fn hide_nis_lookups(&self) {
        self.blind_nis_lookups.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> RepoResult<()> {
        if self.outage.load(Ordering::SeqCst) {
            return Err(RepoError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn sorted(mut rows: Vec<Siswa>) -> Vec<Siswa> {
        rows.sort_by(|a, b| a.nama.cmp(&b.nama).then(a.id.cmp(&b.id)));
        rows
    }
}

#[async_trait]
impl SiswaRepository for MemorySiswaRepository {
    async fn list(&self) -> RepoResult<Vec<Siswa>> {
        self.check()?;
        Ok(Self::sorted(self.rows()))
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Siswa>> {
        self.check()?;
        Ok(self.rows().into_iter().find(|s| s.id == id))
    }

    async fn find_by_nis(&self, nis: &str) -> RepoResult<Option<Siswa>> {
        self.check()?;
        if self.blind_nis_lookups.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.rows().into_iter().find(|s| s.nis == nis))
    }

    async fn insert(&self, siswa: NewSiswa) -> RepoResult<Siswa> {
        self.check()?;
        if self.reject_inserts.load(Ordering::SeqCst) {
            return Err(RepoError::Database(sqlx::Error::WorkerCrashed));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|s| s.nis == siswa.nis) {
            return Err(RepoError::DuplicateNis);
        }
        let now = Utc::now();
        let row = Siswa {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            nis: siswa.nis,
            nama: siswa.nama,
            rombel: siswa.rombel,
            rayon: siswa.rayon,
            password: siswa.password_hash,
            medsos: siswa.medsos,
            portofolio: siswa.portofolio,
            certifikat: siswa.certifikat,
            created_at: now,
            updated_at: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn delete(&self, id: i64) -> RepoResult<bool> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|s| s.id != id);
        Ok(rows.len() < before)
    }

    async fn search(&self, keyword: &str) -> RepoResult<Vec<Siswa>> {
        self.check()?;
        let keyword = keyword.to_lowercase();
        let hits = self
            .rows()
            .into_iter()
            .filter(|s| {
                [&s.nama, &s.nis, &s.rombel, &s.rayon]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&keyword))
            })
            .collect();
        Ok(Self::sorted(hits))
    }
}

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MemorySiswaRepository>,
    pub storage: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let storage = tempfile::tempdir().unwrap();
        let repo = Arc::new(MemorySiswaRepository::default());
        let files = LocalFileStore::new(storage.path(), "http://localhost:3000");
        let state = AppState {
            repo: repo.clone(),
            files: Arc::new(files),
        };
        let router = app(state, storage.path(), 16 * 1024 * 1024);
        Self {
            router,
            repo,
            storage,
        }
    }

    pub async fn request(&self, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn request_json(&self, req: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = self.request(req).await;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request_json(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_raw(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request_json(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request_json(
            Request::post(uri)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_multipart(
        &self,
        uri: &str,
        fields: &[(&str, &str)],
        files: &[(&str, &str, &[u8])],
    ) -> (StatusCode, Value) {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        for (name, file_name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, name, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        self.request_json(
            Request::post(uri)
                .header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Creates a student with password `secret1` and returns its id.
    pub async fn seed(&self, nis: &str, nama: &str, rombel: &str, rayon: &str) -> i64 {
        let (status, body) = self
            .post_json(
                "/siswas",
                json!({
                    "nis": nis,
                    "nama": nama,
                    "rombel": rombel,
                    "rayon": rayon,
                    "password": "secret1"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "seed failed: {}", body);
        body["data"]["id"].as_i64().unwrap()
    }

    /// Every file currently present in either upload namespace.
    pub fn stored_files(&self) -> Vec<PathBuf> {
        Purpose::ALL
            .iter()
            .filter_map(|purpose| {
                std::fs::read_dir(self.storage.path().join(purpose.namespace())).ok()
            })
            .flat_map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
            })
            .collect()
    }
}

