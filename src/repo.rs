use std::fmt;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{NewSiswa, Siswa};

#[derive(Debug)]
pub enum RepoError {
    /// The unique index on `nis` rejected an insert.
    DuplicateNis,
    Database(sqlx::Error),
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoError::DuplicateNis => write!(f, "nis already exists"),
            RepoError::Database(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for RepoError {}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::DuplicateNis,
            _ => RepoError::Database(err),
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Data access for the `siswas` table. Every listing is ordered by `nama` ascending.
#[async_trait]
pub trait SiswaRepository: Send + Sync {
    async fn list(&self) -> RepoResult<Vec<Siswa>>;

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Siswa>>;

    async fn find_by_nis(&self, nis: &str) -> RepoResult<Option<Siswa>>;

    async fn insert(&self, siswa: NewSiswa) -> RepoResult<Siswa>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: i64) -> RepoResult<bool>;

    /// Case-insensitive substring match of `keyword` against nama, nis, rombel or rayon.
    async fn search(&self, keyword: &str) -> RepoResult<Vec<Siswa>>;
}

pub struct PgSiswaRepository {
    pg: PgPool,
}

impl PgSiswaRepository {
    pub fn new(pg: PgPool) -> Self {
        Self { pg }
    }
}

/// Escapes LIKE metacharacters so the keyword only ever matches literally.
pub fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for ch in keyword.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl SiswaRepository for PgSiswaRepository {
    async fn list(&self) -> RepoResult<Vec<Siswa>> {
        let rows = sqlx::query_as::<_, Siswa>("SELECT * FROM siswas ORDER BY nama ASC, id ASC")
            .fetch_all(&self.pg)
            .await?;
        Ok(rows)
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Siswa>> {
        let row = sqlx::query_as::<_, Siswa>("SELECT * FROM siswas WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pg)
            .await?;
        Ok(row)
    }

    async fn find_by_nis(&self, nis: &str) -> RepoResult<Option<Siswa>> {
        let row = sqlx::query_as::<_, Siswa>("SELECT * FROM siswas WHERE nis = $1 LIMIT 1")
            .bind(nis)
            .fetch_optional(&self.pg)
            .await?;
        Ok(row)
    }

    async fn insert(&self, siswa: NewSiswa) -> RepoResult<Siswa> {
        let row = sqlx::query_as::<_, Siswa>(
            "INSERT INTO siswas \
             (nis, nama, rombel, rayon, password, medsos, portofolio, certifikat) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(siswa.nis)
        .bind(siswa.nama)
        .bind(siswa.rombel)
        .bind(siswa.rayon)
        .bind(siswa.password_hash)
        .bind(siswa.medsos)
        .bind(siswa.portofolio)
        .bind(siswa.certifikat)
        .fetch_one(&self.pg)
        .await?;
        Ok(row)
    }

    async fn delete(&self, id: i64) -> RepoResult<bool> {
        let affected = sqlx::query("DELETE FROM siswas WHERE id = $1")
            .bind(id)
            .execute(&self.pg)
            .await?;
        Ok(affected.rows_affected() >= 1)
    }

    async fn search(&self, keyword: &str) -> RepoResult<Vec<Siswa>> {
        let rows = sqlx::query_as::<_, Siswa>(
            "SELECT * FROM siswas \
             WHERE nama ILIKE $1 ESCAPE '\\' OR nis ILIKE $1 ESCAPE '\\' \
                OR rombel ILIKE $1 ESCAPE '\\' OR rayon ILIKE $1 ESCAPE '\\' \
             ORDER BY nama ASC, id ASC",
        )
        .bind(like_pattern(keyword))
        .fetch_all(&self.pg)
        .await?;
        Ok(rows)
    }
}
