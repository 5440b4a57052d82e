use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::io::FileStore;

/// A row of the `siswas` table. Carries the password hash, so it is deliberately not
/// `Serialize`; anything leaving the server goes through [`SiswaPublic`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Siswa {
    pub id: i64,
    pub nis: String,
    pub nama: String,
    pub rombel: String,
    pub rayon: String,
    pub password: String,
    pub medsos: Option<String>,
    pub portofolio: Option<String>,
    pub certifikat: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Siswa {
    /// Non-empty stored file paths, in column order.
    pub fn stored_files(&self) -> impl Iterator<Item = &str> {
        [self.portofolio.as_deref(), self.certifikat.as_deref()]
            .into_iter()
            .flatten()
            .filter(|path| !path.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct NewSiswa {
    pub nis: String,
    pub nama: String,
    pub rombel: String,
    pub rayon: String,
    pub password_hash: String,
    pub medsos: Option<String>,
    pub portofolio: Option<String>,
    pub certifikat: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiswaPublic {
    pub id: i64,
    pub nis: String,
    pub nama: String,
    pub rombel: String,
    pub rayon: String,
    pub medsos: Option<String>,
    pub portofolio: Option<String>,
    pub certifikat: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SiswaPublic {
    pub fn project(siswa: Siswa, files: &dyn FileStore) -> Self {
        Self {
            portofolio: files.url_for(siswa.portofolio.as_deref()),
            certifikat: files.url_for(siswa.certifikat.as_deref()),
            id: siswa.id,
            nis: siswa.nis,
            nama: siswa.nama,
            rombel: siswa.rombel,
            rayon: siswa.rayon,
            medsos: siswa.medsos,
            created_at: siswa.created_at,
            updated_at: siswa.updated_at,
        }
    }

    pub fn project_all(rows: Vec<Siswa>, files: &dyn FileStore) -> Vec<Self> {
        rows.into_iter()
            .map(|siswa| Self::project(siswa, files))
            .collect()
    }
}
