use axum::extract::{Path, Query, State};

use crate::auth::hash_password;
use crate::err::{Data, Empty, Error, Listing};
use crate::input::RawInput;
use crate::io::Purpose;
use crate::models::{NewSiswa, Siswa, SiswaPublic};
use crate::validate::{taken, validate_keyword, validate_siswa, ValidImage, ValidSiswa};
use crate::{created, proceeds, AppState, Payload};

const FETCHED: &str = "Data siswa berhasil diambil";
const FETCH_FAILED: &str = "Gagal mengambil data siswa";
const CREATED: &str = "Siswa berhasil ditambahkan";
const CREATE_FAILED: &str = "Gagal menambahkan siswa";
const DELETED: &str = "Siswa berhasil dihapus";
const DELETE_FAILED: &str = "Gagal menghapus siswa";
const SEARCHED: &str = "Hasil pencarian berhasil diambil";
const SEARCH_FAILED: &str = "Gagal melakukan pencarian";

pub async fn index(State(state): State<AppState>) -> Payload<Listing<SiswaPublic>> {
    let rows = state
        .repo
        .list()
        .await
        .map_err(Error::failed(FETCH_FAILED))?;

    let data = SiswaPublic::project_all(rows, state.files.as_ref());
    proceeds(
        FETCHED,
        Listing {
            total: data.len(),
            data,
        },
    )
}

pub async fn store(
    State(state): State<AppState>,
    input: RawInput,
) -> Payload<Data<SiswaPublic>> {
    register(&state, input)
        .await
        .map_err(Error::failed(CREATE_FAILED))
}

pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Payload<Data<SiswaPublic>> {
    let siswa = find(&state, &id)
        .await
        .map_err(Error::failed(FETCH_FAILED))?;

    proceeds(
        FETCHED,
        Data {
            data: SiswaPublic::project(siswa, state.files.as_ref()),
        },
    )
}

pub async fn destroy(State(state): State<AppState>, Path(id): Path<String>) -> Payload<Empty> {
    remove(&state, &id)
        .await
        .map_err(Error::failed(DELETE_FAILED))?;

    proceeds(DELETED, Empty {})
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Payload<Listing<SiswaPublic>> {
    let keyword = validate_keyword(&RawInput::from_pairs(params)).map_err(Error::validation)?;

    let rows = state
        .repo
        .search(&keyword)
        .await
        .map_err(Error::failed(SEARCH_FAILED))?;

    let data = SiswaPublic::project_all(rows, state.files.as_ref());
    proceeds(
        SEARCHED,
        Listing {
            total: data.len(),
            data,
        },
    )
}

/// Unknown and non-numeric ids are both simply not found.
async fn find(state: &AppState, id: &str) -> Result<Siswa, Error> {
    let Ok(id) = id.parse::<i64>() else {
        return Err(Error::not_found());
    };
    state.repo.find_by_id(id).await?.ok_or_else(Error::not_found)
}

async fn register(state: &AppState, input: RawInput) -> Payload<Data<SiswaPublic>> {
    let validated = validate_siswa(&input);
    let nis_taken = match input.text("nis") {
        Some(nis) => state.repo.find_by_nis(&nis).await?.is_some(),
        None => false,
    };

    let siswa = match validated {
        Ok(siswa) if !nis_taken => siswa,
        Ok(_) => return Err(Error::field("nis", taken("nis"))),
        Err(mut errors) => {
            if nis_taken {
                errors.entry("nis".to_string()).or_default().push(taken("nis"));
            }
            return Err(Error::validation(errors));
        }
    };

    let mut stored = Vec::new();
    match persist(state, siswa, &mut stored).await {
        Ok(row) => created(
            CREATED,
            Data {
                data: SiswaPublic::project(row, state.files.as_ref()),
            },
        ),
        Err(err) => {
            discard(state, &stored).await;
            Err(err)
        }
    }
}

/// Writes the uploads, then the row. Paths of files written so far are pushed onto
/// `stored` so a failed insert can take them back out.
async fn persist(
    state: &AppState,
    siswa: ValidSiswa,
    stored: &mut Vec<String>,
) -> Result<Siswa, Error> {
    let password_hash = hash_password(&siswa.password)?;
    let portofolio =
        store_image(state, Purpose::Portofolio, siswa.portofolio.as_ref(), stored).await?;
    let certifikat =
        store_image(state, Purpose::Certifikat, siswa.certifikat.as_ref(), stored).await?;

    let row = state
        .repo
        .insert(NewSiswa {
            nis: siswa.nis,
            nama: siswa.nama,
            rombel: siswa.rombel,
            rayon: siswa.rayon,
            password_hash,
            medsos: siswa.medsos,
            portofolio,
            certifikat,
        })
        .await?;
    log::info!("created siswa {} (nis {})", row.id, row.nis);
    Ok(row)
}

async fn store_image(
    state: &AppState,
    purpose: Purpose,
    image: Option<&ValidImage>,
    stored: &mut Vec<String>,
) -> Result<Option<String>, Error> {
    let Some(image) = image else {
        return Ok(None);
    };
    let path = state
        .files
        .store(purpose, &image.bytes, image.extension)
        .await?;
    stored.push(path.clone());
    Ok(Some(path))
}

async fn discard(state: &AppState, stored: &[String]) {
    for path in stored {
        if let Err(err) = state.files.delete(path).await {
            log::warn!("could not remove orphaned upload {}: {:#}", path, err);
        }
    }
}

/// Files go first, then the row. A crash in between leaves a row pointing at missing
/// files; the URLs then 404 but the row itself still deletes cleanly.
async fn remove(state: &AppState, id: &str) -> Result<(), Error> {
    let siswa = find(state, id).await?;

    for path in siswa.stored_files() {
        if state.files.exists(path).await? {
            state.files.delete(path).await?;
        }
    }

    if !state.repo.delete(siswa.id).await? {
        return Err(Error::not_found());
    }
    log::info!("deleted siswa {} (nis {})", siswa.id, siswa.nis);
    Ok(())
}
