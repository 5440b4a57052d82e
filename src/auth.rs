use axum::extract::State;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;

use crate::err::{Data, Error};
use crate::input::RawInput;
use crate::models::SiswaPublic;
use crate::validate::validate_login;
use crate::{proceeds, AppState, Payload};

const LOGGED_IN: &str = "Login berhasil";
const LOGIN_FAILED: &str = "Gagal melakukan login";

pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Pbkdf2.hash_password(password.as_bytes(), &salt)?.to_string())
}

/// `Ok(false)` on a mismatch; `Err` only when the stored hash itself is unreadable.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, Error> {
    let hash = PasswordHash::new(stored)?;
    Ok(Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok())
}

/// Like `verify_password`, but with no stored hash it still derives one from `password`,
/// so an unknown nis costs the same pbkdf2 work as a wrong password.
fn verify_or_burn(password: &str, stored: Option<&str>) -> Result<bool, Error> {
    match stored {
        Some(stored) => verify_password(password, stored),
        None => {
            hash_password(password)?;
            Ok(false)
        }
    }
}

/// Checks a nis/password pair. Unknown nis and wrong password are indistinguishable to
/// the caller. Nothing is issued on success; the caller just gets the student back.
pub async fn login(
    State(state): State<AppState>,
    input: RawInput,
) -> Payload<Data<SiswaPublic>> {
    authenticate(&state, input)
        .await
        .map_err(Error::failed(LOGIN_FAILED))
}

async fn authenticate(state: &AppState, input: RawInput) -> Payload<Data<SiswaPublic>> {
    let login = validate_login(&input).map_err(Error::validation)?;

    let siswa = state.repo.find_by_nis(&login.nis).await?;
    let stored = siswa.as_ref().map(|siswa| siswa.password.as_str());
    let verified = verify_or_burn(&login.password, stored)?;

    match siswa {
        Some(siswa) if verified => proceeds(
            LOGGED_IN,
            Data {
                data: SiswaPublic::project(siswa, state.files.as_ref()),
            },
        ),
        _ => Err(Error::InvalidCredentials),
    }
}
