//! Request validation. Each validator is a pure function of the raw input and either
//! yields typed, normalised values or the complete set of field errors.

use bytes::Bytes;
use image::ImageFormat;

use crate::err::FieldErrors;
use crate::input::{Presented, RawInput};

pub const MAX_STRING_CHARS: usize = 255;
pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MIN_KEYWORD_CHARS: usize = 2;
pub const MAX_IMAGE_KILOBYTES: usize = 5120;
pub const IMAGE_TYPES: &str = "jpeg, png, jpg, webp, gif";

/// Fields whose values are taken verbatim instead of trimmed.
const UNTRIMMED: &[&str] = &["password"];

pub fn taken(attribute: &str) -> String {
    format!("The {} has already been taken.", attribute)
}

#[derive(Debug, Clone)]
pub struct ValidImage {
    pub bytes: Bytes,
    pub extension: &'static str,
}

#[derive(Debug, Clone)]
pub struct ValidSiswa {
    pub nis: String,
    pub nama: String,
    pub rombel: String,
    pub rayon: String,
    pub password: String,
    pub medsos: Option<String>,
    pub portofolio: Option<ValidImage>,
    pub certifikat: Option<ValidImage>,
}

#[derive(Debug, Clone)]
pub struct ValidLogin {
    pub nis: String,
    pub password: String,
}

enum Sniffed {
    Accepted(&'static str),
    OtherImage,
    NotImage,
}

fn sniff(bytes: &[u8]) -> Sniffed {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => Sniffed::Accepted("jpg"),
        Ok(ImageFormat::Png) => Sniffed::Accepted("png"),
        Ok(ImageFormat::WebP) => Sniffed::Accepted("webp"),
        Ok(ImageFormat::Gif) => Sniffed::Accepted("gif"),
        Ok(ImageFormat::Bmp) => Sniffed::OtherImage,
        _ => Sniffed::NotImage,
    }
}

struct Checker<'a> {
    input: &'a RawInput,
    errors: FieldErrors,
}

impl<'a> Checker<'a> {
    fn new(input: &'a RawInput) -> Self {
        Self {
            input,
            errors: FieldErrors::new(),
        }
    }

    fn fail(&mut self, field: &str, message: String) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message);
    }

    /// `required|string`
    fn required_string(&mut self, field: &str) -> Option<String> {
        match self.input.presented(field, !UNTRIMMED.contains(&field)) {
            Presented::Text(value) if !value.trim().is_empty() => Some(value),
            Presented::Missing | Presented::Text(_) => {
                self.fail(field, format!("The {} field is required.", field));
                None
            }
            Presented::Other => {
                self.fail(field, format!("The {} must be a string.", field));
                None
            }
        }
    }

    /// `nullable|string`
    fn nullable_string(&mut self, field: &str) -> Option<String> {
        match self.input.presented(field, true) {
            Presented::Text(value) if !value.is_empty() => Some(value),
            Presented::Missing | Presented::Text(_) => None,
            Presented::Other => {
                self.fail(field, format!("The {} must be a string.", field));
                None
            }
        }
    }

    fn max_chars(&mut self, field: &str, value: Option<String>, max: usize) -> Option<String> {
        match value {
            Some(value) if value.chars().count() > max => {
                self.fail(
                    field,
                    format!("The {} must not be greater than {} characters.", field, max),
                );
                None
            }
            value => value,
        }
    }

    fn min_chars(&mut self, field: &str, value: Option<String>, min: usize) -> Option<String> {
        match value {
            Some(value) if value.chars().count() < min => {
                self.fail(
                    field,
                    format!("The {} must be at least {} characters.", field, min),
                );
                None
            }
            value => value,
        }
    }

    /// `sometimes|nullable|image|mimes:jpeg,png,jpg,webp,gif|max:5120`
    fn image(&mut self, field: &str) -> Option<ValidImage> {
        let input = self.input;
        let Some(upload) = input.file(field) else {
            return match input.presented(field, true) {
                Presented::Missing => None,
                Presented::Text(value) if value.is_empty() => None,
                _ => {
                    self.fail(field, format!("The {} must be an image.", field));
                    self.fail(
                        field,
                        format!("The {} must be a file of type: {}.", field, IMAGE_TYPES),
                    );
                    None
                }
            };
        };

        let extension = match sniff(&upload.bytes) {
            Sniffed::Accepted(extension) => Some(extension),
            Sniffed::OtherImage => {
                self.fail(
                    field,
                    format!("The {} must be a file of type: {}.", field, IMAGE_TYPES),
                );
                None
            }
            Sniffed::NotImage => {
                self.fail(field, format!("The {} must be an image.", field));
                self.fail(
                    field,
                    format!("The {} must be a file of type: {}.", field, IMAGE_TYPES),
                );
                None
            }
        };

        if upload.bytes.len() > MAX_IMAGE_KILOBYTES * 1024 {
            self.fail(
                field,
                format!(
                    "The {} must not be greater than {} kilobytes.",
                    field, MAX_IMAGE_KILOBYTES
                ),
            );
            return None;
        }

        extension.map(|extension| ValidImage {
            bytes: upload.bytes.clone(),
            extension,
        })
    }
}

/// Everything a create needs except the uniqueness of `nis`, which only the store knows.
pub fn validate_siswa(input: &RawInput) -> Result<ValidSiswa, FieldErrors> {
    let mut check = Checker::new(input);

    let nis = check.required_string("nis");
    let nis = check.max_chars("nis", nis, MAX_STRING_CHARS);
    let nama = check.required_string("nama");
    let nama = check.max_chars("nama", nama, MAX_STRING_CHARS);
    let rombel = check.required_string("rombel");
    let rombel = check.max_chars("rombel", rombel, MAX_STRING_CHARS);
    let rayon = check.required_string("rayon");
    let rayon = check.max_chars("rayon", rayon, MAX_STRING_CHARS);
    let password = check.required_string("password");
    let password = check.min_chars("password", password, MIN_PASSWORD_CHARS);
    let medsos = check.nullable_string("medsos");
    let medsos = check.max_chars("medsos", medsos, MAX_STRING_CHARS);
    let portofolio = check.image("portofolio");
    let certifikat = check.image("certifikat");

    if !check.errors.is_empty() {
        return Err(check.errors);
    }

    match (nis, nama, rombel, rayon, password) {
        (Some(nis), Some(nama), Some(rombel), Some(rayon), Some(password)) => Ok(ValidSiswa {
            nis,
            nama,
            rombel,
            rayon,
            password,
            medsos,
            portofolio,
            certifikat,
        }),
        _ => Err(check.errors),
    }
}

pub fn validate_login(input: &RawInput) -> Result<ValidLogin, FieldErrors> {
    let mut check = Checker::new(input);

    let nis = check.required_string("nis");
    let password = check.required_string("password");

    match (nis, password) {
        (Some(nis), Some(password)) if check.errors.is_empty() => Ok(ValidLogin { nis, password }),
        _ => Err(check.errors),
    }
}

pub fn validate_keyword(input: &RawInput) -> Result<String, FieldErrors> {
    let mut check = Checker::new(input);

    let keyword = check.required_string("keyword");
    let keyword = check.min_chars("keyword", keyword, MIN_KEYWORD_CHARS);

    match keyword {
        Some(keyword) if check.errors.is_empty() => Ok(keyword),
        _ => Err(check.errors),
    }
}
