//! Inline attachments: files travel inside tender and quote records as base64
//! payloads, the same shape a browser `FileReader.readAsDataURL` produces once the
//! `data:<mime>;base64,` prefix is removed.

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    /// Base64 payload without any data-URI prefix.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("no attachment found")]
    MissingAttachment,
    #[error("attachment `{name}` does not hold valid base64 content: {source}")]
    InvalidEncoding {
        name: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("attachment name `{0}` cannot be used as a file name")]
    InvalidName(String),
    #[error("attachment I/O failed for `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// Raw bytes recovered from an [`Attachment`], still tagged with its MIME type and name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedAttachment {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn from_bytes(name: impl Into<String>, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            content: STANDARD.encode(bytes),
            size: Some(bytes.len() as u64),
        }
    }

    /// Accepts either a bare base64 payload or a full `data:` URI. When the URI
    /// carries a MIME type it wins over `fallback_mime_type`.
    pub fn from_data_uri(
        name: impl Into<String>,
        fallback_mime_type: &str,
        data_uri: &str,
    ) -> Result<Self, AttachmentError> {
        let name = name.into();
        let mime_type = data_uri_mime_type(data_uri).unwrap_or(fallback_mime_type).to_owned();
        let content = strip_data_uri(data_uri).trim().to_owned();
        let size = STANDARD
            .decode(&content)
            .map_err(|source| AttachmentError::InvalidEncoding { name: name.clone(), source })?
            .len() as u64;

        Ok(Self { name, mime_type, content, size: Some(size) })
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case(PDF_MIME_TYPE)
    }

    pub fn decode(&self) -> Result<DecodedAttachment, AttachmentError> {
        let bytes = STANDARD
            .decode(self.content.trim())
            .map_err(|source| AttachmentError::InvalidEncoding { name: self.name.clone(), source })?;

        Ok(DecodedAttachment {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            bytes,
        })
    }
}

impl DecodedAttachment {
    /// Materializes the bytes as `<dir>/<name>`. The payload is written to a hidden
    /// partial file first and renamed into place; the partial file never outlives
    /// this call.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, AttachmentError> {
        let file_name = Path::new(&self.name)
            .file_name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AttachmentError::InvalidName(self.name.clone()))?;

        let target = dir.join(file_name);
        let partial = dir.join(format!(".{}.part", file_name.to_string_lossy()));

        let written = fs::write(&partial, &self.bytes).and_then(|()| fs::rename(&partial, &target));
        if let Err(source) = written {
            let _ = fs::remove_file(&partial);
            return Err(AttachmentError::Io { path: target, source });
        }

        Ok(target)
    }
}

/// Reads a file from disk into an inline attachment.
pub fn encode_file(path: &Path, mime_type: Option<&str>) -> Result<Attachment, AttachmentError> {
    let bytes = fs::read(path)
        .map_err(|source| AttachmentError::Io { path: path.to_path_buf(), source })?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| AttachmentError::InvalidName(path.display().to_string()))?;
    let mime_type = mime_type.map(str::to_owned).unwrap_or_else(|| guess_mime_type(path));

    Ok(Attachment::from_bytes(name, mime_type, &bytes))
}

/// Decodes the stored attachment of a record, if it has one.
pub fn download(attachment: Option<&Attachment>) -> Result<DecodedAttachment, AttachmentError> {
    attachment.ok_or(AttachmentError::MissingAttachment)?.decode()
}

pub fn strip_data_uri(raw: &str) -> &str {
    match raw.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, payload)| payload).unwrap_or(rest),
        None => raw,
    }
}

fn data_uri_mime_type(raw: &str) -> Option<&str> {
    let header = raw.strip_prefix("data:")?.split_once(',')?.0;
    let mime = header.split(';').next()?.trim();
    (!mime.is_empty()).then_some(mime)
}

/// Guesses from the file extension; unknown extensions map to `application/octet-stream`.
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().essence_str().to_owned()
}
