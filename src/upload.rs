use camino::Utf8Path;
use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use tracing::info;

use crate::config::ResolvedConfig;
use crate::download::{handle_status, http_client};
use crate::error::IbeError;
use crate::store::Store;

/// Posts a file plus form fields as one multipart request and stores the
/// response body.
pub trait IbeFileUploader: Send + Sync {
    fn post(
        &self,
        results: &Utf8Path,
        file_field: &str,
        file: &Utf8Path,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<u16, IbeError>;
}

#[derive(Clone)]
pub struct HttpFileUploader {
    client: Client,
}

impl HttpFileUploader {
    pub fn new(config: &ResolvedConfig) -> Result<Self, IbeError> {
        Ok(Self {
            client: http_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn form(
        file_field: &str,
        file: &Utf8Path,
        params: &[(&'static str, String)],
    ) -> Result<Form, IbeError> {
        // streamed from disk when the request body is written
        let part = Part::file(file.as_std_path())
            .map_err(|err| IbeError::Filesystem(format!("read {file}: {err}")))?;

        let form = params
            .iter()
            .fold(Form::new(), |form, (name, value)| form.text(*name, value.clone()));
        Ok(form.part(file_field.to_string(), part))
    }
}

impl IbeFileUploader for HttpFileUploader {
    fn post(
        &self,
        results: &Utf8Path,
        file_field: &str,
        file: &Utf8Path,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<u16, IbeError> {
        let form = Self::form(file_field, file, params)?;
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .map_err(|source| IbeError::Transport {
                url: url.to_string(),
                source,
            })?;
        let mut response = handle_status(response)?;
        let status = response.status().as_u16();
        let written = Store::write_stream_atomic(results, &mut response, |source| IbeError::Body {
            url: url.to_string(),
            source,
        })?;
        info!(%url, %results, bytes = written, "multi-position search stored");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn missing_position_table_is_a_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let err = HttpFileUploader::form("POS", &root.join("absent.tbl"), &[]).unwrap_err();
        assert_matches!(err, IbeError::Filesystem(message) if message.contains("absent.tbl"));
    }
}
