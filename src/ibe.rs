//! Search, metadata and file retrieval against one mission data source.

use camino::Utf8Path;
use tracing::{debug, info};

use crate::download::{
    Destination, Downloader, FileInfo, FileOrigin, ProgressEvent, ProgressSink, RequestContext,
};
use crate::error::IbeError;
use crate::params::{IbeDataParam, IbeQueryParam};
use crate::source::IbeDataSource;
use crate::upload::IbeFileUploader;

/// Name of the multipart field carrying the position table.
pub const POS_FILE_FIELD: &str = "POS";

pub struct Ibe<D: Downloader> {
    source: Box<dyn IbeDataSource>,
    downloader: D,
    uploader: Option<Box<dyn IbeFileUploader>>,
}

impl<D: Downloader> Ibe<D> {
    pub fn new(source: Box<dyn IbeDataSource>, downloader: D) -> Self {
        Self {
            source,
            downloader,
            uploader: None,
        }
    }

    pub fn with_uploader(mut self, uploader: Box<dyn IbeFileUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn source(&self) -> &dyn IbeDataSource {
        self.source.as_ref()
    }

    pub fn downloader(&self) -> &D {
        &self.downloader
    }

    /// Column descriptions of the bound table, written to `results`.
    pub fn get_metadata(
        &self,
        results: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<FileInfo, IbeError> {
        let url = self.source.metadata_url();
        debug!(%url, "metadata url");
        self.downloader
            .download(&url, &RequestContext::new(), Destination::File(results), sink)
    }

    pub fn query(
        &self,
        results: &Utf8Path,
        param: &IbeQueryParam,
        sink: &dyn ProgressSink,
    ) -> Result<FileInfo, IbeError> {
        if !param.is_searchable() {
            return Err(IbeError::InvalidQuery);
        }
        let url = self.source.query_url(param);
        debug!(%url, "query url");
        self.downloader
            .download(&url, &RequestContext::new(), Destination::File(results), sink)
    }

    /// One search for every position in `pos_file`. The positions travel as
    /// an uploaded table, so any `POS` in `param` is dropped.
    pub fn multiple_queries(
        &self,
        results: &Utf8Path,
        pos_file: &Utf8Path,
        param: &IbeQueryParam,
    ) -> Result<u16, IbeError> {
        let uploader = self.uploader.as_ref().ok_or(IbeError::UploaderUnavailable)?;
        let fields: Vec<_> = param
            .query_pairs()
            .into_iter()
            .filter(|(name, _)| *name != "POS")
            .collect();
        let url = self.source.search_url();
        debug!(%url, %pos_file, fields = fields.len(), "multi-position search");
        uploader.post(results, POS_FILE_FIELD, pos_file, &url, &fields)
    }

    /// The file for `param`: straight from the mounted archive when it is
    /// there and no cutout is asked for, otherwise downloaded into `dir`.
    pub fn get_data(
        &self,
        param: &IbeDataParam,
        request: &RequestContext,
        dir: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<FileInfo, IbeError> {
        if !param.do_cutout() && self.source.use_file_system() {
            if let Some(path) = self.source.local_path(param) {
                if path.as_std_path().is_file() {
                    info!(%path, "serving from local archive");
                    sink.event(ProgressEvent {
                        message: format!("phase=Local; {path}"),
                        elapsed: None,
                    });
                    return Ok(FileInfo {
                        suggested_name: param.file_name().map(str::to_string),
                        path,
                        response_code: 200,
                        origin: FileOrigin::Local,
                    });
                }
                debug!(%path, "not in local archive, downloading");
            }
        }

        let url = self.source.data_url(param)?;
        debug!(%url, "data url");
        self.downloader
            .download(&url, request, Destination::Dir(dir), sink)
    }
}
