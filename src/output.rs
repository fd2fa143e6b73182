use std::io::{self, Write};

use serde::Serialize;
use tracing::{debug, info};

use crate::download::{FileInfo, ProgressEvent, ProgressSink};
use crate::error::IbeError;
use crate::info::InfoMap;
use crate::params::{IbeDataParam, IbeQueryParam};
use crate::source::IbeDataSource;

/// Every URL a data source builds for one request.
#[derive(Debug, Clone, Serialize)]
pub struct UrlReport {
    pub mission: String,
    pub dataset: String,
    pub table: String,
    pub search_url: String,
    pub metadata_url: String,
    pub query_url: Option<String>,
    pub data_url: Option<String>,
}

impl UrlReport {
    pub fn build(
        source: &dyn IbeDataSource,
        query: Option<&IbeQueryParam>,
        data: Option<&IbeDataParam>,
    ) -> Result<Self, IbeError> {
        let binding = source.binding();
        Ok(Self {
            mission: binding.mission.clone(),
            dataset: binding.dataset.clone(),
            table: binding.table_name.clone(),
            search_url: source.search_url(),
            metadata_url: source.metadata_url(),
            query_url: query
                .filter(|param| param.is_searchable())
                .map(|param| source.query_url(param)),
            data_url: data.map(|param| source.data_url(param)).transpose()?,
        })
    }

    /// Builds the search and data params from one set of request fields.
    /// The data URL is left out only when the fields carry no file row; a
    /// row that is present but malformed is an error.
    pub fn from_info(source: &dyn IbeDataSource, info: &InfoMap) -> Result<Self, IbeError> {
        let query = source.make_query_param(info)?;
        let data = match source.make_data_param(info) {
            Ok(param) => Some(param),
            Err(IbeError::MissingField(field)) => {
                debug!(%field, "no file row in request, skipping data url");
                None
            }
            Err(err) => return Err(err),
        };
        Self::build(source, Some(&query), data.as_ref())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: String,
    pub status: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    #[serde(flatten)]
    pub file: FileInfo,
    pub metadata_path: Option<String>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_urls(report: &UrlReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_file(file: &FileInfo) -> io::Result<()> {
        Self::print_json(file)
    }

    pub fn print_batch(report: &BatchReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_fetch(report: &FetchReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Forwards progress to the log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissionSettings;
    use crate::missions::twomass::{TwoMassIbeDataSource, TwoMassProduct};

    #[test]
    fn report_skips_unsearchable_query() {
        let source = TwoMassIbeDataSource::new(&MissionSettings::default(), TwoMassProduct::Cal);
        let report = UrlReport::build(&source, Some(&IbeQueryParam::new()), None).unwrap();
        assert_eq!(report.query_url, None);
        assert_eq!(report.data_url, None);
        assert_eq!(
            report.metadata_url,
            "https://irsa.ipac.caltech.edu/ibe/search/twomass/calibration/calibration?FORMAT=METADATA"
        );
    }

    #[test]
    fn report_from_info_without_row() {
        let source = TwoMassIbeDataSource::new(&MissionSettings::default(), TwoMassProduct::Asky);
        let info = InfoMap::new().with("UserTargetWorldPt", "10.5;-3.25;EQ_J2000");
        let report = UrlReport::from_info(&source, &info).unwrap();
        assert_eq!(report.data_url, None);
        assert_eq!(
            report.query_url.as_deref(),
            Some("https://irsa.ipac.caltech.edu/ibe/search/twomass/allsky/allsky?POS=10.5,-3.25")
        );
    }

    #[test]
    fn report_from_info_rejects_bad_row() {
        let source = TwoMassIbeDataSource::new(&MissionSettings::default(), TwoMassProduct::Asky);
        let row = InfoMap::new()
            .with("ordate", "980623")
            .with("hemisphere", "x")
            .with("scanno", "76")
            .with("fname", "hi0760126.fits.gz");
        let err = UrlReport::from_info(&source, &row).unwrap_err();
        assert!(matches!(err, IbeError::InvalidField { ref field, .. } if field == "hemisphere"));

        let row = row.with("hemisphere", "n");
        let report = UrlReport::from_info(&source, &row).unwrap();
        assert_eq!(
            report.data_url.as_deref(),
            Some("https://irsa.ipac.caltech.edu/ibe/data/twomass/allsky/allsky/980623n/s076/image/hi0760126.fits.gz")
        );
    }

    #[test]
    fn report_surfaces_missing_file_path() {
        let source = TwoMassIbeDataSource::new(&MissionSettings::default(), TwoMassProduct::Asky);
        let err = UrlReport::build(&source, None, Some(&IbeDataParam::new())).unwrap_err();
        assert!(matches!(err, IbeError::MissingFilePath));
    }
}
