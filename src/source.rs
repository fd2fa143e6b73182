//! The mission binding contract and the URL assembly every IBE mission shares.
//!
//! A data source is built once per mission product and never mutated, so a
//! single instance can back any number of concurrent searches.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use chrono::{NaiveDate, NaiveDateTime};
use url::form_urlencoded;

use crate::config::MissionSettings;
use crate::coords::WorldPt;
use crate::error::IbeError;
use crate::info::InfoMap;
use crate::params::{IbeDataParam, IbeQueryParam};

pub const DEFAULT_IBE_HOST: &str = "https://irsa.ipac.caltech.edu/ibe";

pub const USER_TARGET_WORLD_PT: &str = "UserTargetWorldPt";
pub const HOST: &str = "host";
pub const DS_KEY: &str = "ds";
pub const PRODUCT_LEVEL: &str = "ProductLevel";
pub const INTERSECT: &str = "intersect";
pub const MCENTER: &str = "mcenter";
pub const SIZE: &str = "size";
pub const COLUMNS: &str = "columns";
pub const BAND: &str = "band";
pub const CONSTRAINTS: &str = "constraints";
pub const TIME_START: &str = "timeStart";
pub const TIME_END: &str = "timeEnd";

pub const CENTER_LON_KEYS: [&str; 3] = ["ra_obj", "in_ra", "crval1"];
pub const CENTER_LAT_KEYS: [&str; 3] = ["dec_obj", "in_dec", "crval2"];
pub const CUTOUT_SIZE_KEY: &str = "subsize";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBinding {
    pub ibe_host: String,
    pub mission: String,
    pub dataset: String,
    pub table_name: String,
    pub filesystem_root: Option<Utf8PathBuf>,
}

impl SourceBinding {
    pub fn new(ibe_host: &str, mission: &str, dataset: &str, table_name: &str) -> Self {
        Self {
            ibe_host: ibe_host.trim_end_matches('/').to_string(),
            mission: mission.to_string(),
            dataset: dataset.to_string(),
            table_name: table_name.to_string(),
            filesystem_root: None,
        }
    }

    /// Host from the request, then from settings, then `default_host`.
    pub fn resolve(
        settings: &MissionSettings,
        info: &InfoMap,
        default_host: &str,
        mission: &str,
        dataset: &str,
        table_name: &str,
    ) -> Self {
        let host = info
            .get(HOST)
            .or(settings.host.as_deref())
            .unwrap_or(default_host);
        let mut binding = Self::new(host, mission, dataset, table_name);
        binding.filesystem_root = settings.filesystem_basedir.clone();
        binding
    }

    pub fn use_file_system(&self) -> bool {
        self.filesystem_root.is_some()
    }

    pub fn base_filesystem_path(&self) -> Option<&Utf8Path> {
        self.filesystem_root.as_deref()
    }
}

pub trait IbeDataSource: Send + Sync {
    fn binding(&self) -> &SourceBinding;

    /// Maps one result-table row to the file it describes.
    fn make_data_param(&self, path_info: &InfoMap) -> Result<IbeDataParam, IbeError>;

    /// Maps request fields to a search.
    fn make_query_param(&self, query_info: &InfoMap) -> Result<IbeQueryParam, IbeError>;

    fn search_url(&self) -> String {
        let binding = self.binding();
        format!(
            "{}/search/{}/{}/{}",
            binding.ibe_host, binding.mission, binding.dataset, binding.table_name
        )
    }

    fn query_url(&self, param: &IbeQueryParam) -> String {
        let query = convert_to_url(param);
        if query.is_empty() {
            self.search_url()
        } else {
            format!("{}?{}", self.search_url(), query)
        }
    }

    fn metadata_url(&self) -> String {
        format!("{}?FORMAT=METADATA", self.search_url())
    }

    fn data_url(&self, param: &IbeDataParam) -> Result<String, IbeError> {
        let binding = self.binding();
        let file_path = archive_relative_path(param)?;
        let url = format!(
            "{}/data/{}/{}/{}/{}",
            binding.ibe_host, binding.mission, binding.dataset, binding.table_name, file_path
        );
        Ok(append_cutout(url, param))
    }

    fn use_file_system(&self) -> bool {
        self.binding().use_file_system()
    }

    /// Where the file would sit on a locally mounted archive. `None` when
    /// the file path is missing or climbs out of the archive root.
    fn local_path(&self, param: &IbeDataParam) -> Option<Utf8PathBuf> {
        let root = self.binding().base_filesystem_path()?;
        let file_path = archive_relative_path(param).ok()?;
        Some(root.join(file_path))
    }
}

/// The data file path relative to the archive root. Paths with `..`
/// segments are rejected.
pub fn archive_relative_path(param: &IbeDataParam) -> Result<&str, IbeError> {
    let file_path = param.file_path().ok_or(IbeError::MissingFilePath)?;
    let relative = file_path.trim_start_matches('/');
    if Utf8Path::new(relative)
        .components()
        .any(|component| matches!(component, Utf8Component::ParentDir))
    {
        return Err(IbeError::invalid("filePath", file_path));
    }
    Ok(relative)
}

/// Query string for a search. Only `where` is form-encoded; the service
/// expects every other value raw.
pub fn convert_to_url(param: &IbeQueryParam) -> String {
    param
        .query_pairs()
        .into_iter()
        .map(|(name, value)| {
            if value.is_empty() {
                name.to_string()
            } else if name == "where" {
                let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
                format!("{name}={encoded}")
            } else {
                format!("{name}={value}")
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

pub fn append_cutout(url: String, param: &IbeDataParam) -> String {
    match param.cutout() {
        Some(cutout) => format!(
            "{url}?center={}&size={}&gzip={}",
            cutout.center,
            cutout.size,
            param.do_zip()
        ),
        None => url,
    }
}

/// Sets a cutout only when center lon, center lat and size are all present.
pub fn apply_cutout(path_info: &InfoMap, param: &mut IbeDataParam) {
    let lon = path_info.first_of(&CENTER_LON_KEYS);
    let lat = path_info.first_of(&CENTER_LAT_KEYS);
    let size = path_info.get(CUTOUT_SIZE_KEY);
    match (lon, lat, size) {
        (Some(lon), Some(lat), Some(size)) => param.set_cutout(&format!("{lon},{lat}"), size),
        _ => param.clear_cutout(),
    }
}

/// Position, intersect, mcen, size and columns, common to all missions.
pub fn base_query_param(query_info: &InfoMap) -> Result<IbeQueryParam, IbeError> {
    let mut param = IbeQueryParam::new();
    if let Some(target) = query_info.get(USER_TARGET_WORLD_PT) {
        let pt: WorldPt = target.parse()?;
        let pt = pt.to_j2000();
        param.set_pos(pt.lon, pt.lat);
    }
    if let Some(intersect) = query_info.get(INTERSECT) {
        param.set_intersect(Some(intersect.parse()?));
    }
    param.set_mcen(query_info.is_true(MCENTER));
    if let Some(size) = query_info.get(SIZE) {
        param.set_size(size);
    }
    if let Some(columns) = query_info.get(COLUMNS) {
        param.set_columns(columns);
    }
    Ok(param)
}

/// Collects `where` fragments and joins them with ` AND `.
#[derive(Debug, Default)]
pub struct Constraints {
    parts: Vec<String>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: String) {
        if !fragment.trim().is_empty() {
            self.parts.push(fragment);
        }
    }

    /// Caller-supplied fragments go last.
    pub fn finish(mut self, query_info: &InfoMap) -> Option<String> {
        if let Some(extra) = query_info.get(CONSTRAINTS) {
            self.parts.push(extra.to_string());
        }
        (!self.parts.is_empty()).then(|| self.parts.join(" AND "))
    }

    pub fn apply(self, query_info: &InfoMap, param: &mut IbeQueryParam) {
        if let Some(where_clause) = self.finish(query_info) {
            param.set_where(&where_clause);
        }
    }
}

/// Band values starting with `A` mean "all bands": no filter.
pub fn is_all_bands(value: &str) -> bool {
    value.trim_start().starts_with(['A', 'a'])
}

pub fn split_list(value: &str) -> Vec<&str> {
    value
        .split([',', ' '])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// `col=v` for one value, `col IN (a,b)` for several.
pub fn in_clause(column: &str, values: &[String]) -> String {
    match values {
        [single] => format!("{column}={single}"),
        _ => format!("{column} IN ({})", values.join(",")),
    }
}

pub fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Integer list for an `IN` clause; rejects anything that is not a number.
pub fn int_list(field: &str, value: &str) -> Result<Vec<String>, IbeError> {
    split_list(value)
        .into_iter()
        .map(|item| {
            item.parse::<i64>()
                .map(|number| number.to_string())
                .map_err(|_| IbeError::invalid(field, value))
        })
        .collect()
}

/// Modified Julian Date of an ISO date or date-time.
pub fn mjd_from_date(value: &str) -> Result<f64, IbeError> {
    let trimmed = value.trim();
    let datetime = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(|date| date.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|_| IbeError::invalid("date", value))?;
    let epoch = NaiveDate::from_ymd_opt(1858, 11, 17)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| IbeError::invalid("date", value))?;
    Ok((datetime - epoch).num_milliseconds() as f64 / 86_400_000.0)
}

/// `column >= start AND column <= end` from `timeStart`/`timeEnd`.
pub fn push_time_range(
    query_info: &InfoMap,
    column: &str,
    to_column_value: fn(f64) -> f64,
    constraints: &mut Constraints,
) -> Result<(), IbeError> {
    if let Some(start) = query_info.get(TIME_START) {
        let value = to_column_value(mjd_from_date(start)?);
        constraints.push(format!("{column}>={value}"));
    }
    if let Some(end) = query_info.get(TIME_END) {
        let value = to_column_value(mjd_from_date(end)?);
        constraints.push(format!("{column}<={value}"));
    }
    Ok(())
}
