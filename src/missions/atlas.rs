//! IRSA image atlas collections (Spitzer SEIP/SAGE, MSX, AKARI, ...).
//!
//! The atlas service speaks a different URL dialect from the per-mission IBE
//! endpoints: the table is a `schema.table` query parameter and data paths
//! are relative to the archive root.

use crate::config::MissionSettings;
use crate::error::IbeError;
use crate::info::InfoMap;
use crate::params::{IbeDataParam, IbeQueryParam};
use crate::source::{
    self, BAND, Constraints, DS_KEY, IbeDataSource, SourceBinding, append_cutout, convert_to_url,
};

pub const ATLAS_HOST: &str = "https://irsa.ipac.caltech.edu";

pub const MISSION_KEY: &str = "mission";
pub const SCHEMA_KEY: &str = "schema";
pub const TABLE_KEY: &str = "table";
pub const INSTRUMENT: &str = "instrument";
pub const FNAME: &str = "fname";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtlasProduct {
    Seip,
    Sage,
    Msx,
    Akari,
}

impl AtlasProduct {
    pub const ALL: [AtlasProduct; 4] = [
        AtlasProduct::Seip,
        AtlasProduct::Sage,
        AtlasProduct::Msx,
        AtlasProduct::Akari,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            AtlasProduct::Seip => "SEIP",
            AtlasProduct::Sage => "SAGE",
            AtlasProduct::Msx => "MSX",
            AtlasProduct::Akari => "AKARI",
        }
    }

    pub fn schema(&self) -> &'static str {
        match self {
            AtlasProduct::Seip | AtlasProduct::Sage => "spitzer",
            AtlasProduct::Msx => "msx",
            AtlasProduct::Akari => "akari",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            AtlasProduct::Seip => "seip_science",
            AtlasProduct::Sage => "sage_images",
            AtlasProduct::Msx => "msx_images",
            AtlasProduct::Akari => "akari_images",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|product| product.key().eq_ignore_ascii_case(key))
    }
}

#[derive(Debug, Clone)]
pub struct AtlasIbeDataSource {
    binding: SourceBinding,
}

impl AtlasIbeDataSource {
    pub fn new(settings: &MissionSettings, product: AtlasProduct) -> Self {
        Self::bind(settings, &InfoMap::new(), product.schema(), product.table())
    }

    /// A known `ds` wins; otherwise `schema` and `table` must both be given.
    pub fn from_source_info(settings: &MissionSettings, info: &InfoMap) -> Result<Self, IbeError> {
        if let Some(product) = info.get(DS_KEY).and_then(AtlasProduct::from_key) {
            return Ok(Self::bind(settings, info, product.schema(), product.table()));
        }
        match (info.get(SCHEMA_KEY), info.get(TABLE_KEY)) {
            (Some(schema), Some(table)) => Ok(Self::bind(settings, info, schema, table)),
            _ => match info.get(DS_KEY) {
                Some(key) => Err(IbeError::unknown_product("atlas", key)),
                None => Err(IbeError::MissingField(format!("{DS_KEY}|{SCHEMA_KEY}+{TABLE_KEY}"))),
            },
        }
    }

    fn bind(settings: &MissionSettings, info: &InfoMap, dataset: &str, table: &str) -> Self {
        let mission = info.get(MISSION_KEY).unwrap_or(dataset);
        let binding = SourceBinding::resolve(settings, info, ATLAS_HOST, mission, dataset, table);
        Self { binding }
    }
}

impl IbeDataSource for AtlasIbeDataSource {
    fn binding(&self) -> &SourceBinding {
        &self.binding
    }

    fn make_data_param(&self, path_info: &InfoMap) -> Result<IbeDataParam, IbeError> {
        let fname = path_info.require(FNAME)?;
        let mut param = IbeDataParam::with_file_path(fname.trim_start_matches('/'));
        param.set_do_zip(fname.ends_with(".gz"));
        source::apply_cutout(path_info, &mut param);
        Ok(param)
    }

    fn make_query_param(&self, query_info: &InfoMap) -> Result<IbeQueryParam, IbeError> {
        let mut param = source::base_query_param(query_info)?;

        let mut constraints = Constraints::new();
        if let Some(band) = query_info.get(BAND).filter(|value| !source::is_all_bands(value)) {
            constraints.push(format!("band_name={}", source::sql_quote(band)));
        }
        if let Some(instrument) = query_info.get(INSTRUMENT) {
            constraints.push(format!("{INSTRUMENT}={}", source::sql_quote(instrument)));
        }
        constraints.apply(query_info, &mut param);
        Ok(param)
    }

    fn search_url(&self) -> String {
        let binding = self.binding();
        format!(
            "{}/IBE?table={}.{}",
            binding.ibe_host, binding.dataset, binding.table_name
        )
    }

    fn query_url(&self, param: &IbeQueryParam) -> String {
        let query = convert_to_url(param);
        if query.is_empty() {
            self.search_url()
        } else {
            format!("{}&{}", self.search_url(), query)
        }
    }

    fn metadata_url(&self) -> String {
        format!("{}&FORMAT=METADATA", self.search_url())
    }

    fn data_url(&self, param: &IbeDataParam) -> Result<String, IbeError> {
        let file_path = source::archive_relative_path(param)?;
        let url = format!("{}/data/{}", self.binding().ibe_host, file_path);
        Ok(append_cutout(url, param))
    }
}
