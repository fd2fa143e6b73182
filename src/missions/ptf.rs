//! Palomar Transient Factory processed (level 1) and reference (level 2) images.

use crate::config::MissionSettings;
use crate::error::IbeError;
use crate::info::InfoMap;
use crate::params::{IbeDataParam, IbeQueryParam};
use crate::source::{
    self, BAND, Constraints, DEFAULT_IBE_HOST, DS_KEY, IbeDataSource, PRODUCT_LEVEL,
    SourceBinding,
};

pub const MISSION: &str = "ptf";
pub const DATASET: &str = "images";

pub const FILE_NAME_KEYS: [&str; 2] = ["pfilename", "filename"];
pub const PTF_FIELD: &str = "ptffield";
pub const CCD_ID: &str = "ccdid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtfProduct {
    Level1,
    Level2,
}

impl PtfProduct {
    pub fn table(&self) -> &'static str {
        match self {
            PtfProduct::Level1 => "level1",
            PtfProduct::Level2 => "level2",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "level1" | "l1" | "1" => Some(PtfProduct::Level1),
            "level2" | "l2" | "2" => Some(PtfProduct::Level2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PtfIbeDataSource {
    binding: SourceBinding,
    product: PtfProduct,
}

impl PtfIbeDataSource {
    pub fn new(settings: &MissionSettings, product: PtfProduct) -> Self {
        Self::bind(settings, &InfoMap::new(), product)
    }

    pub fn from_source_info(settings: &MissionSettings, info: &InfoMap) -> Result<Self, IbeError> {
        let product = match info.first_of(&[DS_KEY, PRODUCT_LEVEL]) {
            Some(key) => {
                PtfProduct::from_key(key).ok_or_else(|| IbeError::unknown_product(MISSION, key))?
            }
            None => PtfProduct::Level1,
        };
        Ok(Self::bind(settings, info, product))
    }

    fn bind(settings: &MissionSettings, info: &InfoMap, product: PtfProduct) -> Self {
        let binding = SourceBinding::resolve(
            settings,
            info,
            DEFAULT_IBE_HOST,
            MISSION,
            DATASET,
            product.table(),
        );
        Self { binding, product }
    }

    pub fn product(&self) -> PtfProduct {
        self.product
    }
}

/// PTF filter ids: g is 1, R is 2, H-alpha 656/663 are 4/5.
fn filter_id(band: &str) -> Option<u32> {
    match band {
        "g" | "G" => Some(1),
        "r" | "R" => Some(2),
        "ha656" | "HA656" => Some(4),
        "ha663" | "HA663" => Some(5),
        other => other.parse().ok(),
    }
}

impl IbeDataSource for PtfIbeDataSource {
    fn binding(&self) -> &SourceBinding {
        &self.binding
    }

    fn make_data_param(&self, path_info: &InfoMap) -> Result<IbeDataParam, IbeError> {
        let file_name = path_info.require_any(&FILE_NAME_KEYS)?;
        let mut param = IbeDataParam::with_file_path(file_name.trim_start_matches('/'));
        param.set_do_zip(file_name.ends_with(".gz"));
        source::apply_cutout(path_info, &mut param);
        Ok(param)
    }

    fn make_query_param(&self, query_info: &InfoMap) -> Result<IbeQueryParam, IbeError> {
        let mut param = source::base_query_param(query_info)?;

        let mut constraints = Constraints::new();
        if let Some(bands) = query_info.get(BAND).filter(|value| !source::is_all_bands(value)) {
            let ids = source::split_list(bands)
                .into_iter()
                .map(|band| {
                    filter_id(band)
                        .map(|id| id.to_string())
                        .ok_or_else(|| IbeError::invalid(BAND, bands))
                })
                .collect::<Result<Vec<_>, IbeError>>()?;
            constraints.push(source::in_clause("fid", &ids));
        }
        if query_info.get(PTF_FIELD).is_some() {
            constraints.push(format!("{PTF_FIELD}={}", query_info.require_u32(PTF_FIELD)?));
        }
        if let Some(ccds) = query_info.get(CCD_ID) {
            constraints.push(source::in_clause(CCD_ID, &source::int_list(CCD_ID, ccds)?));
        }
        if self.product == PtfProduct::Level1 {
            source::push_time_range(query_info, "obsmjd", |mjd| mjd, &mut constraints)?;
        }
        constraints.apply(query_info, &mut param);
        Ok(param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_selection() {
        let info = InfoMap::new().with(PRODUCT_LEVEL, "l2");
        let ptf = PtfIbeDataSource::from_source_info(&MissionSettings::default(), &info).unwrap();
        assert_eq!(ptf.binding().table_name, "level2");
        assert_eq!(
            ptf.search_url(),
            "https://irsa.ipac.caltech.edu/ibe/search/ptf/images/level2"
        );
    }

    #[test]
    fn file_name_fallback() {
        let ptf = PtfIbeDataSource::new(&MissionSettings::default(), PtfProduct::Level1);
        let row = InfoMap::new().with(
            "filename",
            "/proc/2013/05/15/f2/c4/p5/v1/PTF_201305152494_i_p_scie_t055916_u015568962_f02_p100037_c04.fits",
        );
        let param = ptf.make_data_param(&row).unwrap();
        assert_eq!(
            ptf.data_url(&param).unwrap(),
            "https://irsa.ipac.caltech.edu/ibe/data/ptf/images/level1/proc/2013/05/15/f2/c4/p5/v1/PTF_201305152494_i_p_scie_t055916_u015568962_f02_p100037_c04.fits"
        );
        assert!(ptf.make_data_param(&InfoMap::new()).is_err());
    }

    #[test]
    fn filter_field_and_ccd() {
        let ptf = PtfIbeDataSource::new(&MissionSettings::default(), PtfProduct::Level1);
        let info = InfoMap::new()
            .with(BAND, "g,R")
            .with(PTF_FIELD, "100037")
            .with(CCD_ID, "4")
            .with(source::TIME_END, "2013-05-16");
        let param = ptf.make_query_param(&info).unwrap();
        assert_eq!(
            param.where_clause(),
            Some("fid IN (1,2) AND ptffield=100037 AND ccdid=4 AND obsmjd<=56428")
        );
    }
}
