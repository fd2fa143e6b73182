//! 2MASS atlas images. Files live under per-night, per-scan directories.

use crate::config::MissionSettings;
use crate::error::IbeError;
use crate::info::InfoMap;
use crate::params::{IbeDataParam, IbeQueryParam};
use crate::source::{
    self, BAND, Constraints, DEFAULT_IBE_HOST, DS_KEY, IbeDataSource, SourceBinding,
};

pub const MISSION: &str = "twomass";

pub const ORDATE: &str = "ordate";
pub const HEMISPHERE: &str = "hemisphere";
pub const SCANNO: &str = "scanno";
pub const FNAME: &str = "fname";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoMassProduct {
    /// All-sky release.
    Asky,
    /// Full survey, including the working database.
    Askyw,
    /// 6x deep scans.
    Sx,
    /// Calibration scans.
    Cal,
}

impl TwoMassProduct {
    pub const ALL: [TwoMassProduct; 4] = [
        TwoMassProduct::Asky,
        TwoMassProduct::Askyw,
        TwoMassProduct::Sx,
        TwoMassProduct::Cal,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            TwoMassProduct::Asky => "asky",
            TwoMassProduct::Askyw => "askyw",
            TwoMassProduct::Sx => "sx",
            TwoMassProduct::Cal => "cal",
        }
    }

    pub fn dataset(&self) -> &'static str {
        match self {
            TwoMassProduct::Asky => "allsky",
            TwoMassProduct::Askyw => "full",
            TwoMassProduct::Sx => "sixxfull",
            TwoMassProduct::Cal => "calibration",
        }
    }

    pub fn table(&self) -> &'static str {
        self.dataset()
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|product| product.key().eq_ignore_ascii_case(key))
    }
}

#[derive(Debug, Clone)]
pub struct TwoMassIbeDataSource {
    binding: SourceBinding,
    product: TwoMassProduct,
}

impl TwoMassIbeDataSource {
    pub fn new(settings: &MissionSettings, product: TwoMassProduct) -> Self {
        Self::bind(settings, &InfoMap::new(), product)
    }

    /// Binds to the product named by `ds`; without one, the all-sky release.
    pub fn from_source_info(settings: &MissionSettings, info: &InfoMap) -> Result<Self, IbeError> {
        let product = match info.get(DS_KEY) {
            Some(key) => TwoMassProduct::from_key(key)
                .ok_or_else(|| IbeError::unknown_product(MISSION, key))?,
            None => TwoMassProduct::Asky,
        };
        Ok(Self::bind(settings, info, product))
    }

    fn bind(settings: &MissionSettings, info: &InfoMap, product: TwoMassProduct) -> Self {
        let binding = SourceBinding::resolve(
            settings,
            info,
            DEFAULT_IBE_HOST,
            MISSION,
            product.dataset(),
            product.table(),
        );
        Self { binding, product }
    }

    pub fn product(&self) -> TwoMassProduct {
        self.product
    }
}

fn hemisphere(value: &str) -> Result<String, IbeError> {
    match value.to_ascii_lowercase().as_str() {
        hem @ ("n" | "s") => Ok(hem.to_string()),
        _ => Err(IbeError::invalid(HEMISPHERE, value)),
    }
}

fn ordate(value: &str) -> Result<&str, IbeError> {
    if value.len() == 6 && value.chars().all(|ch| ch.is_ascii_digit()) {
        Ok(value)
    } else {
        Err(IbeError::invalid(ORDATE, value))
    }
}

impl IbeDataSource for TwoMassIbeDataSource {
    fn binding(&self) -> &SourceBinding {
        &self.binding
    }

    fn make_data_param(&self, path_info: &InfoMap) -> Result<IbeDataParam, IbeError> {
        let ordate = ordate(path_info.require(ORDATE)?)?;
        let hemisphere = hemisphere(path_info.require(HEMISPHERE)?)?;
        let scanno = path_info.require_u32(SCANNO)?;
        let fname = path_info.require(FNAME)?;

        let mut param = IbeDataParam::with_file_path(&format!(
            "{ordate}{hemisphere}/s{scanno:03}/image/{fname}"
        ));
        param.set_do_zip(fname.ends_with(".gz"));
        source::apply_cutout(path_info, &mut param);
        Ok(param)
    }

    fn make_query_param(&self, query_info: &InfoMap) -> Result<IbeQueryParam, IbeError> {
        let mut param = source::base_query_param(query_info)?;

        let mut constraints = Constraints::new();
        if let Some(bands) = query_info.get(BAND).filter(|value| !source::is_all_bands(value)) {
            let filters = source::split_list(bands)
                .into_iter()
                .map(|band| match band.to_ascii_lowercase().as_str() {
                    filter @ ("j" | "h" | "k") => Ok(source::sql_quote(filter)),
                    _ => Err(IbeError::invalid(BAND, bands)),
                })
                .collect::<Result<Vec<_>, IbeError>>()?;
            constraints.push(source::in_clause("filter", &filters));
        }
        if let Some(value) = query_info.get(HEMISPHERE) {
            constraints.push(format!("{HEMISPHERE}={}", source::sql_quote(&hemisphere(value)?)));
        }
        if query_info.get(SCANNO).is_some() {
            constraints.push(format!("{SCANNO}={}", query_info.require_u32(SCANNO)?));
        }
        if let Some(value) = query_info.get(ORDATE) {
            constraints.push(format!("{ORDATE}={}", source::sql_quote(ordate(value)?)));
        }
        constraints.apply(query_info, &mut param);
        Ok(param)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn asky() -> TwoMassIbeDataSource {
        TwoMassIbeDataSource::new(&MissionSettings::default(), TwoMassProduct::Asky)
    }

    #[test]
    fn scan_directory_path() {
        let row = InfoMap::new()
            .with(ORDATE, "980623")
            .with(HEMISPHERE, "n")
            .with(SCANNO, "76")
            .with(FNAME, "hi0760126.fits.gz");
        let param = asky().make_data_param(&row).unwrap();
        assert_eq!(param.file_path(), Some("980623n/s076/image/hi0760126.fits.gz"));
        assert!(param.do_zip());
        assert_eq!(
            asky().data_url(&param).unwrap(),
            "https://irsa.ipac.caltech.edu/ibe/data/twomass/allsky/allsky/980623n/s076/image/hi0760126.fits.gz"
        );
    }

    #[test]
    fn rejects_bad_hemisphere() {
        let row = InfoMap::new()
            .with(ORDATE, "980623")
            .with(HEMISPHERE, "x")
            .with(SCANNO, "76")
            .with(FNAME, "hi0760126.fits");
        assert_matches!(
            asky().make_data_param(&row).unwrap_err(),
            IbeError::InvalidField { .. }
        );
    }

    #[test]
    fn product_keys() {
        let info = InfoMap::new().with(DS_KEY, "SX");
        let source =
            TwoMassIbeDataSource::from_source_info(&MissionSettings::default(), &info).unwrap();
        assert_eq!(source.binding().dataset, "sixxfull");

        let bogus = InfoMap::new().with(DS_KEY, "deep");
        assert!(TwoMassIbeDataSource::from_source_info(&MissionSettings::default(), &bogus).is_err());
    }

    #[test]
    fn scan_constraints() {
        let info = InfoMap::new()
            .with(source::USER_TARGET_WORLD_PT, "10;20;EQ_J2000")
            .with(BAND, "J")
            .with(HEMISPHERE, "N")
            .with(SCANNO, "76")
            .with(ORDATE, "980623");
        let param = asky().make_query_param(&info).unwrap();
        assert_eq!(
            param.where_clause(),
            Some("filter='j' AND hemisphere='n' AND scanno=76 AND ordate='980623'")
        );
    }

    #[test]
    fn several_bands_use_in() {
        let info = InfoMap::new()
            .with(BAND, "j,k")
            .with(source::CONSTRAINTS, "qual>2");
        let param = asky().make_query_param(&info).unwrap();
        assert_eq!(param.where_clause(), Some("filter IN ('j','k') AND qual>2"));
        assert!(param.is_valid());
    }
}
