//! Zwicky Transient Facility science, reference and difference images.

use crate::config::MissionSettings;
use crate::error::IbeError;
use crate::info::InfoMap;
use crate::params::{IbeDataParam, IbeQueryParam};
use crate::source::{
    self, BAND, Constraints, DEFAULT_IBE_HOST, DS_KEY, IbeDataSource, PRODUCT_LEVEL,
    SourceBinding,
};

pub const MISSION: &str = "ztf";
pub const DATASET: &str = "products";

pub const FILE_FRAC_DAY: &str = "filefracday";
pub const FIELD: &str = "field";
pub const FILTER_CODE: &str = "filtercode";
pub const CCD_ID: &str = "ccdid";
pub const QID: &str = "qid";
pub const IMG_TYPE_CODE: &str = "imgtypecode";

const JD_MINUS_MJD: f64 = 2_400_000.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZtfProduct {
    Sci,
    Ref,
    /// Difference images are indexed by the science table.
    Diff,
}

impl ZtfProduct {
    pub fn key(&self) -> &'static str {
        match self {
            ZtfProduct::Sci => "sci",
            ZtfProduct::Ref => "ref",
            ZtfProduct::Diff => "diff",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ZtfProduct::Sci | ZtfProduct::Diff => "sci",
            ZtfProduct::Ref => "ref",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "sci" => Some(ZtfProduct::Sci),
            "ref" => Some(ZtfProduct::Ref),
            "diff" => Some(ZtfProduct::Diff),
            _ => None,
        }
    }

    fn has_epochs(&self) -> bool {
        !matches!(self, ZtfProduct::Ref)
    }
}

#[derive(Debug, Clone)]
pub struct ZtfIbeDataSource {
    binding: SourceBinding,
    product: ZtfProduct,
}

impl ZtfIbeDataSource {
    pub fn new(settings: &MissionSettings, product: ZtfProduct) -> Self {
        Self::bind(settings, &InfoMap::new(), product)
    }

    pub fn from_source_info(settings: &MissionSettings, info: &InfoMap) -> Result<Self, IbeError> {
        let product = match info.first_of(&[DS_KEY, PRODUCT_LEVEL]) {
            Some(key) => {
                ZtfProduct::from_key(key).ok_or_else(|| IbeError::unknown_product(MISSION, key))?
            }
            None => ZtfProduct::Sci,
        };
        Ok(Self::bind(settings, info, product))
    }

    fn bind(settings: &MissionSettings, info: &InfoMap, product: ZtfProduct) -> Self {
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

    pub fn product(&self) -> ZtfProduct {
        self.product
    }

    fn epoch_path(&self, row: &InfoMap) -> Result<String, IbeError> {
        let frac_day = row.require(FILE_FRAC_DAY)?;
        if frac_day.len() != 14 || !frac_day.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(IbeError::invalid(FILE_FRAC_DAY, frac_day));
        }
        let field = row.require_u32(FIELD)?;
        let filter = row.require(FILTER_CODE)?;
        let ccd = row.require_u32(CCD_ID)?;
        let img_type = row.require(IMG_TYPE_CODE)?;
        let qid = row.require_u32(QID)?;
        let suffix = match self.product {
            ZtfProduct::Diff => "scimrefdiffimg.fits.fz",
            _ => "sciimg.fits",
        };

        Ok(format!(
            "{}/{}/{}/ztf_{frac_day}_{field:06}_{filter}_c{ccd:02}_{img_type}_q{qid}_{suffix}",
            &frac_day[..4],
            &frac_day[4..8],
            &frac_day[8..],
        ))
    }

    fn reference_path(row: &InfoMap) -> Result<String, IbeError> {
        let field = format!("{:06}", row.require_u32(FIELD)?);
        let filter = row.require(FILTER_CODE)?;
        let ccd = row.require_u32(CCD_ID)?;
        let qid = row.require_u32(QID)?;

        Ok(format!(
            "{}/field{field}/{filter}/ccd{ccd:02}/q{qid}/ztf_{field}_{filter}_c{ccd:02}_q{qid}_refimg.fits",
            &field[..3],
        ))
    }
}

impl IbeDataSource for ZtfIbeDataSource {
    fn binding(&self) -> &SourceBinding {
        &self.binding
    }

    fn make_data_param(&self, path_info: &InfoMap) -> Result<IbeDataParam, IbeError> {
        let path = match self.product {
            ZtfProduct::Ref => Self::reference_path(path_info)?,
            _ => self.epoch_path(path_info)?,
        };
        let mut param = IbeDataParam::with_file_path(&path);
        source::apply_cutout(path_info, &mut param);
        Ok(param)
    }

    fn make_query_param(&self, query_info: &InfoMap) -> Result<IbeQueryParam, IbeError> {
        let mut param = source::base_query_param(query_info)?;

        let mut constraints = Constraints::new();
        if let Some(bands) = query_info.get(BAND).filter(|value| !source::is_all_bands(value)) {
            let codes = source::split_list(bands)
                .into_iter()
                .map(|band| {
                    let band = band.to_ascii_lowercase();
                    let code = if band.starts_with('z') { band } else { format!("z{band}") };
                    match code.as_str() {
                        "zg" | "zr" | "zi" => Ok(source::sql_quote(&code)),
                        _ => Err(IbeError::invalid(BAND, bands)),
                    }
                })
                .collect::<Result<Vec<_>, IbeError>>()?;
            constraints.push(source::in_clause(FILTER_CODE, &codes));
        }
        for column in [FIELD, CCD_ID, QID] {
            if let Some(value) = query_info.get(column) {
                constraints.push(source::in_clause(column, &source::int_list(column, value)?));
            }
        }
        if self.product.has_epochs() {
            source::push_time_range(
                query_info,
                "obsjd",
                |mjd| mjd + JD_MINUS_MJD,
                &mut constraints,
            )?;
        }
        constraints.apply(query_info, &mut param);
        Ok(param)
    }
}
