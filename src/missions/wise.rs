//! WISE / NEOWISE single-exposure (level 1b) and atlas (level 3a) images.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::MissionSettings;
use crate::error::IbeError;
use crate::info::InfoMap;
use crate::params::{IbeDataParam, IbeQueryParam};
use crate::source::{
    self, BAND, Constraints, DEFAULT_IBE_HOST, DS_KEY, IbeDataSource, PRODUCT_LEVEL,
    SourceBinding,
};

pub const MISSION: &str = "wise";

pub const SCHEMA: &str = "schema";
pub const SOURCE_ID: &str = "sourceId";
pub const IMAGE_TYPE: &str = "type";
pub const FILE_PATH_KEYS: [&str; 2] = ["filepath", "fname"];

pub const PRELIM: &str = "prelim";
pub const PRELIM_POSTCRYO: &str = "prelim_postcryo";
pub const ALLSKY_4BAND: &str = "allsky-4band";
pub const CRYO_3BAND: &str = "cryo_3band";
pub const POSTCRYO: &str = "postcryo";
pub const MERGE: &str = "merge";
pub const ALLWISE_MULTIBAND: &str = "allwise-multiband";
pub const NEOWISER: &str = "neowiser";

static SOURCE_ID_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"^\d{4}[pm]\d{3}_aa11-\d{6}$", PRELIM),
        (r"^\d{4}[pm]\d{3}_ab41-\d{6}$", ALLSKY_4BAND),
        (r"^\d{4}[pm]\d{3}_ab31-\d{6}$", CRYO_3BAND),
        (r"^\d{4}[pm]\d{3}_ac51-\d{6}$", ALLWISE_MULTIBAND),
    ]
    .into_iter()
    .map(|(pattern, image_set)| {
        (
            Regex::new(pattern).expect("source id pattern is a valid regex"),
            image_set,
        )
    })
    .collect()
});

/// Image set a coadd source id belongs to, from its processing-pass tag.
pub fn image_set_for_source_id(source_id: &str) -> Option<&'static str> {
    let source_id = source_id.trim();
    SOURCE_ID_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(source_id))
        .map(|(_, image_set)| *image_set)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductLevel {
    L1b,
    L3a,
}

impl fmt::Display for ProductLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductLevel::L1b => write!(f, "1b"),
            ProductLevel::L3a => write!(f, "3a"),
        }
    }
}

impl FromStr for ProductLevel {
    type Err = IbeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1b" | "l1b" => Ok(ProductLevel::L1b),
            "3a" | "l3a" => Ok(ProductLevel::L3a),
            _ => Err(IbeError::invalid(PRODUCT_LEVEL, value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiseProduct {
    Allsky4Band1b,
    Allsky4Band3a,
    Cryo3Band1b,
    Cryo3Band3a,
    Postcryo1b,
    AllwiseMultiband3a,
    Merge1b,
    Merge3a,
    Prelim1b,
    Prelim3a,
    PrelimPostcryo1b,
    Neowiser1b,
}

impl WiseProduct {
    pub const ALL: [WiseProduct; 12] = [
        WiseProduct::Allsky4Band1b,
        WiseProduct::Allsky4Band3a,
        WiseProduct::Cryo3Band1b,
        WiseProduct::Cryo3Band3a,
        WiseProduct::Postcryo1b,
        WiseProduct::AllwiseMultiband3a,
        WiseProduct::Merge1b,
        WiseProduct::Merge3a,
        WiseProduct::Prelim1b,
        WiseProduct::Prelim3a,
        WiseProduct::PrelimPostcryo1b,
        WiseProduct::Neowiser1b,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            WiseProduct::Allsky4Band1b => "ALLSKY_4BAND_1B",
            WiseProduct::Allsky4Band3a => "ALLSKY_4BAND_3A",
            WiseProduct::Cryo3Band1b => "CRYO_3BAND_1B",
            WiseProduct::Cryo3Band3a => "CRYO_3BAND_3A",
            WiseProduct::Postcryo1b => "POSTCRYO_1B",
            WiseProduct::AllwiseMultiband3a => "ALLWISE_MULTIBAND_3A",
            WiseProduct::Merge1b => "MERGE_1B",
            WiseProduct::Merge3a => "MERGE_3A",
            WiseProduct::Prelim1b => "PRELIM_1B",
            WiseProduct::Prelim3a => "PRELIM_3A",
            WiseProduct::PrelimPostcryo1b => "PRELIM_POSTCRYO_1B",
            WiseProduct::Neowiser1b => "NEOWISER_1B",
        }
    }

    pub fn image_set(&self) -> &'static str {
        match self {
            WiseProduct::Allsky4Band1b | WiseProduct::Allsky4Band3a => ALLSKY_4BAND,
            WiseProduct::Cryo3Band1b | WiseProduct::Cryo3Band3a => CRYO_3BAND,
            WiseProduct::Postcryo1b => POSTCRYO,
            WiseProduct::AllwiseMultiband3a => ALLWISE_MULTIBAND,
            WiseProduct::Merge1b | WiseProduct::Merge3a => MERGE,
            WiseProduct::Prelim1b | WiseProduct::Prelim3a => PRELIM,
            WiseProduct::PrelimPostcryo1b => PRELIM_POSTCRYO,
            WiseProduct::Neowiser1b => NEOWISER,
        }
    }

    pub fn level(&self) -> ProductLevel {
        match self {
            WiseProduct::Allsky4Band3a
            | WiseProduct::Cryo3Band3a
            | WiseProduct::AllwiseMultiband3a
            | WiseProduct::Merge3a
            | WiseProduct::Prelim3a => ProductLevel::L3a,
            _ => ProductLevel::L1b,
        }
    }

    /// Directory under `wise/` on the IBE host.
    pub fn dataset(&self) -> &'static str {
        match self.image_set() {
            ALLSKY_4BAND => "allsky",
            ALLWISE_MULTIBAND => "allwise",
            other => other,
        }
    }

    pub fn image_table(&self) -> &'static str {
        match self {
            WiseProduct::Allsky4Band1b => "4band_p1bm_frm",
            WiseProduct::Allsky4Band3a => "4band_p3am_cdd",
            WiseProduct::Cryo3Band1b => "3band_p1bm_frm",
            WiseProduct::Cryo3Band3a => "3band_p3am_cdd",
            WiseProduct::Postcryo1b => "2band_p1bm_frm",
            WiseProduct::AllwiseMultiband3a => "p3am_cdd",
            WiseProduct::Merge1b => "merge_p1bm_frm",
            WiseProduct::Merge3a => "merge_p3am_cdd",
            WiseProduct::Prelim1b | WiseProduct::PrelimPostcryo1b | WiseProduct::Neowiser1b => {
                "p1bm_frm"
            }
            WiseProduct::Prelim3a => "p3am_cdd",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|product| product.key().eq_ignore_ascii_case(key))
    }

    pub fn from_image_set(image_set: &str, level: ProductLevel) -> Option<Self> {
        let image_set = image_set.trim();
        Self::ALL.into_iter().find(|product| {
            product.image_set().eq_ignore_ascii_case(image_set) && product.level() == level
        })
    }
}

#[derive(Debug, Clone)]
pub struct WiseIbeDataSource {
    binding: SourceBinding,
    product: WiseProduct,
}

impl WiseIbeDataSource {
    pub fn new(settings: &MissionSettings, product: WiseProduct) -> Self {
        Self::bind(settings, &InfoMap::new(), product)
    }

    /// Binds to the product named by `ds`, by `schema` + `ProductLevel`, or
    /// by the image set encoded in a coadd `sourceId`, in that order.
    pub fn from_source_info(settings: &MissionSettings, info: &InfoMap) -> Result<Self, IbeError> {
        let product = if let Some(key) = info.get(DS_KEY) {
            WiseProduct::from_key(key).ok_or_else(|| IbeError::unknown_product(MISSION, key))?
        } else if let Some(image_set) = info.get(SCHEMA) {
            let level = match info.get(PRODUCT_LEVEL) {
                Some(level) => level.parse()?,
                None => ProductLevel::L1b,
            };
            WiseProduct::from_image_set(image_set, level).ok_or_else(|| {
                IbeError::unknown_product(MISSION, &format!("{image_set}/{level}"))
            })?
        } else if let Some(source_id) = info.get(SOURCE_ID) {
            let image_set = image_set_for_source_id(source_id)
                .ok_or_else(|| IbeError::invalid(SOURCE_ID, source_id))?;
            WiseProduct::from_image_set(image_set, ProductLevel::L3a)
                .ok_or_else(|| IbeError::unknown_product(MISSION, image_set))?
        } else {
            return Err(IbeError::MissingField(format!(
                "{DS_KEY}|{SCHEMA}|{SOURCE_ID}"
            )));
        };
        Ok(Self::bind(settings, info, product))
    }

    fn bind(settings: &MissionSettings, info: &InfoMap, product: WiseProduct) -> Self {
        let binding = SourceBinding::resolve(
            settings,
            info,
            DEFAULT_IBE_HOST,
            MISSION,
            product.dataset(),
            product.image_table(),
        );
        Self { binding, product }
    }

    pub fn product(&self) -> WiseProduct {
        self.product
    }

    fn file_path(&self, path_info: &InfoMap) -> Result<(String, bool), IbeError> {
        if let Some(path) = path_info.first_of(&FILE_PATH_KEYS) {
            return Ok((path.to_string(), path.ends_with(".gz")));
        }

        let band = path_info.require_u32(BAND)?;
        if !(1..=4).contains(&band) {
            return Err(IbeError::invalid(BAND, &band.to_string()));
        }
        let image_type = path_info.get(IMAGE_TYPE).unwrap_or("int");
        let allowed: &[&str] = match self.product.level() {
            ProductLevel::L1b => &["int", "unc", "msk"],
            ProductLevel::L3a => &["int", "unc", "cov", "std"],
        };
        if !allowed.contains(&image_type) {
            return Err(IbeError::invalid(IMAGE_TYPE, image_type));
        }
        let zipped = image_type != "int";
        let gz = if zipped { ".gz" } else { "" };

        let path = match self.product.level() {
            ProductLevel::L1b => {
                let scan_id = path_info.require("scan_id")?;
                if scan_id.len() < 2 || !scan_id.is_ascii() {
                    return Err(IbeError::invalid("scan_id", scan_id));
                }
                let frame = path_info.require_u32("frame_num")?;
                let scan_group = &scan_id[scan_id.len() - 2..];
                format!(
                    "{scan_group}/{scan_id}/{frame:03}/{scan_id}{frame:03}-w{band}-{image_type}-1b.fits{gz}"
                )
            }
            ProductLevel::L3a => {
                let coadd_id = path_info.require("coadd_id")?;
                if coadd_id.len() < 4 || !coadd_id.is_ascii() {
                    return Err(IbeError::invalid("coadd_id", coadd_id));
                }
                format!(
                    "{}/{}/{coadd_id}/{coadd_id}-w{band}-{image_type}-3.fits{gz}",
                    &coadd_id[..2],
                    &coadd_id[..4]
                )
            }
        };
        Ok((path, zipped))
    }
}

impl IbeDataSource for WiseIbeDataSource {
    fn binding(&self) -> &SourceBinding {
        &self.binding
    }

    fn make_data_param(&self, path_info: &InfoMap) -> Result<IbeDataParam, IbeError> {
        let (path, zipped) = self.file_path(path_info)?;
        let mut param = IbeDataParam::with_file_path(&path);
        param.set_do_zip(zipped);
        source::apply_cutout(path_info, &mut param);
        Ok(param)
    }

    fn make_query_param(&self, query_info: &InfoMap) -> Result<IbeQueryParam, IbeError> {
        let mut param = source::base_query_param(query_info)?;
        if param.position().is_none() {
            if let Some(source_id) = query_info.get(SOURCE_ID) {
                param.set_ref_by(source_id);
            }
        }

        let mut constraints = Constraints::new();
        if let Some(bands) = query_info.get(BAND).filter(|value| !source::is_all_bands(value)) {
            let bands = source::int_list(BAND, bands)?;
            if bands.iter().any(|band| !matches!(band.as_str(), "1" | "2" | "3" | "4")) {
                return Err(IbeError::invalid(BAND, &bands.join(",")));
            }
            constraints.push(source::in_clause("band", &bands));
        }
        if self.product.level() == ProductLevel::L1b {
            source::push_time_range(query_info, "mjd_obs", |mjd| mjd, &mut constraints)?;
        }
        constraints.apply(query_info, &mut param);
        Ok(param)
    }
}
