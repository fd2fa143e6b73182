use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::IbeError;

/// How a search region is matched against image footprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intersect {
    Covers,
    Enclosed,
    Center,
    Overlaps,
}

impl fmt::Display for Intersect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intersect::Covers => write!(f, "COVERS"),
            Intersect::Enclosed => write!(f, "ENCLOSED"),
            Intersect::Center => write!(f, "CENTER"),
            Intersect::Overlaps => write!(f, "OVERLAPS"),
        }
    }
}

impl FromStr for Intersect {
    type Err = IbeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "COVERS" => Ok(Intersect::Covers),
            "ENCLOSED" => Ok(Intersect::Enclosed),
            "CENTER" => Ok(Intersect::Center),
            "OVERLAPS" => Ok(Intersect::Overlaps),
            _ => Err(IbeError::invalid("intersect", value)),
        }
    }
}

/// Where a query is anchored: a sky position or a reference key, never both.
///
/// A coordinate parsed from text keeps that text, so `POS` goes out exactly as
/// the caller wrote it. Positions set from numbers print in shortest form.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionSpec {
    ByCoordinate { lon: f64, lat: f64, text: String },
    ByReference(String),
}

impl PositionSpec {
    /// Parses a `"lon,lat"` pair in decimal degrees.
    pub fn parse_pos(value: &str) -> Result<Self, IbeError> {
        let (lon, lat) = value
            .split_once(',')
            .ok_or_else(|| IbeError::invalid("pos", value))?;
        let (lon_text, lat_text) = (lon.trim(), lat.trim());
        let lon: f64 = lon_text
            .parse()
            .map_err(|_| IbeError::invalid("pos", value))?;
        let lat: f64 = lat_text
            .parse()
            .map_err(|_| IbeError::invalid("pos", value))?;
        if !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(IbeError::invalid("pos", value));
        }
        Ok(PositionSpec::ByCoordinate {
            lon,
            lat,
            text: format!("{lon_text},{lat_text}"),
        })
    }
}

impl fmt::Display for PositionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSpec::ByCoordinate { text, .. } => write!(f, "{text}"),
            PositionSpec::ByReference(key) => write!(f, "{key}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IbeQueryParam {
    position: Option<PositionSpec>,
    size: Option<String>,
    columns: Option<String>,
    where_clause: Option<String>,
    intersect: Option<Intersect>,
    mcen: bool,
}

impl IbeQueryParam {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position search for the single most centered image: `INTERSECT=CENTER`
    /// with `mcen` set.
    pub fn with_position(pos: &str, size: &str) -> Result<Self, IbeError> {
        Ok(Self {
            position: Some(PositionSpec::parse_pos(pos)?),
            size: non_empty(size),
            intersect: Some(Intersect::Center),
            mcen: true,
            ..Self::default()
        })
    }

    pub fn by_reference(key: &str) -> Self {
        let mut param = Self::default();
        param.set_ref_by(key);
        param
    }

    pub fn position(&self) -> Option<&PositionSpec> {
        self.position.as_ref()
    }

    pub fn set_pos(&mut self, lon: f64, lat: f64) {
        self.position = Some(PositionSpec::ByCoordinate {
            lon,
            lat,
            text: format!("{lon},{lat}"),
        });
    }

    /// Replaces any position with a reference key. An empty key clears it.
    pub fn set_ref_by(&mut self, key: &str) {
        self.position = non_empty(key).map(PositionSpec::ByReference);
    }

    pub fn pos(&self) -> Option<String> {
        match &self.position {
            Some(pos @ PositionSpec::ByCoordinate { .. }) => Some(pos.to_string()),
            _ => None,
        }
    }

    pub fn ref_by(&self) -> Option<&str> {
        match &self.position {
            Some(PositionSpec::ByReference(key)) => Some(key.as_str()),
            _ => None,
        }
    }

    pub fn size(&self) -> Option<&str> {
        self.size.as_deref()
    }

    pub fn set_size(&mut self, size: &str) {
        self.size = non_empty(size);
    }

    pub fn columns(&self) -> Option<&str> {
        self.columns.as_deref()
    }

    pub fn set_columns(&mut self, columns: &str) {
        self.columns = non_empty(columns);
    }

    pub fn where_clause(&self) -> Option<&str> {
        self.where_clause.as_deref()
    }

    pub fn set_where(&mut self, where_clause: &str) {
        self.where_clause = non_empty(where_clause);
    }

    pub fn intersect(&self) -> Option<Intersect> {
        self.intersect
    }

    pub fn set_intersect(&mut self, intersect: Option<Intersect>) {
        self.intersect = intersect;
    }

    pub fn is_mcen(&self) -> bool {
        self.mcen
    }

    pub fn set_mcen(&mut self, mcen: bool) {
        self.mcen = mcen;
    }

    /// True when a sky position or a where clause is present.
    pub fn is_valid(&self) -> bool {
        self.pos().is_some() || self.where_clause.is_some()
    }

    /// Like [`is_valid`](Self::is_valid) but also accepts a bare reference key.
    pub fn is_searchable(&self) -> bool {
        self.is_valid() || self.ref_by().is_some()
    }

    /// Ordered `(name, raw value)` pairs. An empty value marks a bare flag.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        match &self.position {
            Some(PositionSpec::ByReference(key)) => pairs.push(("refby", key.clone())),
            Some(pos @ PositionSpec::ByCoordinate { .. }) => {
                pairs.push(("POS", pos.to_string()));
                if let Some(intersect) = self.intersect {
                    pairs.push(("INTERSECT", intersect.to_string()));
                }
                if self.mcen {
                    pairs.push(("mcen", String::new()));
                } else if let Some(size) = &self.size {
                    pairs.push(("SIZE", size.clone()));
                }
            }
            None => {}
        }
        if let Some(columns) = &self.columns {
            pairs.push(("columns", columns.clone()));
        }
        if let Some(where_clause) = &self.where_clause {
            pairs.push(("where", where_clause.clone()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cutout {
    pub center: String,
    pub size: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IbeDataParam {
    file_path: Option<String>,
    do_zip: bool,
    cutout: Option<Cutout>,
}

impl IbeDataParam {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file_path(file_path: &str) -> Self {
        let mut param = Self::default();
        param.set_file_path(file_path);
        param
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    pub fn set_file_path(&mut self, file_path: &str) {
        self.file_path = non_empty(file_path);
    }

    /// Last path segment of the file path.
    pub fn file_name(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .and_then(|path| path.rsplit('/').find(|segment| !segment.is_empty()))
    }

    pub fn do_zip(&self) -> bool {
        self.do_zip
    }

    pub fn set_do_zip(&mut self, do_zip: bool) {
        self.do_zip = do_zip;
    }

    pub fn cutout(&self) -> Option<&Cutout> {
        self.cutout.as_ref()
    }

    pub fn do_cutout(&self) -> bool {
        self.cutout.is_some()
    }

    pub fn set_cutout(&mut self, center: &str, size: &str) {
        self.cutout = Some(Cutout {
            center: center.to_string(),
            size: size.to_string(),
        });
    }

    pub fn clear_cutout(&mut self) {
        self.cutout = None;
    }
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
