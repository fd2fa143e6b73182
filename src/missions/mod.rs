use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::error::IbeError;

pub mod atlas;
pub mod ptf;
pub mod twomass;
pub mod wise;
pub mod ztf;

pub use atlas::AtlasIbeDataSource;
pub use ptf::PtfIbeDataSource;
pub use twomass::TwoMassIbeDataSource;
pub use wise::WiseIbeDataSource;
pub use ztf::ZtfIbeDataSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum MissionKind {
    Wise,
    #[value(name = "twomass", alias = "2mass")]
    TwoMass,
    Ptf,
    Ztf,
    #[value(alias = "spitzer")]
    Atlas,
}

impl MissionKind {
    pub const ALL: [MissionKind; 5] = [
        MissionKind::Wise,
        MissionKind::TwoMass,
        MissionKind::Ptf,
        MissionKind::Ztf,
        MissionKind::Atlas,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionKind::Wise => "wise",
            MissionKind::TwoMass => "twomass",
            MissionKind::Ptf => "ptf",
            MissionKind::Ztf => "ztf",
            MissionKind::Atlas => "atlas",
        }
    }
}

impl fmt::Display for MissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MissionKind {
    type Err = IbeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wise" => Ok(MissionKind::Wise),
            "twomass" | "2mass" => Ok(MissionKind::TwoMass),
            "ptf" => Ok(MissionKind::Ptf),
            "ztf" => Ok(MissionKind::Ztf),
            "atlas" | "spitzer" => Ok(MissionKind::Atlas),
            _ => Err(IbeError::UnknownMission(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mission_names_round_trip() {
        for kind in MissionKind::ALL {
            assert_eq!(kind.as_str().parse::<MissionKind>().unwrap(), kind);
        }
        assert_eq!("2MASS".parse::<MissionKind>().unwrap(), MissionKind::TwoMass);
        assert!("galex".parse::<MissionKind>().is_err());
    }
}
