#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the tailor fabric conflation toolchain.
//!
//! Defines the layers that live in a project store, the address comparison
//! mode, the operator decision protocol used when the pipeline needs a
//! human answer, and the outcome/report types returned by each step.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

/// EPSG code of the single coordinate reference system used by every
/// stored geometry (WGS84 longitude/latitude).
pub const PROJECT_EPSG: u32 = 4326;

/// Name of the geometry column in every layer table.
pub const GEOMETRY_COLUMN: &str = "geom";

/// Square meters in one square foot.
pub const SQUARE_METERS_PER_SQUARE_FOOT: f64 = 0.092_903;

/// Feet in one meter.
pub const FEET_PER_METER: f64 = 3.280_84;

/// Default minimum building/parcel overlap, in square feet.
pub const DEFAULT_BUILDING_PARCEL_OVERLAP_SQ_FT: f64 = 500.0;

/// A table in the project store.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Layer {
    /// Area of interest polygon.
    Boundary,
    /// Land parcels.
    Parcels,
    /// Building footprints.
    Buildings,
    /// Building/site location points (the fabric).
    Bsls,
    /// Address points.
    Addresses,
    /// Parcels with derived building/bsl flags.
    ParcelsAnalyzed,
    /// Bsls with address match status.
    BslsAnalyzed,
    /// One line per bsl to its nearest textually matching address.
    BslsAddressMatchLines,
}

impl Layer {
    /// Layers created by load commands.
    pub const INPUTS: &[Self] = &[
        Self::Boundary,
        Self::Parcels,
        Self::Buildings,
        Self::Bsls,
        Self::Addresses,
    ];

    /// Layers created by analysis. Always recreated together.
    pub const ANALYSIS_OUTPUTS: &[Self] = &[
        Self::ParcelsAnalyzed,
        Self::BslsAnalyzed,
        Self::BslsAddressMatchLines,
    ];

    /// Table name in the project store.
    #[must_use]
    pub fn table(self) -> &'static str {
        self.into()
    }

    /// Whether features of this layer are clipped to the boundary on load.
    #[must_use]
    pub const fn is_clipped(self) -> bool {
        matches!(
            self,
            Self::Parcels | Self::Buildings | Self::Bsls | Self::Addresses
        )
    }

    /// Source file extensions accepted when loading this layer.
    #[must_use]
    pub const fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Bsls => &["csv"],
            Self::Boundary | Self::Parcels | Self::Buildings | Self::Addresses => {
                &["geojson", "shp"]
            }
            Self::ParcelsAnalyzed | Self::BslsAnalyzed | Self::BslsAddressMatchLines => &[],
        }
    }

    /// CLI command that creates this layer, for error hints.
    #[must_use]
    pub const fn load_command(self) -> &'static str {
        match self {
            Self::Boundary => "load-boundary",
            Self::Parcels => "load-parcels",
            Self::Buildings => "load-buildings",
            Self::Bsls => "load-bsls",
            Self::Addresses => "load-addresses",
            Self::ParcelsAnalyzed | Self::BslsAnalyzed | Self::BslsAddressMatchLines => "analyze",
        }
    }
}

/// How address points are compared against bsls.
///
/// Fixed per project by the `tailor_address_*` column created when the
/// address layer is loaded.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AddressMatchMode {
    /// Street line only (`123 MAIN ST`).
    Street,
    /// Street, city, state and ZIP (`123 MAIN ST, Springfield, IL 62704`).
    Full,
}

/// Prefix shared by the derived address columns on the address layer.
pub const ADDRESS_COLUMN_PREFIX: &str = "tailor_address_";

impl AddressMatchMode {
    /// Derived column on the address layer holding the comparison text.
    #[must_use]
    pub const fn address_column(self) -> &'static str {
        match self {
            Self::Street => "tailor_address_street",
            Self::Full => "tailor_address_full",
        }
    }

    /// Normalized bsl column compared against [`Self::address_column`].
    #[must_use]
    pub const fn bsl_column(self) -> &'static str {
        match self {
            Self::Street => "address_primary_norm",
            Self::Full => "address_full_norm",
        }
    }

    /// Resolves the mode from an address layer column name.
    ///
    /// # Errors
    ///
    /// Returns [`UnrecognizedAddressColumn`] if the name is not one of the
    /// derived address columns.
    pub fn from_address_column(column: &str) -> Result<Self, UnrecognizedAddressColumn> {
        match column {
            "tailor_address_street" => Ok(Self::Street),
            "tailor_address_full" => Ok(Self::Full),
            _ => Err(UnrecognizedAddressColumn {
                column: column.to_string(),
            }),
        }
    }
}

/// Error returned for a column that looks like a derived address column
/// but names no known [`AddressMatchMode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedAddressColumn {
    /// The offending column name.
    pub column: String,
}

impl std::fmt::Display for UnrecognizedAddressColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unrecognized address match column: {}", self.column)
    }
}

impl std::error::Error for UnrecognizedAddressColumn {}

/// Minimum intersection area for associating a building with a parcel.
///
/// Stored in square meters since areas are measured geodesically in
/// meters; the comparison is strict (`area > threshold`).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct OverlapThreshold {
    square_meters: f64,
}

impl OverlapThreshold {
    /// Threshold from square feet, the unit operators configure.
    #[must_use]
    pub fn from_square_feet(square_feet: f64) -> Self {
        Self {
            square_meters: square_feet * SQUARE_METERS_PER_SQUARE_FOOT,
        }
    }

    /// Threshold from square meters.
    #[must_use]
    pub const fn from_square_meters(square_meters: f64) -> Self {
        Self { square_meters }
    }

    #[must_use]
    pub const fn square_meters(self) -> f64 {
        self.square_meters
    }

    #[must_use]
    pub fn square_feet(self) -> f64 {
        self.square_meters / SQUARE_METERS_PER_SQUARE_FOOT
    }

    /// Whether an overlap area (square meters) qualifies.
    #[must_use]
    pub fn is_exceeded_by(self, area_square_meters: f64) -> bool {
        area_square_meters > self.square_meters
    }
}

impl Default for OverlapThreshold {
    fn default() -> Self {
        Self::from_square_feet(DEFAULT_BUILDING_PARCEL_OVERLAP_SQ_FT)
    }
}

// ============================================================
// Operator decisions
// ============================================================

/// A question the pipeline needs an operator to answer before continuing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionRequest {
    /// Analysis output already exists; dropping it is destructive.
    OverwriteAnalysis {
        /// Analysis tables currently present.
        existing: Vec<Layer>,
    },
    /// Geometries are still invalid after the automatic repair pass.
    InvalidGeometries {
        /// Layer being repaired.
        layer: Layer,
        /// Rows still failing validity.
        remaining: u64,
    },
}

impl DecisionRequest {
    /// Decisions that answer this request.
    #[must_use]
    pub const fn accepted(&self) -> &'static [Decision] {
        match self {
            Self::OverwriteAnalysis { .. } => &[Decision::Overwrite, Decision::KeepExisting],
            Self::InvalidGeometries { .. } => &[Decision::ExcludeInvalid, Decision::Abort],
        }
    }
}

/// An operator's answer to a [`DecisionRequest`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Drop existing analysis output and recompute.
    Overwrite,
    /// Leave existing analysis output untouched and stop.
    KeepExisting,
    /// Delete the rows that could not be repaired and continue.
    ExcludeInvalid,
    /// Leave invalid rows in place and stop.
    Abort,
}

/// Preset answer for invalid geometries in unattended runs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InvalidGeometryPolicy {
    /// Always exclude rows that could not be repaired.
    Exclude,
    /// Always abort, leaving invalid rows in place.
    Abort,
}

impl From<InvalidGeometryPolicy> for Decision {
    fn from(policy: InvalidGeometryPolicy) -> Self {
        match policy {
            InvalidGeometryPolicy::Exclude => Self::ExcludeInvalid,
            InvalidGeometryPolicy::Abort => Self::Abort,
        }
    }
}

// ============================================================
// Loading
// ============================================================

/// Bounding box in project coordinates, used as a load-time spatial filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    /// Whether two extents overlap (shared edges count).
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// Options controlling how a source file is converted into a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct LoadOptions {
    /// Replace the layer if it already exists.
    pub overwrite: bool,
    /// EPSG code geometries are stored in.
    pub target_epsg: u32,
    /// Promote single-part geometries to their multi-part type.
    pub promote_to_multi: bool,
    /// Skip features whose bounding box misses this extent.
    pub spatial_filter: Option<Extent>,
    /// Candidate names for the X (longitude) column of tabular sources.
    pub x_column_names: Vec<String>,
    /// Candidate names for the Y (latitude) column of tabular sources.
    pub y_column_names: Vec<String>,
    /// Keep the coordinate columns as attributes.
    pub keep_geometry_columns: bool,
    /// Store fixed-width numeric fields as plain floating point values
    /// instead of preserving integral values as integers.
    pub relax_numeric_precision: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            target_epsg: PROJECT_EPSG,
            promote_to_multi: false,
            spatial_filter: None,
            x_column_names: Vec::new(),
            y_column_names: Vec::new(),
            keep_geometry_columns: true,
            relax_numeric_precision: false,
        }
    }
}

impl LoadOptions {
    /// Options for polygon layers (boundary, parcels, buildings).
    #[must_use]
    pub fn polygons() -> Self {
        Self {
            promote_to_multi: true,
            ..Self::default()
        }
    }

    /// Options for the bsl CSV (`Longitude`/`Latitude` point columns).
    #[must_use]
    pub fn bsl_points() -> Self {
        Self {
            x_column_names: vec!["Longitude".to_string()],
            y_column_names: vec!["Latitude".to_string()],
            keep_geometry_columns: false,
            ..Self::default()
        }
    }

    /// Sets the spatial filter.
    #[must_use]
    pub const fn with_spatial_filter(mut self, extent: Option<Extent>) -> Self {
        self.spatial_filter = extent;
        self
    }
}

/// Result of the geometry repair workflow for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairOutcome {
    /// No invalid geometries were found.
    AlreadyValid,
    /// Every invalid geometry was fixed by the automatic pass.
    Repaired {
        /// Number of geometries that were invalid before the pass.
        repaired: u64,
    },
    /// Geometries that survived the pass were deleted by operator choice.
    Excluded {
        /// Invalid geometries fixed by the automatic pass.
        repaired: u64,
        /// Rows deleted.
        excluded: u64,
    },
    /// The operator chose to stop; invalid rows remain.
    Aborted {
        /// Rows still invalid.
        remaining: u64,
    },
}

impl RepairOutcome {
    /// Whether the layer is fully valid after the workflow.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Aborted { .. })
    }
}

/// Result of clipping a layer to the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClipOutcome {
    /// No boundary layer exists.
    NoBoundary,
    /// Features outside the boundary were removed.
    Clipped {
        /// Rows deleted.
        removed: u64,
    },
}

/// Summary of a completed load command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Layer that was loaded.
    pub layer: Layer,
    /// Resolved source path.
    pub source: PathBuf,
    /// Features written to the store.
    pub features_loaded: u64,
    /// Features skipped by the spatial filter.
    pub features_filtered: u64,
    /// Geometry repair result.
    pub repair: RepairOutcome,
    /// Boundary clip result, absent for the boundary itself or when repair
    /// was aborted.
    pub clip: Option<ClipOutcome>,
}

// ============================================================
// Analysis
// ============================================================

/// Counts from the parcel relationship classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassificationSummary {
    pub parcels: u64,
    pub with_building: u64,
    pub with_bsl: u64,
    pub qualifying_buildings: u64,
}

/// Counts from the address matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub mode: AddressMatchMode,
    pub bsls: u64,
    pub known_addresses: u64,
    pub match_lines: u64,
}

/// Result of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisOutcome {
    /// The operator declined to overwrite existing analysis output.
    KeptExisting,
    /// Analysis ran to completion.
    Completed {
        parcels: ClassificationSummary,
        /// Absent when no address layer is loaded.
        addresses: Option<MatchSummary>,
    },
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn layer_table_names() {
        assert_eq!(Layer::Bsls.table(), "bsls");
        assert_eq!(
            Layer::BslsAddressMatchLines.table(),
            "bsls_address_match_lines"
        );
        assert_eq!(Layer::from_str("parcels_analyzed"), Ok(Layer::ParcelsAnalyzed));
        assert_eq!(Layer::ParcelsAnalyzed.to_string(), "parcels_analyzed");
    }

    #[test]
    fn boundary_is_never_clipped() {
        assert!(!Layer::Boundary.is_clipped());
        assert!(Layer::INPUTS[1..].iter().all(|l| l.is_clipped()));
    }

    #[test]
    fn address_mode_columns() {
        assert_eq!(
            AddressMatchMode::from_address_column("tailor_address_street"),
            Ok(AddressMatchMode::Street)
        );
        assert_eq!(AddressMatchMode::Full.bsl_column(), "address_full_norm");
        assert_eq!(AddressMatchMode::from_str("full"), Ok(AddressMatchMode::Full));
        assert!(AddressMatchMode::from_str("zip").is_err());
    }

    #[test]
    fn unrecognized_address_column_is_rejected() {
        let err = AddressMatchMode::from_address_column("tailor_address_zip").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unrecognized address match column: tailor_address_zip"
        );
    }

    #[test]
    fn threshold_is_strict() {
        let threshold = OverlapThreshold::from_square_meters(46.4515);
        assert!(!threshold.is_exceeded_by(46.4515));
        assert!(threshold.is_exceeded_by(46.452));
    }

    #[test]
    fn default_threshold_is_500_sq_ft() {
        let threshold = OverlapThreshold::default();
        assert!((threshold.square_feet() - 500.0).abs() < 1e-9);
        assert!((threshold.square_meters() - 46.4515).abs() < 1e-9);
    }

    #[test]
    fn decision_requests_accept_matching_answers() {
        let request = DecisionRequest::InvalidGeometries {
            layer: Layer::Parcels,
            remaining: 3,
        };
        assert!(request.accepted().contains(&Decision::Abort));
        assert!(!request.accepted().contains(&Decision::Overwrite));
    }
}
