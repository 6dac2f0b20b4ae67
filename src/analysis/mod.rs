/// Aggregation, indicators and the three analytical engines.
///
/// Submodules:
/// - `aggregate`    — per-category sums keyed by district or district-period
/// - `indicators`   — outer join of the categories and derived ratios
/// - `stats`        — shared numeric helpers (scaling, RMSE, seeded RNG, splits)
/// - `segmentation` — k-means clustering of districts
/// - `outliers`     — isolation-forest anomaly scoring
/// - `forecast`     — lagged random-forest projection of the migration score

pub mod aggregate;
pub mod forecast;
pub mod indicators;
pub mod outliers;
pub mod segmentation;
pub mod stats;
