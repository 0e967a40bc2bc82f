/// External data collaborators.
///
/// Submodules:
/// - `iem`: downloads and parses the ASOS observation record.
/// - `elevation`: site elevation by coordinate.

pub mod elevation;
pub mod iem;
