//! Common types shared across the catalog workspace: the catalog table,
//! the esmcat sidecar document and CF time handling.

pub mod error;
pub mod esmcat;
pub mod table;
pub mod time;

pub use error::{CatalogError, CatalogResult};
pub use esmcat::{
    read_catalog, write_catalog, AggregationRule, DataFormat, EsmCatalogSpec, SavedCatalog,
    SidecarOptions,
};
pub use table::{CatalogRow, CatalogTable, Cell};
pub use time::{
    Calendar, CfDateTime, CfTimeUnits, Frequency, FrequencyUnit, MAX_YEAR, TIME_FORMAT_DESCRIPTION,
};
