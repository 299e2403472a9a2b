//! Reference data sources for the clinical logic engine
//!
//! Providers answer token reads from pluggable backing stores:
//! - `ObservationDataSource`: one key per observed concept name
//! - `PatientDataSource`: demographic keys (`GENDER`, `AGE`, ...)
//! - `DataSet`: JSON loader that fills in-memory stores for both
//!
//! ```ignore
//! use clinlogic_sources::DataSet;
//!
//! let data = DataSet::from_file("dataset.json")?;
//! let (patients, observations) = data.into_stores()?;
//! ```

pub mod dataset;
pub mod error;
pub mod observation;
pub mod patient;
pub mod store;

pub use dataset::{DataSet, ObservationRecord};
pub use error::{SourceError, SourceResult};
pub use observation::ObservationDataSource;
pub use patient::{DemographicKey, PatientDataSource};
pub use store::{
    MemoryObservationStore, MemoryPatientStore, Observation, ObservationStore, Patient,
    PatientStore,
};
