mod loader;

pub use loader::{SlabSchedule, TaxSlabLoader, TaxSlabLoaderError, TaxSlabRecord};
