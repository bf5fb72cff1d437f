pub mod core;
pub mod error;
pub mod ingest;
pub mod key;
pub mod layout;
pub mod learned;
pub mod partition;
pub mod rmi;
pub mod sorter;


pub use self::core::*;
pub use self::error::{Result, SortError};
pub use self::key::*;
pub use self::layout::BucketLayout;
pub use self::learned::{LearnedSortStats, insertion_sort, learned_sort};
pub use self::partition::CoarsePartitioner;
pub use self::rmi::{CdfModel, LinearModel, ParamCorrection, RmiParams, TrainReport, TrainingPoint};
