pub mod anomaly_flags;
pub mod cleaning;
pub mod combiner;
pub mod ensemble;
pub mod features;
pub mod labels;
pub mod pipeline;
pub mod reports;
pub mod team_form;

pub use anomaly_flags::*;
pub use cleaning::*;
pub use combiner::*;
pub use ensemble::*;
pub use features::*;
pub use labels::*;
pub use pipeline::*;
pub use team_form::*;
